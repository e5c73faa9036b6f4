//! Fan-out guarantees of the event broadcaster.

use cupola::{ConnectionState, Event, EventBroadcaster, EventKind, Subscription};
use std::time::Duration;

/// Drain everything queued after the initial `connected` event.
fn drain_messages(subscription: &mut Subscription) -> Vec<String> {
    let mut messages = Vec::new();
    while let Some(event) = subscription.try_recv() {
        if event.kind() == EventKind::Test {
            messages.push(event.payload()["message"].as_str().unwrap().to_string());
        }
    }
    messages
}

#[tokio::test]
async fn test_every_subscriber_receives_each_event_in_order() {
    let broadcaster = EventBroadcaster::new();
    let mut subscribers: Vec<Subscription> = (0..8).map(|_| broadcaster.subscribe()).collect();

    for i in 0..10 {
        assert_eq!(broadcaster.publish(Event::test(&format!("m{i}"))), 8);
    }

    let expected: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
    for subscriber in &mut subscribers {
        let connected = subscriber.recv().await.unwrap();
        assert_eq!(connected.kind(), EventKind::Connected);
        assert_eq!(drain_messages(subscriber), expected);
    }
}

#[tokio::test]
async fn test_connection_ids_are_distinct() {
    let broadcaster = EventBroadcaster::new();
    let subscribers: Vec<Subscription> = (0..50).map(|_| broadcaster.subscribe()).collect();

    let mut ids: Vec<&str> = subscribers
        .iter()
        .map(|s| s.connection_id().as_str())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 50);
}

#[tokio::test]
async fn test_disconnected_subscriber_misses_later_events() {
    let broadcaster = EventBroadcaster::new();
    let mut stays = broadcaster.subscribe();
    let mut leaves = broadcaster.subscribe();
    let leaves_id = leaves.connection_id().clone();

    broadcaster.publish(Event::test("before"));
    assert!(broadcaster.unsubscribe(&leaves_id));

    assert_eq!(broadcaster.publish(Event::test("after")), 1);

    stays.recv().await.unwrap();
    assert_eq!(drain_messages(&mut stays), vec!["before", "after"]);

    // Closed is terminal and queued events are discarded
    assert!(leaves.recv().await.is_none());
    assert_eq!(leaves.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_idle_subscriber_does_not_block_others() {
    let broadcaster = EventBroadcaster::new();
    let _idle = broadcaster.subscribe();
    let mut active = broadcaster.subscribe();

    for i in 0..10_000 {
        broadcaster.publish(Event::test(&i.to_string()));
    }

    active.recv().await.unwrap();
    assert_eq!(drain_messages(&mut active).len(), 10_000);
}

#[test]
fn test_concurrent_publishers_share_one_global_order() {
    let broadcaster = EventBroadcaster::new();
    let mut subscribers: Vec<Subscription> = (0..4).map(|_| broadcaster.subscribe()).collect();

    std::thread::scope(|scope| {
        for publisher in 0..4 {
            let broadcaster = broadcaster.clone();
            scope.spawn(move || {
                for i in 0..100 {
                    broadcaster.publish(Event::test(&format!("p{publisher}-{i}")));
                }
            });
        }
    });

    let sequences: Vec<Vec<String>> = subscribers.iter_mut().map(drain_messages).collect();
    assert_eq!(sequences[0].len(), 400);
    for sequence in &sequences[1..] {
        assert_eq!(sequence, &sequences[0]);
    }

    // Each publisher's own events keep their relative order
    for publisher in 0..4 {
        let prefix = format!("p{publisher}-");
        let own: Vec<&String> = sequences[0]
            .iter()
            .filter(|m| m.starts_with(&prefix))
            .collect();
        let expected: Vec<String> = (0..100).map(|i| format!("{prefix}{i}")).collect();
        assert_eq!(own, expected.iter().collect::<Vec<_>>());
    }
}

#[test]
fn test_membership_changes_during_publish() {
    let broadcaster = EventBroadcaster::new();
    let mut steady = broadcaster.subscribe();

    std::thread::scope(|scope| {
        let publisher = broadcaster.clone();
        scope.spawn(move || {
            for i in 0..500 {
                publisher.publish(Event::test(&i.to_string()));
            }
        });

        let churn = broadcaster.clone();
        scope.spawn(move || {
            for _ in 0..200 {
                let subscription = churn.subscribe();
                drop(subscription);
            }
        });
    });

    assert_eq!(broadcaster.subscriber_count(), 1);
    assert_eq!(drain_messages(&mut steady).len(), 500);
}

#[tokio::test]
async fn test_pending_wait_released_by_shutdown() {
    let broadcaster = EventBroadcaster::new();
    let mut subscription = broadcaster.subscribe();
    subscription.recv().await.unwrap();

    let waiter = tokio::spawn(async move { subscription.recv().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    broadcaster.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("wait was not released")
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_pending_wait_wakes_on_publish() {
    let broadcaster = EventBroadcaster::new();
    let mut subscription = broadcaster.subscribe();
    subscription.recv().await.unwrap();

    let waiter = tokio::spawn(async move { subscription.recv().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    broadcaster.publish(Event::test("wake"));

    let event = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.payload()["message"], "wake");
}
