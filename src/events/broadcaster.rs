//! Fan-out of events to every connected viewer.
//!
//! Each subscriber owns an unbounded queue, so a push never blocks and a
//! slow reader cannot hold up the others. The subscriber set is guarded
//! by a membership lock that is released before any push happens.
//! Publishers are serialized by a second lock so all subscribers observe
//! the same global order.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::{ConnectionId, Event};

/// Lifecycle of a subscriber handle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, Clone)]
struct Subscriber {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Shared {
    subscribers: Mutex<Vec<Subscriber>>,
    publish_order: Mutex<()>,
    shutdown: CancellationToken,
}

impl Shared {
    fn remove(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .position(|s| &s.id == id)
                .map(|i| subscribers.remove(i))
        };
        match removed {
            Some(subscriber) => {
                subscriber.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Publish/subscribe hub for viewer events.
///
/// Cloning is cheap and every clone shares the same subscriber set.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    shared: Arc<Shared>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(Vec::new()),
                publish_order: Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// Its queue already holds the `connected` event when this returns,
    /// ahead of anything published afterwards. After [`shutdown`](Self::shutdown)
    /// the handle comes back `Closed` and is never registered.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = self.shared.shutdown.child_token();

        let mut subscription = Subscription {
            id: ConnectionId::from(""),
            receiver,
            cancel: cancel.clone(),
            state: ConnectionState::Connecting,
            shared: Arc::downgrade(&self.shared),
        };

        {
            let mut subscribers = self.shared.subscribers.lock();
            // Checked under the membership lock so shutdown's clear cannot miss us
            if self.shared.shutdown.is_cancelled() {
                drop(subscribers);
                subscription.id = ConnectionId::generate();
                subscription.close();
                debug!("Refused subscriber {} after shutdown", subscription.id);
                return subscription;
            }
            let id = loop {
                let candidate = ConnectionId::generate();
                if !subscribers.iter().any(|s| s.id == candidate) {
                    break candidate;
                }
            };
            // The receiver is alive in `subscription`, so this cannot fail
            let _ = sender.send(Event::connected(&id));
            subscribers.push(Subscriber {
                id: id.clone(),
                sender,
                cancel,
            });
            subscription.id = id;
        }

        subscription.state = ConnectionState::Connected;
        debug!("Subscriber {} connected", subscription.id);
        subscription
    }

    /// Deliver `event` to every registered subscriber.
    ///
    /// Returns how many queues accepted it. Zero subscribers is not an
    /// error; the event is simply dropped.
    pub fn publish(&self, event: Event) -> usize {
        let _order = self.shared.publish_order.lock();
        let targets: Vec<Subscriber> = self.shared.subscribers.lock().clone();

        if targets.is_empty() {
            debug!("No subscribers for {} event, dropping it", event.kind());
            return 0;
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for subscriber in &targets {
            match subscriber.sender.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(
                        "Dropping {} event for closed subscriber {}",
                        event.kind(),
                        subscriber.id
                    );
                    dead.push(subscriber.id.clone());
                }
            }
        }

        for id in &dead {
            self.shared.remove(id);
        }

        debug!(
            "Published {} event to {delivered}/{} subscribers",
            event.kind(),
            targets.len()
        );
        delivered
    }

    /// Remove a subscriber and release its pending wait.
    ///
    /// Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: &ConnectionId) -> bool {
        let removed = self.shared.remove(id);
        if removed {
            debug!("Subscriber {id} disconnected");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Close every subscription and refuse new ones.
    ///
    /// Subscriptions requested after shutdown are returned `Closed`, are not
    /// counted, and receive nothing.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let count = {
            let mut subscribers = self.shared.subscribers.lock();
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        info!("Event broadcaster shut down, released {count} subscribers");
    }
}

/// Handle for one live subscriber.
///
/// Dropping the handle unsubscribes it, so release happens on every exit
/// path of the task that owns it.
#[derive(Debug)]
pub struct Subscription {
    id: ConnectionId,
    receiver: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    state: ConnectionState,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Wait for the next event.
    ///
    /// There is no timeout: the wait ends when an event arrives or when the
    /// subscription is closed, unsubscribed or the broadcaster shuts down,
    /// in which case `None` is returned and the handle becomes `Closed`.
    pub async fn recv(&mut self) -> Option<Event> {
        if self.state == ConnectionState::Closed {
            return None;
        }

        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.receiver.recv() => event,
        };

        if event.is_none() {
            self.close();
        }
        event
    }

    /// Take a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.state == ConnectionState::Closed || self.cancel.is_cancelled() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Leave the subscriber set and discard anything still queued.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        self.cancel.cancel();
        self.receiver.close();
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
