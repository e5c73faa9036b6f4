//! Tool calls end to end: search, publish, acknowledge.

use cupola::config::SearchConfig;
use cupola::vector::HashingEmbedder;
use cupola::{
    EventBroadcaster, EventKind, ImageRecord, InMemoryCatalog, SearchEngine, ToolCallRequest,
    ToolDispatcher, ToolStatus,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;

fn loaded_dispatcher() -> ToolDispatcher {
    let engine =
        SearchEngine::new(Arc::new(HashingEmbedder::default()), SearchConfig::default()).unwrap();
    engine
        .load(&InMemoryCatalog::new(vec![
            ImageRecord::new("A", "astronaut in cupola viewing earth"),
            ImageRecord::new("B", "underwater EVA training"),
            ImageRecord::new("C", "aurora from orbit"),
        ]))
        .unwrap();
    ToolDispatcher::new(Arc::new(engine), EventBroadcaster::new())
}

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_fetch_relevant_image_pushes_one_images_event() {
    let dispatcher = loaded_dispatcher();
    let mut viewer = dispatcher.broadcaster().subscribe();
    assert_eq!(viewer.recv().await.unwrap().kind(), EventKind::Connected);

    let output = dispatcher.handle(
        "fetch_relevant_image",
        &params(json!({"query": "spacewalk"})),
        "conn_1_1",
    );
    assert_eq!(output.status, ToolStatus::Success);

    let event = viewer.recv().await.unwrap();
    assert_eq!(event.kind(), EventKind::Images);
    let payload = event.to_json();
    assert_eq!(payload["total"], output.images_found);
    assert_eq!(payload["query"], "spacewalk");
    assert_eq!(payload["source"], "tavus_tool_call");
    assert_eq!(
        payload["images"].as_array().unwrap().len(),
        output.images_found
    );

    // Exactly one event
    assert!(viewer.try_recv().is_none());
}

#[tokio::test]
async fn test_unknown_tool_publishes_nothing() {
    let dispatcher = loaded_dispatcher();
    let mut viewer = dispatcher.broadcaster().subscribe();
    viewer.recv().await.unwrap();

    let output = dispatcher.handle("unknown_tool", &Map::new(), "conn_1_1");
    assert_eq!(output.status, ToolStatus::Error);
    assert_eq!(output.images_found, 0);
    assert!(output.message.contains("unknown_tool"));
    assert!(viewer.try_recv().is_none());
}

#[test]
fn test_success_without_viewers() {
    let dispatcher = loaded_dispatcher();
    assert_eq!(dispatcher.broadcaster().subscriber_count(), 0);

    let output = dispatcher.handle(
        "fetch_relevant_image",
        &params(json!({"query": "aurora", "top_k": 2})),
        "conn_1_1",
    );
    assert!(output.is_success());
    assert_eq!(output.images_found, 2);
    assert_eq!(output.message, "Fetched 2 images for 'aurora'");
}

#[test]
fn test_identical_requests_publish_independently() {
    let dispatcher = loaded_dispatcher();
    let mut viewer = dispatcher.broadcaster().subscribe();
    viewer.try_recv().unwrap();

    let request = params(json!({"query": "aurora"}));
    for _ in 0..3 {
        assert!(dispatcher.handle("fetch_relevant_image", &request, "c").is_success());
    }

    let mut images_events = 0;
    while let Some(event) = viewer.try_recv() {
        assert_eq!(event.kind(), EventKind::Images);
        images_events += 1;
    }
    assert_eq!(images_events, 3);
}

#[test]
fn test_not_ready_engine_reports_error() {
    let engine =
        SearchEngine::new(Arc::new(HashingEmbedder::default()), SearchConfig::default()).unwrap();
    let dispatcher = ToolDispatcher::new(Arc::new(engine), EventBroadcaster::new());
    let mut viewer = dispatcher.broadcaster().subscribe();
    viewer.try_recv().unwrap();

    let err = dispatcher
        .try_handle(
            "fetch_relevant_image",
            &params(json!({"query": "aurora"})),
            "c",
        )
        .unwrap_err();
    assert_eq!(err.status_code(), "NOT_READY");
    assert!(viewer.try_recv().is_none());
}

#[test]
fn test_webhook_payload_runs_tool() {
    let dispatcher = loaded_dispatcher();
    let request = ToolCallRequest::from_payload(&json!({
        "type": "tool_call",
        "conversation_id": "c123",
        "tool_call": {
            "name": "fetch_relevant_image",
            "parameters": {"query": "underwater training", "top_k": 1}
        }
    }))
    .unwrap();

    let output = dispatcher.handle_request(&request);
    assert!(output.is_success());
    assert_eq!(output.images_found, 1);

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["status"], "success");
}

#[test]
fn test_manual_search_and_test_event() {
    let dispatcher = loaded_dispatcher();
    let mut viewer = dispatcher.broadcaster().subscribe();
    viewer.try_recv().unwrap();

    let images = dispatcher
        .search_and_publish("earth", 3, cupola::tools::MANUAL_SOURCE)
        .unwrap();
    assert_eq!(images.len(), 3);
    assert_eq!(dispatcher.publish_test("hello viewers"), 1);

    let images_event = viewer.try_recv().unwrap();
    assert_eq!(images_event.payload()["source"], "manual");
    let test_event = viewer.try_recv().unwrap();
    assert_eq!(test_event.kind(), EventKind::Test);
    assert_eq!(test_event.payload()["message"], "hello viewers");
}
