mod common;

use common::{wait_for_submissions, TestApp};
use healthbot_service::services::providers::mock::MockTextProvider;
use healthbot_service::services::responder::{APOLOGY_MESSAGE, UNAVAILABLE_MESSAGE};
use healthbot_service::services::sink::MockSink;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn chat_returns_answer_and_is_tracked() {
    let sink = Arc::new(MockSink::new());
    let app = TestApp::spawn_with(Some(Arc::new(MockTextProvider::new())), sink.clone()).await;

    let response = app
        .post_chat(json!({"message": "What are the symptoms of a common cold?"}))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let conversation_id = body["conversation_id"].as_str().unwrap();
    assert!(conversation_id.starts_with("conv_"));
    assert_eq!(conversation_id.len(), 17);
    assert!(body["tokens_used"].as_u64().unwrap() > 0);
    assert!(body["response_time_ms"].as_f64().unwrap() >= 0.0);

    let metrics = app.get_json("/metrics").await;
    assert_eq!(metrics["total_requests"], 1);
    assert_eq!(metrics["successful_requests"], 1);
    assert_eq!(metrics["failed_requests"], 0);
    assert_eq!(metrics["total_tokens_used"], body["tokens_used"]);

    wait_for_submissions(&sink, 1).await;
    let names: Vec<String> = sink.submitted().into_iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec!["response_time_ms", "tokens_used", "request_count", "error_rate"]
    );
}

#[tokio::test]
async fn provided_conversation_id_is_kept() {
    let app = TestApp::spawn().await;

    let first: serde_json::Value = app
        .post_chat(json!({"message": "I have a headache", "conversation_id": "conv_custom"}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["conversation_id"], "conv_custom");

    let stats = app.get_json("/stats").await;
    assert_eq!(stats["gemini"]["active_conversations"], 1);
    assert_eq!(stats["gemini"]["model"], "gemini-2.5-flash");
}

#[tokio::test]
async fn provider_failure_returns_apology_and_counts_as_error() {
    let app = TestApp::spawn_with(
        Some(Arc::new(MockTextProvider::failing())),
        Arc::new(MockSink::new()),
    )
    .await;

    let response = app.post_chat(json!({"message": "Is this rash serious?"})).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["response"], APOLOGY_MESSAGE);
    assert_eq!(body["tokens_used"], 0);

    let metrics = app.get_json("/metrics").await;
    assert_eq!(metrics["failed_requests"], 1);
    assert_eq!(metrics["error_rate_percent"], 100.0);

    let alerts = app.get_json("/alerts").await;
    assert_eq!(alerts["critical_count"], 1);
    assert_eq!(alerts["alerts"][0]["name"], "High Error Rate");
    assert_eq!(alerts["alerts"][0]["type"], "critical");
}

#[tokio::test]
async fn degraded_mode_answers_with_unavailable_message() {
    let app = TestApp::spawn_degraded().await;

    let body: serde_json::Value = app
        .post_chat(json!({"message": "Can I take ibuprofen?"}))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["response"], UNAVAILABLE_MESSAGE);
    assert_eq!(body["tokens_used"], 0);

    app.wait_for_buffered(3).await;
    let metrics = app.get_json("/metrics").await;
    assert_eq!(metrics["total_requests"], 1);
    assert_eq!(metrics["successful_requests"], 1);
    assert_eq!(metrics["buffered_metrics"], 3);
}

#[tokio::test]
async fn invalid_messages_are_rejected_and_not_tracked() {
    let provider = Arc::new(MockTextProvider::new());
    let app = TestApp::spawn_with(Some(provider.clone()), Arc::new(MockSink::new())).await;

    let empty = app.post_chat(json!({"message": ""})).await;
    assert_eq!(empty.status().as_u16(), 422);
    let body: serde_json::Value = empty.json().await.unwrap();
    assert_eq!(body["error"], "Validation error");
    assert!(body["detail"].is_string());

    let too_long = app.post_chat(json!({"message": "x".repeat(2001)})).await;
    assert_eq!(too_long.status().as_u16(), 422);

    let metrics = app.get_json("/metrics").await;
    assert_eq!(metrics["total_requests"], 0);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn panics_return_500_and_are_tracked() {
    let app = TestApp::spawn_with(
        Some(Arc::new(MockTextProvider::panicking())),
        Arc::new(MockSink::new()),
    )
    .await;

    let response = app.post_chat(json!({"message": "hello"})).await;
    assert_eq!(response.status().as_u16(), 500);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Internal Server Error");

    let metrics = app.get_json("/metrics").await;
    assert_eq!(metrics["total_requests"], 1);
    assert_eq!(metrics["failed_requests"], 1);
}

#[tokio::test]
async fn deleting_a_conversation_twice_returns_404() {
    let app = TestApp::spawn().await;
    app.post_chat(json!({"message": "hi", "conversation_id": "conv_delete_me"}))
        .await;

    let url = format!("{}/conversation/conv_delete_me", app.address);

    let first = app.client.delete(&url).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 200);
    let body: serde_json::Value = first.json().await.unwrap();
    assert_eq!(body["message"], "Conversation conv_delete_me cleared");

    let second = app.client.delete(&url).send().await.unwrap();
    assert_eq!(second.status().as_u16(), 404);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["detail"], "Conversation conv_delete_me not found");
}

#[tokio::test]
async fn stalled_sink_does_not_slow_down_chat() {
    // The test config gives the sink 500 ms before delivery is abandoned.
    let app = TestApp::spawn_with(
        Some(Arc::new(MockTextProvider::new())),
        Arc::new(MockSink::stalling(Duration::from_secs(5))),
    )
    .await;

    let started = Instant::now();
    let response = app.post_chat(json!({"message": "Is walking good exercise?"})).await;
    let wall_ms = started.elapsed().as_millis();

    assert_eq!(response.status().as_u16(), 200);
    assert!(wall_ms < 400, "chat took {} ms", wall_ms);

    let metrics = app.get_json("/metrics").await;
    assert_eq!(metrics["total_requests"], 1);

    app.wait_for_buffered(4).await;
    let metrics = app.get_json("/metrics").await;
    assert_eq!(metrics["buffered_metrics"], 4);
}
