//! DeepSeek HTTP client against a mock server.

use mockito::{Matcher, Server};
use newslens_ai::client::{ChatMessage, ChatRequest, DeepSeekClient, LlmClient};
use newslens_ai::config::LlmConfig;
use newslens_ai::error_code::AiErrorKind;
use newslens_ai::resilience::classify;
use newslens_ai::services::{sentiment, AiContext};
use newslens_ai::Error;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn config(base_url: String, api_key: Option<&str>) -> LlmConfig {
    LlmConfig {
        api_key: api_key.map(str::to_string),
        base_url,
        ..LlmConfig::default()
    }
}

fn request() -> ChatRequest {
    ChatRequest::new(
        "deepseek-chat",
        vec![ChatMessage::system("Respond in JSON."), ChatMessage::user("hello")],
    )
}

const COMPLETION: &str = r#"{
  "id": "chatcmpl-1",
  "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"ok\": true}"}}],
  "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
}"#;

#[tokio::test]
async fn test_completion_and_usage() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "deepseek-chat",
            "max_tokens": 1000
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(COMPLETION)
        .create_async()
        .await;

    let client = DeepSeekClient::new(&config(server.url(), Some("test-key"))).unwrap();
    let completion = assert_ok!(client.complete(&request()).await);

    assert_eq!(completion.content, r#"{"ok": true}"#);
    let usage = completion.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 12);
    assert_eq!(usage.total_tokens, 17);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_provider_error_message_is_kept() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_body(r#"{"error": {"message": "Rate limit reached for requests"}}"#)
        .create_async()
        .await;

    let client = DeepSeekClient::new(&config(server.url(), Some("test-key"))).unwrap();
    let err = assert_err!(client.complete(&request()).await);

    match &err {
        Error::Remote { status, message } => {
            assert_eq!(*status, 429);
            assert_eq!(message, "Rate limit reached for requests");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(classify(&err).kind, AiErrorKind::RateLimited);
}

#[tokio::test]
async fn test_empty_error_body_uses_reason_phrase() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .create_async()
        .await;

    let client = DeepSeekClient::new(&config(server.url(), Some("test-key"))).unwrap();
    let err = assert_err!(client.complete(&request()).await);
    assert_eq!(err.status_code(), Some(500));
    assert!(err.raw_message().contains("Internal Server Error"));
    assert_eq!(classify(&err).kind, AiErrorKind::NetworkError);
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices": []}"#)
        .create_async()
        .await;

    let client = DeepSeekClient::new(&config(server.url(), Some("test-key"))).unwrap();
    let err = assert_err!(client.complete(&request()).await);
    assert!(matches!(err, Error::Parse { .. }));
    assert_eq!(classify(&err).kind, AiErrorKind::ParseError);
}

#[tokio::test]
async fn test_missing_key_fails_before_sending() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let client = DeepSeekClient::new(&config(server.url(), None)).unwrap();
    let err = assert_err!(client.complete(&request()).await);
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(classify(&err).kind, AiErrorKind::AuthInvalid);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_service_over_http_with_fallback() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices": [{"message": {"content": "I cannot answer in JSON today."}}]}"#)
        .create_async()
        .await;

    let client = DeepSeekClient::new(&config(server.url(), Some("test-key"))).unwrap();
    let ctx = AiContext::builder(Arc::new(client)).build();
    let resp = sentiment::analyze_sentiment(
        &ctx,
        "Exports show strong growth and a record gain",
        Default::default(),
    )
    .await
    .unwrap();

    assert!(resp.used_fallback);
    assert_eq!(resp.error.unwrap().kind, AiErrorKind::ParseError);
    assert_eq!(resp.data.sentiment, sentiment::Sentiment::Positive);
    let stats = ctx.tracker().service_stats("sentiment");
    assert_eq!(stats.failed_calls, 1);
}
