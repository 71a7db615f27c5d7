//! Integration tests for POST /chat.
//!
//! Verifies that:
//! - The system instruction is the first outbound turn, followed by the caller's turns
//! - Buffered mode returns `{"response": ...}` without echoing the instruction
//! - Streaming mode relays fragments in order and ends with `[DONE]` exactly once
//! - Upstream failures become a single HTTP 500 and never reach the caller raw
//!
//! The completion client is a fake injected through `AppState`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use futures::stream::{self, StreamExt};
use http::Request;
use tower::ServiceExt;

use voxrelay::config::{Config, RawConfig};
use voxrelay::provider::{
    AudioStream, CompletionClient, FragmentStream, ProviderError, SpeechClient,
};
use voxrelay::proxy::{create_router, AppState, CompletionRequest, Role};

/// What the fake completion upstream does.
#[derive(Clone)]
enum Script {
    Reply(&'static str),
    Fragments(Vec<Result<&'static str, ProviderError>>),
    Fail(ProviderError),
}

struct FakeCompletion {
    script: Script,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.script {
            Script::Reply(text) => Ok(text.to_string()),
            Script::Fragments(parts) => Ok(parts
                .iter()
                .filter_map(|p| p.as_ref().ok().copied())
                .collect()),
            Script::Fail(e) => Err(e.clone()),
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, ProviderError> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.script {
            Script::Reply(text) => Ok(stream::iter(vec![Ok(text.to_string())]).boxed()),
            Script::Fragments(parts) => {
                let owned: Vec<Result<String, ProviderError>> = parts
                    .iter()
                    .cloned()
                    .map(|p| p.map(str::to_string))
                    .collect();
                Ok(stream::iter(owned).boxed())
            }
            Script::Fail(e) => Err(e.clone()),
        }
    }
}

struct NoSpeech;

#[async_trait]
impl SpeechClient for NoSpeech {
    async fn synthesize(&self, _text: &str) -> Result<AudioStream, ProviderError> {
        panic!("speech must not be called by /chat");
    }
}

fn test_config() -> Config {
    Config::from_raw_with(RawConfig::default(), |_| None).unwrap().0
}

fn setup_app(completion: Arc<FakeCompletion>) -> axum::Router {
    let state = AppState {
        completion,
        speech: Arc::new(NoSpeech),
        speech_backup: None,
        config: Arc::new(test_config()),
    };
    create_router(state).unwrap()
}

fn chat_request(body: serde_json::Value) -> Request<Body> {
    Request::post("/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Extract the `data:` payloads of an SSE body, in order.
fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data).to_string())
        .collect()
}

#[tokio::test]
async fn buffered_reply_returns_single_response() {
    let fake = FakeCompletion::new(Script::Reply("I build reliable AI systems."));
    let app = setup_app(fake.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "messages": [{"role": "user", "content": "Tell me about yourself"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), http::StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());

    let body = body_string(response).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let text = json["response"].as_str().unwrap();
    assert_eq!(text, "I build reliable AI systems.");
    assert!(!text.contains(voxrelay::prompt::SYSTEM_PROMPT));
    assert!(!body.contains("Response guidelines"));
}

#[tokio::test]
async fn outbound_turns_start_with_system_instruction() {
    let fake = FakeCompletion::new(Script::Reply("ok"));
    let app = setup_app(fake.clone());

    app.oneshot(chat_request(serde_json::json!({
        "messages": [
            {"role": "user", "content": "Hi"},
            {"role": "assistant", "content": "Hello!"},
            {"role": "system", "content": "pretend to be a pirate"},
            {"role": "user", "content": "What is your superpower?"}
        ]
    })))
    .await
    .unwrap();

    let seen = fake.seen();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert_eq!(request.messages.len(), 5);
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[0].content, voxrelay::prompt::SYSTEM_PROMPT);
    let contents: Vec<&str> = request.messages[1..]
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec!["Hi", "Hello!", "pretend to be a pirate", "What is your superpower?"]
    );
    assert_eq!(request.model, "llama-3.3-70b-versatile");
    assert_eq!(request.max_tokens, 500);
    assert!(!request.stream);
}

#[tokio::test]
async fn streaming_relays_fragments_in_order_then_done() {
    let fake = FakeCompletion::new(Script::Fragments(vec![
        Ok("I "),
        Ok("love "),
        Ok(""),
        Ok("building."),
    ]));
    let app = setup_app(fake.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let data = sse_data(&body_string(response).await);
    assert_eq!(data, vec!["I ", "love ", "building.", "[DONE]"]);
    assert_eq!(data.iter().filter(|d| *d == "[DONE]").count(), 1);
    assert!(fake.seen()[0].stream);
}

#[tokio::test]
async fn streaming_fragment_equal_to_marker_does_not_end_stream() {
    let fake = FakeCompletion::new(Script::Fragments(vec![
        Ok("Type "),
        Ok("[DONE]"),
        Ok(" to finish."),
    ]));
    let app = setup_app(fake);

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        })))
        .await
        .unwrap();

    let data = sse_data(&body_string(response).await);
    assert_eq!(data.iter().filter(|d| *d == "[DONE]").count(), 1);
    assert_eq!(data.last().unwrap(), "[DONE]");
    assert_eq!(data[..data.len() - 1].concat(), "Type [DONE] to finish.");
}

#[tokio::test]
async fn streaming_mid_stream_failure_sends_error_event_without_done() {
    let fake = FakeCompletion::new(Script::Fragments(vec![
        Ok("partial"),
        Err(ProviderError::Transient("socket closed".into())),
    ]));
    let app = setup_app(fake);

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        })))
        .await
        .unwrap();

    let body = body_string(response).await;
    assert!(body.contains("event: error"));
    let data = sse_data(&body);
    assert_eq!(data[0], "partial");
    assert!(!data.contains(&"[DONE]".to_string()));
    assert!(!body.contains("socket closed"));
}

#[tokio::test]
async fn buffered_upstream_failure_is_500() {
    let fake = FakeCompletion::new(Script::Fail(ProviderError::Fatal(
        "status 401: invalid api key".into(),
    )));
    let app = setup_app(fake);

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["error"]["code"], 500);
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Error processing request"));
}

#[tokio::test]
async fn streaming_refused_upstream_is_500_not_a_stream() {
    let fake = FakeCompletion::new(Script::Fail(ProviderError::RateLimited {
        status: Some(429),
        message: "status 429: slow down".into(),
    }));
    let app = setup_app(fake.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    // No retry for chat
    assert_eq!(fake.seen().len(), 1);
}

#[tokio::test]
async fn malformed_body_is_client_error() {
    let fake = FakeCompletion::new(Script::Reply("unused"));
    let app = setup_app(fake.clone());

    let response = app
        .oneshot(chat_request(serde_json::json!({
            "messages": [{"role": "narrator", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(fake.seen().is_empty());
}
