//! Integration tests for POST /tts.
//!
//! Verifies that:
//! - Audio is returned as one binary body with content-type and content-length
//! - A rate/quota failure on the primary key fails over to the backup exactly once
//! - A rate/quota failure without a backup key yields HTTP 503
//! - Other failures yield HTTP 500 without touching the backup key
//! - Both keys failing yields HTTP 500 naming both causes
//! - Empty audio is an error, and empty text is rejected before any upstream call

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http::{Request, StatusCode};
use tower::ServiceExt;

use voxrelay::config::{Config, RawConfig};
use voxrelay::provider::{
    AudioStream, CompletionClient, FragmentStream, ProviderError, SpeechClient,
};
use voxrelay::proxy::{create_router, AppState, CompletionRequest};

struct FakeSpeech {
    outcome: Result<Vec<&'static str>, ProviderError>,
    calls: AtomicU32,
}

impl FakeSpeech {
    fn ok(chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(chunks),
            calls: AtomicU32::new(0),
        })
    }

    fn err(e: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(e),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechClient for FakeSpeech {
    async fn synthesize(&self, _text: &str) -> Result<AudioStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self.outcome.clone()?;
        Ok(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        )
        .boxed())
    }
}

struct NoCompletion;

#[async_trait]
impl CompletionClient for NoCompletion {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
        panic!("completion must not be called by /tts");
    }

    async fn stream(&self, _request: &CompletionRequest) -> Result<FragmentStream, ProviderError> {
        panic!("completion must not be called by /tts");
    }
}

fn setup_app(primary: Arc<FakeSpeech>, backup: Option<Arc<FakeSpeech>>) -> axum::Router {
    let config = Config::from_raw_with(RawConfig::default(), |_| None).unwrap().0;
    let state = AppState {
        completion: Arc::new(NoCompletion),
        speech: primary,
        speech_backup: backup.map(|b| b as Arc<dyn SpeechClient>),
        config: Arc::new(config),
    };
    create_router(state).unwrap()
}

fn tts_request(text: &str) -> Request<Body> {
    Request::post("/tts")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "text": text }).to_string()))
        .unwrap()
}

async fn error_message(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    json["error"]["message"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn audio_returned_with_length_and_type() {
    let primary = FakeSpeech::ok(vec!["ID3", "-frames-", "end"]);
    let app = setup_app(primary.clone(), None);

    let response = app.oneshot(tts_request("Hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "audio/mpeg");
    assert_eq!(response.headers().get("content-length").unwrap(), "14");
    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"ID3-frames-end");
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn rate_limited_primary_without_backup_is_503() {
    let primary = FakeSpeech::err(ProviderError::Fatal(
        "HTTP 429 Too Many Requests".into(),
    ));
    let app = setup_app(primary.clone(), None);

    let response = app.oneshot(tts_request("Hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn rate_limited_primary_fails_over_once() {
    let primary = FakeSpeech::err(ProviderError::RateLimited {
        status: Some(429),
        message: "status 429: quota".into(),
    });
    let backup = FakeSpeech::ok(vec!["backup-audio"]);
    let app = setup_app(primary.clone(), Some(backup.clone()));

    let response = app.oneshot(tts_request("Hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"backup-audio");
    assert_eq!(primary.calls(), 1);
    assert_eq!(backup.calls(), 1);
}

#[tokio::test]
async fn generic_failure_does_not_fail_over() {
    let primary = FakeSpeech::err(ProviderError::Fatal("status 400: bad utterance".into()));
    let backup = FakeSpeech::ok(vec!["unused"]);
    let app = setup_app(primary, Some(backup.clone()));

    let response = app.oneshot(tts_request("Hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(backup.calls(), 0);
}

#[tokio::test]
async fn both_keys_failing_is_500_with_both_causes() {
    let primary = FakeSpeech::err(ProviderError::RateLimited {
        status: Some(403),
        message: "status 403: monthly quota used".into(),
    });
    let backup = FakeSpeech::err(ProviderError::Transient("connection refused".into()));
    let app = setup_app(primary, Some(backup.clone()));

    let response = app.oneshot(tts_request("Hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let message = error_message(response).await;
    assert!(message.contains("monthly quota used"));
    assert!(message.contains("connection refused"));
    assert_eq!(backup.calls(), 1);
}

#[tokio::test]
async fn empty_audio_is_500() {
    let primary = FakeSpeech::ok(vec![]);
    let app = setup_app(primary, None);

    let response = app.oneshot(tts_request("Hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(response).await.contains("No audio data"));
}

#[tokio::test]
async fn empty_text_rejected_without_upstream_call() {
    let primary = FakeSpeech::ok(vec!["unused"]);
    let app = setup_app(primary.clone(), None);

    let response = app.oneshot(tts_request("   ")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn missing_text_field_is_client_error() {
    let primary = FakeSpeech::ok(vec!["unused"]);
    let app = setup_app(primary.clone(), None);

    let request = Request::post("/tts")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"txt":"Hello"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(primary.calls(), 0);
}
