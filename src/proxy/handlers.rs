//! HTTP request handlers.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, StreamExt};

use super::fallback::synthesize_with_fallback;
use super::server::{AppState, RequestId};
use super::stream::{relay_fragments, RelayFrame, DONE_MARKER};
use super::types::{AudioPayload, ChatRequest, ChatResponse, CompletionRequest, SynthesisRequest};
use crate::error::Error;
use crate::provider::ProviderError;

/// Characters of TTS input echoed into logs.
const LOG_PREVIEW_CHARS: usize = 50;

/// Handle GET /
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "voxrelay"
    }))
}

/// Handle GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

/// Handle POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, Error> {
    tracing::info!(
        request_id = %request_id.0,
        turns = request.messages.len(),
        stream = request.stream,
        "Received chat request"
    );

    let outbound = CompletionRequest::from_turns(&state.config.chat, &request.messages, request.stream);

    if !request.stream {
        let text = state
            .completion
            .complete(&outbound)
            .await
            .map_err(|e| chat_failure(&request_id, e))?;

        tracing::info!(request_id = %request_id.0, chars = text.len(), "Chat response complete");
        return Ok(Json(ChatResponse { response: text }).into_response());
    }

    let fragments = state
        .completion
        .stream(&outbound)
        .await
        .map_err(|e| chat_failure(&request_id, e))?;

    let events = relay_fragments(fragments)
        .flat_map(|frame| stream::iter(frame_events(frame)))
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(events).into_response())
}

fn frame_events(frame: RelayFrame) -> Vec<Event> {
    match frame {
        // SSE cannot carry bare carriage returns
        RelayFrame::Fragment(text) => split_marker(text.replace('\r', ""))
            .into_iter()
            .map(|part| Event::default().data(part))
            .collect(),
        RelayFrame::Error(message) => vec![Event::default().event("error").data(message)],
        RelayFrame::Done => vec![Event::default().data(DONE_MARKER)],
    }
}

/// Split a fragment that would read as the end-of-stream marker into two
/// frames whose concatenation is unchanged.
fn split_marker(text: String) -> Vec<String> {
    if text.trim() != DONE_MARKER {
        return vec![text];
    }
    // The trimmed text ends in ']', which is one byte
    let cut = text.trim_end().len() - 1;
    let (head, tail) = text.split_at(cut);
    vec![head.to_string(), tail.to_string()]
}

fn chat_failure(request_id: &RequestId, e: ProviderError) -> Error {
    tracing::error!(
        request_id = %request_id.0,
        kind = e.kind(),
        error = %e,
        "Chat completion failed"
    );
    Error::Upstream(e.to_string())
}

/// Handle POST /tts
pub async fn text_to_speech(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SynthesisRequest>,
) -> Result<Response, Error> {
    if request.text.trim().is_empty() {
        return Err(Error::BadRequest("text must not be empty".to_string()));
    }

    let preview: String = request.text.chars().take(LOG_PREVIEW_CHARS).collect();
    tracing::info!(request_id = %request_id.0, text = %preview, "Received TTS request");

    let bytes = synthesize_with_fallback(
        state.speech.as_ref(),
        state.speech_backup.as_deref(),
        &request.text,
    )
    .await
    .inspect_err(|e| {
        tracing::error!(request_id = %request_id.0, error = %e, "TTS request failed");
    })?;

    let format = state.config.speech.format;
    Ok(audio_response(AudioPayload {
        bytes,
        content_type: format.mime_type(),
        extension: format.extension(),
    }))
}

fn audio_response(audio: AudioPayload) -> Response {
    let disposition = format!("inline; filename=speech.{}", audio.extension);
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(audio.content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(audio.len())),
            (header::CONTENT_DISPOSITION, disposition),
            (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        Body::from(audio.bytes),
    )
        .into_response()
}
