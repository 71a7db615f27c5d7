//! OpenAI-compatible chat-completion client (Groq by default).

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{header, Client};

use super::{CompletionClient, FragmentStream, ProviderError};
use crate::config::{ApiKey, ChatConfig};
use crate::proxy::stream::{SseDecoder, SseEvent};
use crate::proxy::types::{ChatCompletionChunk, ChatCompletionResponse, CompletionRequest};

/// Client for any `/chat/completions` endpoint speaking the OpenAI protocol.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    url: String,
    api_key: Option<ApiKey>,
}

impl OpenAiCompatClient {
    pub fn new(http: Client, chat: &ChatConfig) -> Self {
        Self {
            http,
            url: chat.url.clone(),
            api_key: chat.api_key.clone(),
        }
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, ProviderError> {
        let upstream_url = format!("{}/chat/completions", self.url.trim_end_matches('/'));

        let mut upstream_request = self
            .http
            .post(&upstream_url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(request);

        if let Some(api_key) = &self.api_key {
            upstream_request = upstream_request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", api_key.expose_secret()),
            );
        }

        let response = upstream_request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let response: ChatCompletionResponse = self.send(request).await?.json().await?;
        response
            .into_text()
            .ok_or_else(|| ProviderError::Fatal("response contained no message content".into()))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, ProviderError> {
        let response = self.send(request).await?;
        Ok(decode_fragments(response.bytes_stream().boxed()))
    }
}

struct DecodeState {
    upstream: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ProviderError>>,
    done_received: bool,
    finished: bool,
}

impl DecodeState {
    fn push(&mut self, event: SseEvent) {
        match event {
            SseEvent::Done => {
                self.done_received = true;
                self.finished = true;
            }
            SseEvent::Data(data) => {
                if let Some(item) = parse_frame(&data) {
                    if item.is_err() {
                        self.finished = true;
                    }
                    self.pending.push_back(item);
                }
            }
        }
    }
}

/// Turn an upstream SSE byte stream into content fragments.
///
/// A body that ends without `[DONE]` yields a trailing transient error.
///
/// Bytes are only read from upstream once every fragment decoded so far has
/// been handed out.
fn decode_fragments(upstream: BoxStream<'static, reqwest::Result<Bytes>>) -> FragmentStream {
    let state = DecodeState {
        upstream,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done_received: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.upstream.next().await {
                Some(Ok(bytes)) => {
                    for event in st.decoder.feed(&bytes) {
                        st.push(event);
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ProviderError::from(e)), st));
                }
                None => {
                    if let Some(event) = st.decoder.finish() {
                        st.push(event);
                    }
                    if !st.finished && !st.done_received {
                        st.pending.push_back(Err(ProviderError::Transient(
                            "upstream stream ended before [DONE]".into(),
                        )));
                    }
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Parse one `data:` payload; `None` for frames carrying no text.
fn parse_frame(data: &str) -> Option<Result<String, ProviderError>> {
    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed stream frame");
            return None;
        }
    };

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(Err(ProviderError::Transient(message)));
    }

    serde_json::from_value::<ChatCompletionChunk>(value)
        .ok()
        .and_then(ChatCompletionChunk::into_fragment)
        .map(Ok)
}
