//! Hume text-to-speech client.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use serde::Serialize;

use super::{AudioStream, ProviderError, SpeechClient};
use crate::config::{ApiKey, AudioFormat};

const API_KEY_HEADER: &str = "X-Hume-Api-Key";

#[derive(Serialize)]
struct Utterance<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct FormatSpec {
    #[serde(rename = "type")]
    kind: AudioFormat,
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    utterances: [Utterance<'a>; 1],
    format: FormatSpec,
}

/// File-synthesis client bound to one credential.
///
/// No voice is specified, so the upstream designs one from the text.
#[derive(Clone)]
pub struct HumeClient {
    http: Client,
    url: String,
    api_key: Option<ApiKey>,
    format: AudioFormat,
}

impl HumeClient {
    pub fn new(http: Client, url: &str, api_key: Option<ApiKey>, format: AudioFormat) -> Self {
        Self {
            http,
            url: url.to_string(),
            api_key,
            format,
        }
    }
}

#[async_trait]
impl SpeechClient for HumeClient {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError> {
        let upstream_url = format!("{}/v0/tts/file", self.url.trim_end_matches('/'));
        let body = SynthesisBody {
            utterances: [Utterance { text }],
            format: FormatSpec { kind: self.format },
        };

        let mut upstream_request = self
            .http
            .post(&upstream_url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);

        if let Some(api_key) = &self.api_key {
            upstream_request = upstream_request.header(API_KEY_HEADER, api_key.expose_secret());
        }

        let response = upstream_request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ProviderError::from))
            .boxed())
    }
}
