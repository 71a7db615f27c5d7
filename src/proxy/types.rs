//! Request and response types, inbound and upstream.

use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation history.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat`. The caller resends the full history every time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationTurn>,
    /// Relay the answer as server-sent events instead of one JSON object.
    #[serde(default)]
    pub stream: bool,
}

/// Buffered-mode reply of `POST /chat`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Body of `POST /tts`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
}

/// Fully assembled audio, ready to be sent as one binary response.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: bytes::Bytes,
    pub content_type: &'static str,
    pub extension: &'static str,
}

impl AudioPayload {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Chat completion request sent upstream (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ConversationTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl CompletionRequest {
    /// Build the outbound request: system instruction first, then the
    /// caller's turns in their original order.
    pub fn from_turns(chat: &ChatConfig, turns: &[ConversationTurn], stream: bool) -> Self {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ConversationTurn::new(Role::System, chat.system_prompt()));
        messages.extend(turns.iter().cloned());

        Self {
            model: chat.model.clone(),
            messages,
            temperature: chat.temperature,
            max_tokens: chat.max_tokens,
            stream,
        }
    }
}

/// Chat completion response (OpenAI-compatible), reduced to what is read.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl ChatCompletionResponse {
    /// Text of the first choice; `None` when missing or empty.
    pub fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
    }
}

/// A completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

/// Streaming chunk response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Content delta of the first choice; `None` for role-only or usage chunks.
    pub fn into_fragment(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
    }
}

/// A streaming choice delta.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Delta content in streaming response.
#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}
