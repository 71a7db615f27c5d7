//! HTTP relay module.
//!
//! Accepts chat and speech requests from the browser frontend and forwards
//! them to the configured upstream AI services.

mod cors;
pub mod fallback;
mod handlers;
mod server;
pub mod stream;
pub mod types;

pub use cors::{cors_layer, OriginMatcher};
pub use fallback::{collect_audio, synthesize_with_fallback, KeySlot};
pub use server::{create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use stream::{relay_fragments, RelayFrame, SseDecoder, SseEvent, DONE_MARKER};
pub use types::{
    AudioPayload, ChatRequest, ChatResponse, CompletionRequest, ConversationTurn, Role,
    SynthesisRequest,
};
