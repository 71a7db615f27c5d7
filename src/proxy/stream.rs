//! SSE handling on both sides of the chat relay.
//!
//! [`SseDecoder`] reassembles `data:` lines from an upstream byte stream split
//! at arbitrary TCP chunk boundaries. [`relay_fragments`] turns a stream of
//! text fragments into the frames sent to the browser, ending with
//! [`DONE_MARKER`] exactly once.

use futures::stream::{self, Stream, StreamExt};

use crate::provider::{FragmentStream, ProviderError};

/// Terminal marker sent after the last fragment.
pub const DONE_MARKER: &str = "[DONE]";

/// Lines longer than this without a newline are discarded.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// A complete item decoded from an SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data:` line.
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// Line-buffering SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return every event completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = Self::decode_line(&line) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "Discarding oversized SSE line"
            );
            self.buffer.clear();
        }

        events
    }

    /// Flush whatever is left as a final line (stream ended without newline).
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::decode_line(&line)
    }

    fn decode_line(raw: &[u8]) -> Option<SseEvent> {
        let line = std::str::from_utf8(raw).ok()?;
        let line = line.trim_end_matches(['\r', '\n']);
        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);

        if data.trim() == DONE_MARKER {
            Some(SseEvent::Done)
        } else if data.is_empty() {
            None
        } else {
            Some(SseEvent::Data(data.to_string()))
        }
    }
}

/// One frame of the downstream relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Fragment(String),
    /// Upstream failed mid-stream; sanitized message. Ends the stream.
    Error(String),
    Done,
}

/// Forward fragments one at a time, then [`RelayFrame::Done`].
///
/// The upstream is only polled when the consumer asks for the next frame, so
/// at most one fragment is in flight and dropping the returned stream stops
/// upstream consumption. On an upstream error a single `Error` frame is
/// emitted and no `Done` follows.
pub fn relay_fragments(fragments: FragmentStream) -> impl Stream<Item = RelayFrame> + Send {
    stream::unfold(Some(fragments), |state| async move {
        let mut fragments = state?;
        loop {
            match fragments.next().await {
                Some(Ok(text)) if text.is_empty() => continue,
                Some(Ok(text)) => return Some((RelayFrame::Fragment(text), Some(fragments))),
                Some(Err(e)) => {
                    tracing::error!(
                        kind = e.kind(),
                        error = %e,
                        "Chat stream failed mid-response"
                    );
                    return Some((RelayFrame::Error(sanitize(&e)), None));
                }
                None => return Some((RelayFrame::Done, None)),
            }
        }
    })
}

fn sanitize(e: &ProviderError) -> String {
    match e {
        ProviderError::RateLimited { .. } => "Chat service is rate limited".to_string(),
        ProviderError::Transient(_) => "Chat service became unavailable".to_string(),
        ProviderError::Fatal(_) => "Chat service returned an error".to_string(),
    }
}
