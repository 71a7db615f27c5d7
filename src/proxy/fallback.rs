//! Speech synthesis with single primary -> backup key failover.
//!
//! - The primary key is always tried first
//! - Only a rate/quota failure moves on to the backup key, and only once
//! - A rate/quota failure with no backup configured is `ServiceUnavailable`
//! - An empty result is a failure, never a zero-length success

use bytes::BytesMut;
use futures::StreamExt;

use crate::error::Error;
use crate::provider::{ProviderError, SpeechClient};

/// Which credential an attempt used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    Primary,
    Backup,
}

impl std::fmt::Display for KeySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySlot::Primary => write!(f, "primary"),
            KeySlot::Backup => write!(f, "backup"),
        }
    }
}

/// Run one synthesis call and concatenate its chunks in order.
pub async fn collect_audio(
    client: &dyn SpeechClient,
    text: &str,
) -> Result<bytes::Bytes, ProviderError> {
    let mut chunks = client.synthesize(text).await?;
    let mut audio = BytesMut::new();
    while let Some(chunk) = chunks.next().await {
        audio.extend_from_slice(&chunk?);
    }
    Ok(audio.freeze())
}

/// Synthesize `text`, failing over to `backup` at most once.
pub async fn synthesize_with_fallback(
    primary: &dyn SpeechClient,
    backup: Option<&dyn SpeechClient>,
    text: &str,
) -> Result<bytes::Bytes, Error> {
    let audio = match collect_audio(primary, text).await {
        Ok(audio) => {
            tracing::info!(slot = %KeySlot::Primary, bytes = audio.len(), "Generated audio");
            audio
        }
        Err(primary_err) if primary_err.is_rate_limited() => {
            tracing::warn!(
                slot = %KeySlot::Primary,
                kind = primary_err.kind(),
                error = %primary_err,
                "Primary speech key limit reached"
            );

            let Some(backup) = backup else {
                return Err(Error::ServiceUnavailable(
                    "Speech service rate limit reached and no backup key is configured; retry later"
                        .to_string(),
                ));
            };

            tracing::info!("Attempting synthesis with backup speech key");
            match collect_audio(backup, text).await {
                Ok(audio) => {
                    tracing::info!(slot = %KeySlot::Backup, bytes = audio.len(), "Generated audio");
                    audio
                }
                Err(backup_err) => {
                    tracing::error!(
                        slot = %KeySlot::Backup,
                        kind = backup_err.kind(),
                        error = %backup_err,
                        "Backup speech key failed"
                    );
                    return Err(Error::FallbackFailed {
                        primary: primary_err.to_string(),
                        backup: backup_err.to_string(),
                    });
                }
            }
        }
        Err(primary_err) => {
            tracing::error!(
                slot = %KeySlot::Primary,
                kind = primary_err.kind(),
                error = %primary_err,
                "Speech synthesis failed"
            );
            return Err(Error::Upstream(primary_err.to_string()));
        }
    };

    if audio.is_empty() {
        tracing::error!("Speech service returned no audio data");
        return Err(Error::EmptyAudio);
    }

    Ok(audio)
}
