//! Inbound envelope decoding.
//!
//! One text frame in, one [`PromptEvent`] out. The size gate runs before
//! any parsing so an oversized frame costs a length comparison, nothing
//! more. Decoding is a pure transform with no side effects; the caller
//! decides what a failure means for the connection.

use serde::Deserialize;
use serde_json::Value;

use kiln_core::constants::MAX_MESSAGE_SIZE_CEILING;
use kiln_core::errors::DecodeError;
use kiln_core::events::{EventKind, PromptEvent};
use kiln_core::ids::PromptId;

/// Wire envelope: `{"type": "...", "data": {...}}`.
///
/// The prompt ID, when present, lives inside `data` as `prompt_id`.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Size-gated decoder for inbound frames.
#[derive(Clone, Debug)]
pub struct EnvelopeCodec {
    limit: usize,
}

impl EnvelopeCodec {
    /// Create a codec with the given byte limit, clamped to the 50 MiB
    /// ceiling.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.min(MAX_MESSAGE_SIZE_CEILING),
        }
    }

    /// The enforced byte limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Decode one text frame into an event.
    ///
    /// A frame of exactly `limit` bytes is accepted; one byte over is
    /// rejected without being parsed.
    pub fn decode(&self, raw: &str) -> Result<PromptEvent, DecodeError> {
        let size = raw.len();
        if size > self.limit {
            return Err(DecodeError::Oversized {
                size,
                limit: self.limit,
            });
        }

        let envelope: WireEnvelope =
            serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let Some(tag) = envelope.kind else {
            return Err(DecodeError::UnknownKind(None));
        };
        let kind = EventKind::from_wire(&tag).ok_or(DecodeError::UnknownKind(Some(tag)))?;

        let prompt_id = envelope
            .data
            .get("prompt_id")
            .and_then(Value::as_str)
            .map(PromptId::from);

        Ok(PromptEvent::new(kind, prompt_id, envelope.data))
    }
}
