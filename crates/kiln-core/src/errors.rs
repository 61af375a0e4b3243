//! Error hierarchy for the kiln client.
//!
//! Built on [`thiserror`]:
//!
//! - [`EndpointError`]: endpoint rejected before any network I/O
//! - [`DecodeError`]: per-frame failures (oversized, malformed, unknown kind)
//! - [`RegistryError`]: listener capacity violations, returned to the caller
//! - [`ConnectError`]: transport-level failures that drive reconnection
//! - [`KilnError`]: top-level enum covering all of the above
//!
//! Frame and registry errors never tear down the connection or the client;
//! only transport errors (and a sustained run of frame errors) trigger a
//! reconnect.

use thiserror::Error;

use crate::ids::PromptId;

/// Convenience result alias for the kiln crates.
pub type Result<T> = std::result::Result<T, KilnError>;

// ─────────────────────────────────────────────────────────────────────────────
// EndpointError
// ─────────────────────────────────────────────────────────────────────────────

/// An endpoint failed validation.
///
/// Validation is a security boundary: it runs at construction time and a
/// rejected endpoint never reaches the transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// Scheme is not a WebSocket scheme (`ws`/`wss`).
    #[error("unsupported scheme `{0}` (only ws/wss allowed)")]
    UnsupportedScheme(String),

    /// Host is neither loopback nor in the configured allow-set.
    #[error("host `{0}` is not in the allowed set")]
    HostNotAllowed(String),

    /// Endpoint URL embeds credentials.
    #[error("endpoint URL must not contain credentials")]
    CredentialsInUrl,

    /// Not parseable as a URL, or missing a host.
    #[error("invalid endpoint: {0}")]
    InvalidFormat(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// DecodeError
// ─────────────────────────────────────────────────────────────────────────────

/// A single inbound frame could not be decoded.
///
/// These are recoverable: the frame is logged and dropped, and the
/// connection stays up unless too many arrive consecutively.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame exceeds the configured size limit. The payload was not parsed.
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    Oversized {
        /// Measured frame size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// Frame is not a valid JSON envelope.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// Envelope has no recognized `type` tag.
    #[error("unknown event kind {0:?}")]
    UnknownKind(Option<String>),
}

// ─────────────────────────────────────────────────────────────────────────────
// RegistryError
// ─────────────────────────────────────────────────────────────────────────────

/// Listener registration was refused.
///
/// Returned synchronously to the registering caller; no registry state is
/// mutated on failure. The per-prompt and global caps are independent and
/// never reported as one another.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The prompt already holds the maximum number of listeners.
    #[error("prompt `{prompt}` already has {limit} listeners")]
    PerPromptCapacityExceeded {
        /// The prompt whose bucket is full.
        prompt: PromptId,
        /// The per-prompt cap.
        limit: usize,
    },

    /// The global listener cap is reached.
    #[error("global listener capacity of {limit} reached")]
    GlobalCapacityExceeded {
        /// The global cap.
        limit: usize,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectError
// ─────────────────────────────────────────────────────────────────────────────

/// A transport-level failure.
///
/// While the client intends to stay connected these trigger reconnection
/// with backoff rather than propagating to callers.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The transport failed (handshake refused, socket error, stream ended).
    #[error("transport error: {0}")]
    Transport(String),

    /// The handshake did not complete within the configured timeout.
    #[error("connect timed out after {secs}s")]
    Timeout {
        /// The timeout that elapsed, in seconds.
        secs: u64,
    },

    /// The process-wide live connection cap is reached.
    #[error("too many live connections (limit {limit})")]
    TooManyConnections {
        /// The connection cap.
        limit: usize,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// KilnError
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the kiln client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KilnError {
    /// Endpoint rejected by validation.
    #[error("{0}")]
    Endpoint(#[from] EndpointError),

    /// Inbound frame could not be decoded.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// Listener registration refused.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// Transport failure.
    #[error("{0}")]
    Connect(#[from] ConnectError),
}

impl KilnError {
    /// Whether this error is confined to a single frame.
    ///
    /// Frame-scoped errors are logged and dropped without touching the
    /// connection.
    #[must_use]
    pub fn is_frame_scoped(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
