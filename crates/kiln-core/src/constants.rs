//! Resource limits and protocol defaults.
//!
//! These constants back the security guarantees of the client: inbound
//! frames are bounded in size, listener registration is bounded per prompt
//! and globally, and the number of live connections is bounded per process.
//! Configured values may lower most of them but never raise a hard ceiling.

/// Default maximum inbound frame size in bytes (10 MiB).
///
/// Frames strictly larger than the configured limit are rejected before
/// any parsing work happens.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Hard upper bound for any configured message size limit (50 MiB).
pub const MAX_MESSAGE_SIZE_CEILING: usize = 50 * 1024 * 1024;

/// Maximum listeners registered for a single prompt.
pub const MAX_LISTENERS_PER_PROMPT: usize = 100;

/// Maximum listeners registered across all prompts.
pub const MAX_TOTAL_LISTENERS: usize = 1024;

/// Maximum concurrently started clients per process.
pub const MAX_CONNECTIONS: usize = 32;

/// Consecutive undecodable frames tolerated before a forced reconnect.
pub const DEFAULT_BAD_FRAME_THRESHOLD: u32 = 8;

/// Consecutive dropped deliveries tolerated before a listener is evicted.
pub const DEFAULT_MAX_CONSECUTIVE_DROPS: u32 = 16;

/// Default connection handshake timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connected uptime after which the reconnect backoff resets, in seconds.
pub const DEFAULT_HEALTHY_RESET_SECS: u64 = 30;
