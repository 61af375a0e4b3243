//! Reconnect backoff configuration and delay math.
//!
//! The connection manager owns the async side (sleeping, cancellation);
//! this module contains the portable building blocks:
//!
//! - [`BackoffConfig`]: base/max delay and jitter parameters
//! - [`backoff_delay`]: exponential backoff with symmetric jitter

use serde::{Deserialize, Serialize};

/// Default base delay between reconnect attempts, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay between reconnect attempts, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Parameters for reconnect backoff.
///
/// Retries are unlimited while the client intends to stay connected; the
/// delay between them grows exponentially from `base_delay_ms` and is
/// capped at `max_delay_ms`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Base delay in ms (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// Calculate the delay before the next reconnect attempt.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (random*2-1) * jitter)`
///
/// `random` must be in `[0.0, 1.0)`; it maps to a symmetric ±jitter range
/// around the capped exponential value.
///
/// * `attempt` — zero-based attempt index (0 for the first retry)
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay(attempt: u32, config: &BackoffConfig, random: f64) -> u64 {
    // Exponential growth, saturating so high attempts cannot overflow.
    let exponential = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(config.max_delay_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * config.jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}
