//! Client configuration.
//!
//! All knobs have compiled defaults from [`kiln_core::constants`]. Values
//! can also come from the environment via [`StreamConfig::from_env`]; each
//! variable has strict parsing rules and invalid values are silently
//! ignored (falling back to the default).

use serde::{Deserialize, Serialize};

use kiln_core::constants::{
    DEFAULT_BAD_FRAME_THRESHOLD, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HEALTHY_RESET_SECS,
    DEFAULT_MAX_CONSECUTIVE_DROPS, DEFAULT_MAX_MESSAGE_SIZE, MAX_LISTENERS_PER_PROMPT,
    MAX_MESSAGE_SIZE_CEILING, MAX_TOTAL_LISTENERS,
};
use kiln_core::retry::BackoffConfig;

/// Configuration for the streaming client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    /// Maximum inbound frame size in bytes. Clamped to the 50 MiB ceiling.
    pub max_message_size: usize,
    /// Maximum listeners per prompt.
    pub max_listeners_per_prompt: usize,
    /// Maximum listeners across all prompts.
    pub max_total_listeners: usize,
    /// Connection handshake timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Reconnect backoff parameters.
    pub backoff: BackoffConfig,
    /// Connected uptime after which the backoff resets, in seconds.
    pub healthy_reset_secs: u64,
    /// Consecutive undecodable frames before a forced reconnect.
    pub bad_frame_threshold: u32,
    /// Consecutive dropped deliveries before a listener is evicted.
    pub max_consecutive_drops: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_listeners_per_prompt: MAX_LISTENERS_PER_PROMPT,
            max_total_listeners: MAX_TOTAL_LISTENERS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            backoff: BackoffConfig::default(),
            healthy_reset_secs: DEFAULT_HEALTHY_RESET_SECS,
            bad_frame_threshold: DEFAULT_BAD_FRAME_THRESHOLD,
            max_consecutive_drops: DEFAULT_MAX_CONSECUTIVE_DROPS,
        }
    }
}

impl StreamConfig {
    /// Defaults with environment variable overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        config
    }

    /// The message size limit actually enforced, never above the ceiling.
    #[must_use]
    pub fn effective_message_limit(&self) -> usize {
        self.max_message_size.min(MAX_MESSAGE_SIZE_CEILING)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Out-of-range or unparseable values are ignored.
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = read_usize(&get, "KILN_MAX_MESSAGE_SIZE", 1, MAX_MESSAGE_SIZE_CEILING) {
            self.max_message_size = v;
        }
        if let Some(v) = read_usize(&get, "KILN_MAX_LISTENERS_PER_PROMPT", 1, 1000) {
            self.max_listeners_per_prompt = v;
        }
        if let Some(v) = read_usize(&get, "KILN_MAX_TOTAL_LISTENERS", 1, 65_536) {
            self.max_total_listeners = v;
        }
        if let Some(v) = read_u64(&get, "KILN_CONNECT_TIMEOUT_SECS", 1, 300) {
            self.connect_timeout_secs = v;
        }
        if let Some(v) = read_u64(&get, "KILN_HEALTHY_RESET_SECS", 1, 3600) {
            self.healthy_reset_secs = v;
        }
    }
}

fn read_usize(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    get(name)?
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_u64(get: &impl Fn(&str) -> Option<String>, name: &str, min: u64, max: u64) -> Option<u64> {
    get(name)?
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}
