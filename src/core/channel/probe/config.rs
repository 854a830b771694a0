//! Probe Configuration

use std::time::Duration;

/// Retry and timing options for a single connection probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Hard timeout for each attempt in milliseconds
    pub timeout_ms: u64,

    /// Additional attempts after the first one fails
    pub retries: u32,

    /// Pause between a failed attempt and the next one in milliseconds
    pub pause_ms: u64,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self::blocked_check()
    }
}

impl ProbeOptions {
    /// Options used when checking a blocked prefix during negotiation
    pub fn blocked_check() -> Self {
        Self {
            timeout_ms: 5000,
            retries: 3,
            pause_ms: 2000,
        }
    }

    /// Single attempt, no retries
    pub fn single(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            retries: 0,
            pause_ms: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}
