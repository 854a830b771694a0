//! Reconnect delay policies

use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_CEILING_MS: u64 = 60_000;

/// Maps a reconnect attempt number to the delay before that attempt
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// `min(2^attempt * base, ceiling)`, saturating instead of overflowing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BACKOFF_BASE_MS,
            ceiling_ms: DEFAULT_BACKOFF_CEILING_MS,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(base_ms: u64, ceiling_ms: u64) -> Self {
        Self { base_ms, ceiling_ms }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.ceiling_ms))
    }

    pub fn into_fn(self) -> BackoffFn {
        Arc::new(move |attempt| self.delay(attempt))
    }
}

/// Default policy: `min(2^attempt * 1000, 60000)` ms
pub fn exponential_backoff(attempt: u32) -> Duration {
    ExponentialBackoff::default().delay(attempt)
}
