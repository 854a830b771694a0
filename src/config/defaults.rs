// Defaults mirror the library constants so an empty config file changes nothing

use super::types::{BlockedProbeConfig, SocketConfig, TestChannelConfig};
use crate::core::channel::probe::ProbeOptions;
use crate::core::channel::socket::backoff::{DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CEILING_MS};
use crate::core::channel::socket::BinaryType;
use crate::core::channel::test_channel::{TestChannelOptions, DEFAULT_BLOCKED_IMAGE_PATH};

impl Default for TestChannelConfig {
    fn default() -> Self {
        let options = TestChannelOptions::default();
        TestChannelConfig {
            request_timeout_ms: options.request_timeout_ms,
            early_detection_threshold_ms: options.early_detection_threshold_ms,
            buffered_gap_threshold_ms: options.buffered_gap_threshold_ms,
            supports_streaming: options.capabilities.supports_streaming,
        }
    }
}

impl Default for BlockedProbeConfig {
    fn default() -> Self {
        let probe = ProbeOptions::blocked_check();
        BlockedProbeConfig {
            image_path: DEFAULT_BLOCKED_IMAGE_PATH.to_string(),
            timeout_ms: probe.timeout_ms,
            retries: probe.retries,
            pause_ms: probe.pause_ms,
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            auto_reconnect: true,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_ceiling_ms: DEFAULT_BACKOFF_CEILING_MS,
            binary_type: BinaryType::default(),
        }
    }
}
