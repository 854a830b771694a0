use crate::core::channel::probe::ProbeOptions;
use crate::core::channel::socket::{BinaryType, ExponentialBackoff, SocketOptions};
use crate::core::channel::test_channel::TestChannelOptions;
use crate::core::channel::types::TransportCapabilities;
use serde::{Deserialize, Serialize};

/// Main config structure, stored as TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub test_channel: TestChannelConfig,
    pub blocked_probe: BlockedProbeConfig,
    pub socket: SocketConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestChannelConfig {
    pub request_timeout_ms: u64,
    pub early_detection_threshold_ms: u64,
    pub buffered_gap_threshold_ms: u64,
    /// Whether the platform transport delivers partial responses
    pub supports_streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockedProbeConfig {
    pub image_path: String,
    pub timeout_ms: u64,
    pub retries: u32,
    pub pause_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub auto_reconnect: bool,
    pub backoff_base_ms: u64,
    pub backoff_ceiling_ms: u64,
    pub binary_type: BinaryType,
}

impl Config {
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            timeout_ms: self.blocked_probe.timeout_ms,
            retries: self.blocked_probe.retries,
            pause_ms: self.blocked_probe.pause_ms,
        }
    }

    pub fn test_channel_options(&self) -> TestChannelOptions {
        TestChannelOptions {
            request_timeout_ms: self.test_channel.request_timeout_ms,
            early_detection_threshold_ms: self.test_channel.early_detection_threshold_ms,
            buffered_gap_threshold_ms: self.test_channel.buffered_gap_threshold_ms,
            blocked_image_path: self.blocked_probe.image_path.clone(),
            blocked_probe: self.probe_options(),
            capabilities: TransportCapabilities {
                supports_streaming: self.test_channel.supports_streaming,
            },
        }
    }

    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            auto_reconnect: self.socket.auto_reconnect,
            backoff: ExponentialBackoff::new(self.socket.backoff_base_ms, self.socket.backoff_ceiling_ms)
                .into_fn(),
            binary_type: self.socket.binary_type,
        }
    }
}
