//! Platform transport seam
//!
//! The crate ships no WebSocket client. The platform supplies a
//! [`TransportFactory`] whose transports report their lifecycle through the
//! [`EventBridge`] handed to `connect`.

use crate::core::channel::socket::persistent::EventBridge;
use serde::{Deserialize, Serialize};

/// Framing for binary messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryType {
    #[default]
    Blob,
    ArrayBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    Text(String),
    ArrayBuffer(Vec<u8>),
    Blob(Vec<u8>),
}

impl MessageData {
    /// Wrap raw binary payload according to `binary_type`
    pub fn binary(bytes: Vec<u8>, binary_type: BinaryType) -> Self {
        match binary_type {
            BinaryType::Blob => MessageData::Blob(bytes),
            BinaryType::ArrayBuffer => MessageData::ArrayBuffer(bytes),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MessageData::Text(text) => text.len(),
            MessageData::ArrayBuffer(bytes) | MessageData::Blob(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {url}: {reason}")]
    Open { url: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
}

/// One live full-duplex connection
pub trait SocketTransport: Send {
    fn send(&mut self, message: MessageData) -> Result<(), TransportError>;

    /// Begin closing; the close event arrives later through the bridge
    fn close(&mut self);

    fn ready_state(&self) -> ReadyState;

    /// Bytes queued by `send` but not yet transmitted
    fn buffered_amount(&self) -> usize;
}

/// Creates transports for a [`PersistentSocket`](super::PersistentSocket)
pub trait TransportFactory: Send + Sync {
    /// Start connecting to `url`
    ///
    /// # Implementation Requirements
    /// * Events must be delivered through `bridge` after `connect` returns,
    ///   never from inside it
    /// * Binary payloads are reported framed per `binary_type`
    fn connect(
        &self,
        url: &str,
        protocol: Option<&str>,
        binary_type: BinaryType,
        bridge: EventBridge,
    ) -> Result<Box<dyn SocketTransport>, TransportError>;
}
