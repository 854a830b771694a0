//! Reconnecting full-duplex socket
//!
//! [`PersistentSocket`] wraps one platform transport at a time, normalizes
//! its events into [`SocketEvent`] and reconnects with exponential back-off
//! after unexpected closes.

pub mod backoff;
pub mod events;
pub mod persistent;
pub mod transport;

pub use backoff::{exponential_backoff, BackoffFn, ExponentialBackoff};
pub use events::{SocketEvent, SocketEventKind};
pub use persistent::{EventBridge, PersistentSocket, SocketError, SocketOptions};
pub use transport::{BinaryType, MessageData, ReadyState, SocketTransport, TransportError, TransportFactory};
