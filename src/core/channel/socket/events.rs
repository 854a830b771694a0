use crate::core::channel::events::Event;
use crate::core::channel::socket::transport::MessageData;

/// Normalized socket events delivered to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
    },
    /// Payload exactly as the transport delivered it
    Message(MessageData),
    /// Transport error; reconnection is driven by the close that follows, if any
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEventKind {
    Opened,
    Closed,
    Message,
    Error,
}

impl Event for SocketEvent {
    type Kind = SocketEventKind;

    fn kind(&self) -> SocketEventKind {
        match self {
            SocketEvent::Opened => SocketEventKind::Opened,
            SocketEvent::Closed { .. } => SocketEventKind::Closed,
            SocketEvent::Message(_) => SocketEventKind::Message,
            SocketEvent::Error(_) => SocketEventKind::Error,
        }
    }
}
