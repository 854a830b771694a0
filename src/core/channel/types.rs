//! Core types for channel negotiation and transport

/// Negotiation stage of a [`TestChannel`](super::TestChannel)
///
/// A channel has no state until `connect` is called. Transitions are strictly
/// ordered: `Init` → (`CheckingBlocked`) → `ConnectionTesting`. No state is
/// ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TestState {
    /// Stage 1: fetching server parameters (`MODE=init`)
    Init,
    /// Probing the blocked prefix for administrative network blocking
    CheckingBlocked,
    /// Stage 2: timing chunk delivery to detect buffering proxies
    ConnectionTesting,
}

impl std::fmt::Display for TestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestState::Init => write!(f, "init"),
            TestState::CheckingBlocked => write!(f, "checking_blocked"),
            TestState::ConnectionTesting => write!(f, "connection_testing"),
        }
    }
}

/// Classification of a failed channel request
///
/// Carried by `test_connection_failure` so the owner can pick a fallback
/// without parsing error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RequestErrorKind {
    /// Transport-level failure or non-2xx status
    Status,
    /// The request watchdog expired before the response finished
    Timeout,
    /// Response payload missing or unparsable
    BadData,
    /// A consumer callback panicked while handling the response
    HandlerException,
}

impl RequestErrorKind {
    /// Stable snake_case name used in logs and CLI output
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestErrorKind::Status => "request_failed",
            RequestErrorKind::Timeout => "timeout",
            RequestErrorKind::BadData => "bad_data",
            RequestErrorKind::HandlerException => "handler_exception",
        }
    }
}

impl std::fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a request issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub kind: RequestErrorKind,
    /// HTTP status if the server answered at all
    pub status_code: Option<u16>,
    pub message: String,
}

impl RequestFailure {
    pub fn new(kind: RequestErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code,
            message: message.into(),
        }
    }
}

/// Terminal result of [`TestChannel::connect`](super::TestChannel::connect)
///
/// Every variant except `Aborted` has already been delivered to the owner
/// through the matching `TestChannelOwner` callback when `connect` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    /// Negotiation finished; `unbuffered = true` means chunks stream through
    Finished { unbuffered: bool },
    /// A request failed
    Failed(RequestErrorKind),
    /// The blocked-prefix probe failed: the network blocks the channel
    Blocked,
    /// `abort()` was called; no callback fired
    Aborted,
}

/// Cached stage-1 result an owner can hand back to skip the init request
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct FirstTestResults {
    pub host_prefix: Option<String>,
    pub blocked_prefix: Option<String>,
}

/// Discrete network events reported to a [`ReachabilityNotifier`](super::ReachabilityNotifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ServerReachability {
    RequestMade,
    RequestSucceeded,
    RequestFailed,
    BackChannelActivity,
}

/// Negotiation statistics reported alongside reachability events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ChannelStat {
    TestStageOneStart,
    TestStageOneFailed,
    TestStageTwoStart,
    /// Chunk one arrived on its own
    TestStageTwoDataOne,
    /// Chunk two arrived after chunk one
    TestStageTwoDataTwo,
    /// Both chunks arrived in a single delivery
    TestStageTwoDataBoth,
    TestStageTwoFailed,
    /// A buffering proxy was detected
    Proxy,
    /// No buffering proxy: streaming works
    NoProxy,
    ChannelBlocked,
}

/// Transport capability resolved once by the platform layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransportCapabilities {
    /// Partial response chunks are delivered as they arrive
    pub supports_streaming: bool,
}

impl Default for TransportCapabilities {
    fn default() -> Self {
        Self {
            supports_streaming: true,
        }
    }
}

/// Errors for API misuse of a test channel
#[derive(Debug, thiserror::Error)]
pub enum TestChannelError {
    #[error("test channel already used (state: {0})")]
    AlreadyStarted(TestState),
    #[error("URI construction failed: {0}")]
    Uri(#[from] super::uri::UriError),
}
