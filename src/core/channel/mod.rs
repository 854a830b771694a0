pub mod debug_logger;
pub mod events;
pub mod parser;
pub mod probe;
pub mod request;
pub mod socket;
pub mod stats;
pub mod test_channel;
pub mod timing;
pub mod types;
pub mod uri;

// Re-export commonly used items
pub use debug_logger::{get_debug_logger, ChannelDebugLogger};
pub use parser::{JsonResponseParser, ParseError, ResponseParser};
pub use probe::{ConnectionProbe, ImageLoadError, ImageLoader};
pub use request::{ChannelRequest, ChannelRequester, RequestMode, ResponseEvent, ResponseStream};
pub use socket::{PersistentSocket, SocketEvent, SocketEventKind, SocketOptions};
pub use stats::{NullNotifier, ReachabilityNotifier, StatsRecorder};
pub use test_channel::{TestChannel, TestChannelAbort, TestChannelOwner, TestChannelOptions};
pub use timing::{Clock, Scheduler, SystemClock, TimerHandle, TokioScheduler};
pub use types::*;
pub use uri::{ChannelEndpoint, UriError};

#[cfg(feature = "network")]
pub use probe::IsahcImageLoader;
#[cfg(feature = "network")]
pub use request::IsahcChannelRequester;
