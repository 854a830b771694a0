pub mod channel;

pub use channel::{
    ConnectionProbe, PersistentSocket, TestChannel, TestChannelOwner, TestOutcome,
};
