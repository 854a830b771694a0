//! Connection Probing Module
//!
//! Image-load based reachability checks:
//! - One probe = up to `retries + 1` attempts, each with a fresh cache-busting token
//! - Hard per-attempt timeout and a fixed pause between attempts
//! - Reachability events reported to a shared notifier

pub mod checker;
pub mod client;
pub mod config;

// Re-export public API
pub use checker::ConnectionProbe;
pub use client::{ImageLoadError, ImageLoader};
pub use config::ProbeOptions;

#[cfg(feature = "network")]
pub use client::IsahcImageLoader;
