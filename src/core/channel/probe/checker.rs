//! Connection Probe Logic
//!
//! Retryable "is this endpoint reachable" check built on image loads.

use crate::core::channel::debug_logger::get_debug_logger;
use crate::core::channel::probe::{client::ImageLoader, config::ProbeOptions};
use crate::core::channel::stats::{NullNotifier, ReachabilityNotifier};
use crate::core::channel::types::ServerReachability;
use crate::core::channel::uri::make_unique;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Image-load reachability probe with bounded retries
///
/// `probe` takes `&mut self`, so one instance can only run one probe at a
/// time; use separate instances for independent checks.
pub struct ConnectionProbe {
    loader: Arc<dyn ImageLoader>,
    notifier: Arc<dyn ReachabilityNotifier>,
}

impl ConnectionProbe {
    pub fn new(loader: Arc<dyn ImageLoader>) -> Self {
        Self {
            loader,
            notifier: Arc::new(NullNotifier),
        }
    }

    /// Configure the sink for reachability events
    pub fn with_notifier(mut self, notifier: Arc<dyn ReachabilityNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Check whether the image at `url` can be loaded
    ///
    /// # Arguments
    /// * `url` - Image URL; a fresh `zx` token is appended for every attempt
    /// * `timeout` - Hard limit for each attempt
    /// * `retries_remaining` - Attempts allowed after the first failure
    /// * `pause` - Wait between a failed attempt and the next one
    ///
    /// # Returns
    /// `true` as soon as one attempt succeeds, `false` once all
    /// `retries_remaining + 1` attempts have failed. The result is produced
    /// exactly once and no timer outlives the call.
    ///
    /// # Events
    /// `RequestMade` before every attempt; `RequestSucceeded` once, on success.
    pub async fn probe(
        &mut self,
        url: &Url,
        timeout: Duration,
        retries_remaining: u32,
        pause: Duration,
    ) -> bool {
        let debug_logger = get_debug_logger();
        let probe_start = tokio::time::Instant::now();
        let mut remaining = retries_remaining;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let mut attempt_url = url.clone();
            make_unique(&mut attempt_url);
            debug_logger.probe_attempt(attempt_url.as_str(), attempt, remaining);

            self.notifier.notify_reachability(ServerReachability::RequestMade);

            let loaded = matches!(
                tokio::time::timeout(timeout, self.loader.load_image(&attempt_url)).await,
                Ok(Ok(()))
            );

            if loaded {
                self.notifier
                    .notify_reachability(ServerReachability::RequestSucceeded);
                debug_logger.probe_result(true, attempt, probe_start.elapsed().as_millis() as u64);
                return true;
            }

            if remaining == 0 {
                debug_logger.probe_result(false, attempt, probe_start.elapsed().as_millis() as u64);
                return false;
            }

            remaining -= 1;
            tokio::time::sleep(pause).await;
        }
    }

    /// [`probe`](Self::probe) with timing taken from `options`
    pub async fn probe_with_options(&mut self, url: &Url, options: &ProbeOptions) -> bool {
        self.probe(url, options.timeout(), options.retries, options.pause())
            .await
    }
}
