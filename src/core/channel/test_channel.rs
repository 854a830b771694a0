/*!
Two-stage connection-capability negotiation.

A `TestChannel` decides, before a long-lived channel is opened, which kind of
back channel the network between client and server can carry.

## Stages

- **Init** (stage 1): `GET <path>?MODE=init` returns `[hostPrefix, blockedPrefix]`.
  The owner corrects the host prefix; a non-empty blocked prefix triggers the
  blocked check.
- **CheckingBlocked**: an image probe against the blocked prefix. Failure
  means an administrator blocks the channel; negotiation stops there.
- **ConnectionTesting** (stage 2): `GET <path>?TYPE=xmlhttp|html`. The server
  sends `"11111"`, waits about two seconds, then sends a second chunk. Seeing
  the chunks separately means no buffering proxy is in the way.

Every outcome is delivered to the owner through exactly one
[`TestChannelOwner`] callback; `connect` also returns it. A channel is used
once and then discarded.
*/

use crate::core::channel::debug_logger::get_debug_logger;
use crate::core::channel::events::contain;
use crate::core::channel::parser::{extract_prefixes, JsonResponseParser, ResponseParser};
use crate::core::channel::probe::{ConnectionProbe, ImageLoader, ProbeOptions};
use crate::core::channel::request::{
    ChannelRequest, ChannelRequester, RequestMode, ResponseEvent, ResponseStream,
};
use crate::core::channel::stats::{NullNotifier, ReachabilityNotifier};
use crate::core::channel::timing::{Clock, SystemClock};
use crate::core::channel::types::*;
use crate::core::channel::uri::{set_parameter, ChannelEndpoint};
use futures::future::{AbortHandle, Abortable};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Chunk-one payload; five digits so a proxy buffering a few bytes is not
/// mistaken for one that buffers whole responses
pub const STAGE_TWO_SENTINEL: &str = "11111";

/// Path of the image fetched from the blocked prefix
pub const DEFAULT_BLOCKED_IMAGE_PATH: &str = "/mail/images/cleardot.gif";

const COMPONENT: &str = "TestChannel";

/// The orchestrator that owns a test channel
///
/// Query methods have defaults so an owner only implements what it caches or
/// customizes. Callbacks run inside a containment boundary: a panicking owner
/// is logged and does not affect the channel.
pub trait TestChannelOwner: Send + Sync {
    /// Previously computed stage-1 result; skips the init request
    fn first_test_results(&self) -> Option<FirstTestResults> {
        None
    }

    /// Previously computed stage-2 result (`true` = buffered); skips stage 2
    fn second_test_results(&self) -> Option<bool> {
        None
    }

    /// Turn the raw host prefix sent by the server into the one to use
    fn correct_host_prefix(&self, raw: Option<&str>) -> Option<String> {
        raw.filter(|p| !p.is_empty()).map(str::to_string)
    }

    /// Whether back-channel requests go to the prefixed host
    fn should_use_secondary_domains(&self) -> bool {
        false
    }

    fn is_active(&self) -> bool {
        true
    }

    /// Negotiation completed; `unbuffered = true` means streaming works
    fn test_connection_finished(&self, channel: &TestChannel, unbuffered: bool);

    /// A negotiation request failed
    fn test_connection_failure(&self, channel: &TestChannel, kind: RequestErrorKind);

    /// The blocked-prefix probe failed: the network blocks the channel
    fn test_connection_blocked(&self, channel: &TestChannel);
}

/// Tunables for one negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestChannelOptions {
    /// Watchdog for each request; reset whenever data arrives
    pub request_timeout_ms: u64,
    /// Chunk one arriving sooner than this after `connect` proves streaming
    pub early_detection_threshold_ms: u64,
    /// Minimum gap between first and last data on non-streaming transports
    pub buffered_gap_threshold_ms: u64,
    pub blocked_image_path: String,
    pub blocked_probe: ProbeOptions,
    pub capabilities: TransportCapabilities,
}

impl Default for TestChannelOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: 45_000,
            early_detection_threshold_ms: 500,
            buffered_gap_threshold_ms: 200,
            blocked_image_path: DEFAULT_BLOCKED_IMAGE_PATH.to_string(),
            blocked_probe: ProbeOptions::blocked_check(),
            capabilities: TransportCapabilities::default(),
        }
    }
}

#[derive(Default)]
struct AbortSlot {
    handle: Option<AbortHandle>,
    requested: bool,
}

/// Cloneable handle that aborts a running negotiation from elsewhere
#[derive(Clone)]
pub struct TestChannelAbort {
    slot: Arc<Mutex<AbortSlot>>,
}

impl TestChannelAbort {
    /// Cancel the in-flight request; `connect` returns `TestOutcome::Aborted`
    /// and no owner callback fires
    pub fn abort(&self) {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.requested = true;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }
}

/// Single-use connection-capability negotiation
pub struct TestChannel {
    owner: Arc<dyn TestChannelOwner>,
    endpoint: ChannelEndpoint,
    requester: Arc<dyn ChannelRequester>,
    image_loader: Arc<dyn ImageLoader>,
    parser: Box<dyn ResponseParser>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn ReachabilityNotifier>,
    options: TestChannelOptions,
    extra_headers: HashMap<String, String>,
    correlation_id: String,

    state: Option<TestState>,
    path: Option<String>,
    host_prefix: Option<String>,
    blocked_prefix: Option<String>,
    start_time: u64,
    first_time: u64,
    last_time: u64,
    received_intermediate_result: bool,
    /// Stage-2 text seen before chunk one was recognized
    stage_two_text: String,
    last_status_code: i32,
    abort: TestChannelAbort,
}

impl TestChannel {
    /// Create a channel negotiating with `endpoint` on behalf of `owner`
    pub fn new(
        owner: Arc<dyn TestChannelOwner>,
        endpoint: ChannelEndpoint,
        requester: Arc<dyn ChannelRequester>,
        image_loader: Arc<dyn ImageLoader>,
    ) -> Self {
        Self {
            owner,
            endpoint,
            requester,
            image_loader,
            parser: Box::new(JsonResponseParser),
            clock: Arc::new(SystemClock::new()),
            notifier: Arc::new(NullNotifier),
            options: TestChannelOptions::default(),
            extra_headers: HashMap::new(),
            correlation_id: format!("test_{}", uuid::Uuid::new_v4()),
            state: None,
            path: None,
            host_prefix: None,
            blocked_prefix: None,
            start_time: 0,
            first_time: 0,
            last_time: 0,
            received_intermediate_result: false,
            stage_two_text: String::new(),
            last_status_code: -1,
            abort: TestChannelAbort {
                slot: Arc::new(Mutex::new(AbortSlot::default())),
            },
        }
    }

    /// Configure a custom stage-1 parser
    pub fn with_parser(mut self, parser: Box<dyn ResponseParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Configure a custom clock (for testing)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configure the sink for reachability events and statistics
    pub fn with_notifier(mut self, notifier: Arc<dyn ReachabilityNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_options(mut self, options: TestChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Headers sent with every negotiation request
    pub fn set_extra_headers(&mut self, headers: HashMap<String, String>) {
        self.extra_headers = headers;
    }

    /// Handle that can abort this channel while `connect` is running
    pub fn abort_handle(&self) -> TestChannelAbort {
        self.abort.clone()
    }

    /// Cancel any in-flight request and reset status tracking
    ///
    /// The state is left as is: an aborted channel cannot be restarted.
    pub fn abort(&mut self) {
        self.abort.abort();
        self.last_status_code = -1;
    }

    pub fn state(&self) -> Option<TestState> {
        self.state
    }

    pub fn host_prefix(&self) -> Option<&str> {
        self.host_prefix.as_deref()
    }

    pub fn blocked_prefix(&self) -> Option<&str> {
        self.blocked_prefix.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Status of the most recent request; -1 before any request completes
    pub fn last_status_code(&self) -> i32 {
        self.last_status_code
    }

    pub fn received_intermediate_result(&self) -> bool {
        self.received_intermediate_result
    }

    /// `(start, first, last)` timestamps in ms since the epoch
    pub fn timings(&self) -> (u64, u64, u64) {
        (self.start_time, self.first_time, self.last_time)
    }

    pub fn is_active(&self) -> bool {
        contain(COMPONENT, "is_active", || self.owner.is_active()).unwrap_or(false)
    }

    pub fn should_use_secondary_domains(&self) -> bool {
        contain(COMPONENT, "should_use_secondary_domains", || {
            self.owner.should_use_secondary_domains()
        })
        .unwrap_or(false)
    }

    /// Forward a reachability event to the notifier
    pub fn notify_server_reachability_event(&self, event: ServerReachability) {
        self.notifier.notify_reachability(event);
    }

    /// Run the negotiation against `path`
    ///
    /// # Returns
    /// * `Ok(TestOutcome)` - The outcome, already delivered to the owner
    ///   (except `Aborted`, which is never delivered)
    /// * `Err(TestChannelError)` - The channel was already used, or `path`
    ///   cannot form a URI
    pub async fn connect(&mut self, path: &str) -> Result<TestOutcome, TestChannelError> {
        if let Some(state) = self.state {
            return Err(TestChannelError::AlreadyStarted(state));
        }

        let (handle, registration) = AbortHandle::new_pair();
        {
            let mut slot = match self.abort.slot.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.requested {
                self.last_status_code = -1;
                return Ok(TestOutcome::Aborted);
            }
            slot.handle = Some(handle);
        }

        let result = Abortable::new(self.run(path), registration).await;

        if let Ok(mut slot) = self.abort.slot.lock() {
            slot.handle = None;
        }

        match result {
            Ok(outcome) => outcome,
            Err(_aborted) => {
                self.last_status_code = -1;
                get_debug_logger().debug_sync(COMPONENT, "aborted", "TestConnection: aborted");
                Ok(TestOutcome::Aborted)
            }
        }
    }

    async fn run(&mut self, path: &str) -> Result<TestOutcome, TestChannelError> {
        let mut init_uri = self.endpoint.forward_channel_uri(path)?;
        self.path = Some(path.to_string());

        self.state = Some(TestState::Init);
        self.notifier.notify_stat(ChannelStat::TestStageOneStart);
        self.start_time = self.clock.now_ms();

        // Cached stage-1 results skip the init request entirely
        let cached = contain(COMPONENT, "first_test_results", || self.owner.first_test_results())
            .flatten();
        if let Some(cached) = cached {
            let host_prefix = match self.corrected_host_prefix(cached.host_prefix.as_deref()) {
                Some(prefix) => prefix,
                None => return Ok(self.fail(RequestErrorKind::HandlerException)),
            };
            self.host_prefix = host_prefix;
            self.blocked_prefix = cached.blocked_prefix.filter(|p| !p.is_empty());
            return Ok(self.after_stage_one().await);
        }

        set_parameter(&mut init_uri, "MODE", "init");
        get_debug_logger().channel_stage_start("stage 1", init_uri.as_str(), self.correlation_id.clone());

        Ok(self.run_init(init_uri).await)
    }

    async fn run_init(&mut self, uri: url::Url) -> TestOutcome {
        let mut stream = self.issue(uri, RequestMode::XmlHttp).await;
        let mut body = String::new();

        loop {
            match self.next_event(&mut stream).await {
                ResponseEvent::Data(text) => body.push_str(&text),
                ResponseEvent::Complete { status_code } => {
                    self.last_status_code = i32::from(status_code);
                    self.notifier
                        .notify_reachability(ServerReachability::RequestSucceeded);
                    break;
                }
                ResponseEvent::Failed(failure) => {
                    self.notifier.notify_stat(ChannelStat::TestStageOneFailed);
                    return self.request_failed(failure);
                }
            }
        }
        drop(stream);

        if body.is_empty() {
            get_debug_logger().debug_sync(COMPONENT, "bad_data", "TestConnection: Null responseText");
            return self.fail(RequestErrorKind::BadData);
        }

        let items = match self.parser.parse(&body) {
            Ok(items) => items,
            Err(e) => {
                get_debug_logger().error_sync(COMPONENT, "bad_data", &format!("TestConnection: {}", e));
                return self.fail(RequestErrorKind::BadData);
            }
        };

        let (host_raw, blocked) = extract_prefixes(&items);
        let host_prefix = match self.corrected_host_prefix(host_raw.as_deref()) {
            Some(prefix) => prefix,
            None => return self.fail(RequestErrorKind::HandlerException),
        };
        self.host_prefix = host_prefix;
        self.blocked_prefix = blocked;

        self.after_stage_one().await
    }

    /// Outer `None` means the owner panicked
    fn corrected_host_prefix(&self, raw: Option<&str>) -> Option<Option<String>> {
        contain(COMPONENT, "correct_host_prefix", || self.owner.correct_host_prefix(raw))
    }

    async fn after_stage_one(&mut self) -> TestOutcome {
        if self.blocked_prefix.is_some() {
            self.state = Some(TestState::CheckingBlocked);
            self.check_blocked().await
        } else {
            self.state = Some(TestState::ConnectionTesting);
            self.connect_stage2().await
        }
    }

    async fn check_blocked(&mut self) -> TestOutcome {
        let uri = match self
            .endpoint
            .create_data_uri(self.blocked_prefix.as_deref(), &self.options.blocked_image_path)
        {
            Ok(uri) => uri,
            Err(e) => {
                get_debug_logger().error_sync(COMPONENT, "bad_data", &format!("Blocked prefix unusable: {}", e));
                return self.fail(RequestErrorKind::BadData);
            }
        };
        get_debug_logger().channel_stage_start("blocked check", uri.as_str(), self.correlation_id.clone());

        let mut probe = ConnectionProbe::new(Arc::clone(&self.image_loader))
            .with_notifier(Arc::clone(&self.notifier));
        let reachable = probe
            .probe_with_options(&uri, &self.options.blocked_probe)
            .await;

        if reachable {
            self.state = Some(TestState::ConnectionTesting);
            self.connect_stage2().await
        } else {
            self.notifier.notify_stat(ChannelStat::ChannelBlocked);
            get_debug_logger().channel_finished("blocked", self.elapsed_ms(), self.correlation_id.clone());
            contain(COMPONENT, "test_connection_blocked", || {
                self.owner.test_connection_blocked(self)
            });
            TestOutcome::Blocked
        }
    }

    async fn connect_stage2(&mut self) -> TestOutcome {
        let cached = contain(COMPONENT, "second_test_results", || self.owner.second_test_results())
            .flatten();
        if let Some(buffered) = cached {
            get_debug_logger().debug_sync(
                COMPONENT,
                "stage2_skipped",
                &format!("TestConnection: skipping stage 2, precomputed result is {}",
                         if buffered { "Buffered" } else { "Unbuffered" }),
            );
            self.notifier.notify_stat(ChannelStat::TestStageTwoStart);
            return self.report_stage_two(!buffered);
        }

        let path = self.path.clone().unwrap_or_default();
        let use_secondary = self.should_use_secondary_domains();
        let mut uri = match self
            .endpoint
            .back_channel_uri(self.host_prefix.as_deref(), &path, use_secondary)
        {
            Ok(uri) => uri,
            Err(e) => {
                get_debug_logger().error_sync(COMPONENT, "bad_data", &format!("Host prefix unusable: {}", e));
                return self.fail(RequestErrorKind::BadData);
            }
        };

        let mode = if self.options.capabilities.supports_streaming {
            RequestMode::XmlHttp
        } else {
            RequestMode::Html
        };
        set_parameter(&mut uri, "TYPE", mode.type_param());
        get_debug_logger().channel_stage_start("stage 2", uri.as_str(), self.correlation_id.clone());
        self.notifier.notify_stat(ChannelStat::TestStageTwoStart);

        let mut stream = self.issue(uri, mode).await;

        loop {
            match self.next_event(&mut stream).await {
                ResponseEvent::Data(text) => {
                    if self.on_stage_two_data(&text) {
                        // Streaming confirmed early: cancel and assume HTTP 200
                        drop(stream);
                        self.last_status_code = 200;
                        return self.report_stage_two(true);
                    }
                }
                ResponseEvent::Complete { status_code } => {
                    self.last_status_code = i32::from(status_code);
                    self.notifier
                        .notify_reachability(ServerReachability::RequestSucceeded);
                    return self.on_stage_two_complete();
                }
                ResponseEvent::Failed(failure) => {
                    self.notifier.notify_stat(ChannelStat::TestStageTwoFailed);
                    return self.request_failed(failure);
                }
            }
        }
    }

    /// Returns true when the early-exit check declares the connection unbuffered
    fn on_stage_two_data(&mut self, text: &str) -> bool {
        let now = self.clock.now_ms();

        if self.received_intermediate_result {
            self.notifier.notify_stat(ChannelStat::TestStageTwoDataTwo);
            self.last_time = now;
            return false;
        }

        // Chunk one may itself be split across deliveries
        self.stage_two_text.push_str(text);
        if self.stage_two_text == STAGE_TWO_SENTINEL {
            self.notifier.notify_stat(ChannelStat::TestStageTwoDataOne);
            self.received_intermediate_result = true;
            self.first_time = now;
            return self.check_for_early_non_buffered();
        }
        if STAGE_TWO_SENTINEL.starts_with(self.stage_two_text.as_str()) {
            return false;
        }

        self.notifier.notify_stat(ChannelStat::TestStageTwoDataBoth);
        self.first_time = now;
        self.last_time = now;
        self.received_intermediate_result = false;
        false
    }

    fn check_for_early_non_buffered(&self) -> bool {
        let ms = self.first_time.saturating_sub(self.start_time);
        self.options.capabilities.supports_streaming && ms < self.options.early_detection_threshold_ms
    }

    fn on_stage_two_complete(&mut self) -> TestOutcome {
        let unbuffered = if self.options.capabilities.supports_streaming {
            self.received_intermediate_result
        } else {
            // Non-streaming transports always deliver chunks separately, so
            // only the arrival gap tells the two cases apart
            self.last_time.saturating_sub(self.first_time) >= self.options.buffered_gap_threshold_ms
        };
        self.report_stage_two(unbuffered)
    }

    fn report_stage_two(&self, unbuffered: bool) -> TestOutcome {
        if unbuffered {
            self.notifier.notify_stat(ChannelStat::NoProxy);
        } else {
            self.notifier.notify_stat(ChannelStat::Proxy);
        }
        self.finish(unbuffered)
    }

    async fn issue(&self, uri: url::Url, mode: RequestMode) -> ResponseStream {
        self.notifier
            .notify_reachability(ServerReachability::RequestMade);
        let request = ChannelRequest {
            url: uri,
            headers: self.extra_headers.clone(),
            mode,
        };
        self.requester.get(request).await
    }

    async fn next_event(&self, stream: &mut ResponseStream) -> ResponseEvent {
        let watchdog = Duration::from_millis(self.options.request_timeout_ms);
        match tokio::time::timeout(watchdog, stream.next()).await {
            Ok(Some(event)) => event,
            Ok(None) => ResponseEvent::Failed(RequestFailure::new(
                RequestErrorKind::Status,
                None,
                "response ended without completing",
            )),
            Err(_) => ResponseEvent::Failed(RequestFailure::new(
                RequestErrorKind::Timeout,
                None,
                format!("no data for {}ms", self.options.request_timeout_ms),
            )),
        }
    }

    fn request_failed(&mut self, failure: RequestFailure) -> TestOutcome {
        self.last_status_code = failure.status_code.map_or(-1, i32::from);
        self.notifier
            .notify_reachability(ServerReachability::RequestFailed);
        let stage = self.state.map(|s| s.to_string()).unwrap_or_default();
        get_debug_logger().channel_request_failed(
            &stage,
            failure.kind.as_str(),
            self.last_status_code,
            self.correlation_id.clone(),
        );
        self.fail(failure.kind)
    }

    fn fail(&self, kind: RequestErrorKind) -> TestOutcome {
        get_debug_logger().channel_finished(kind.as_str(), self.elapsed_ms(), self.correlation_id.clone());
        contain(COMPONENT, "test_connection_failure", || {
            self.owner.test_connection_failure(self, kind)
        });
        TestOutcome::Failed(kind)
    }

    fn finish(&self, unbuffered: bool) -> TestOutcome {
        let outcome = if unbuffered { "unbuffered" } else { "buffered" };
        get_debug_logger().channel_finished(outcome, self.elapsed_ms(), self.correlation_id.clone());
        contain(COMPONENT, "test_connection_finished", || {
            self.owner.test_connection_finished(self, unbuffered)
        });
        TestOutcome::Finished { unbuffered }
    }

    fn elapsed_ms(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.start_time)
    }
}
