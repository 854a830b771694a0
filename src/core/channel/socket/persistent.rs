use crate::core::channel::debug_logger::get_debug_logger;
use crate::core::channel::events::{EventDispatcher, ListenerId};
use crate::core::channel::socket::backoff::{BackoffFn, ExponentialBackoff};
use crate::core::channel::socket::events::{SocketEvent, SocketEventKind};
use crate::core::channel::socket::transport::{
    BinaryType, MessageData, ReadyState, SocketTransport, TransportError, TransportFactory,
};
use crate::core::channel::stats::{NullNotifier, ReachabilityNotifier};
use crate::core::channel::timing::{Scheduler, TimerHandle};
use crate::core::channel::types::ServerReachability;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("socket already has a live transport")]
    AlreadyOpen,
    #[error("socket is not open")]
    NotOpen,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Clone)]
pub struct SocketOptions {
    /// Reconnect after unexpected closes
    pub auto_reconnect: bool,
    /// Delay before reconnect attempt `n`
    pub backoff: BackoffFn,
    pub binary_type: BinaryType,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            backoff: ExponentialBackoff::default().into_fn(),
            binary_type: BinaryType::default(),
        }
    }
}

impl std::fmt::Debug for SocketOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketOptions")
            .field("auto_reconnect", &self.auto_reconnect)
            .field("binary_type", &self.binary_type)
            .finish_non_exhaustive()
    }
}

struct SocketState {
    transport: Option<Box<dyn SocketTransport>>,
    url: Option<String>,
    protocol: Option<String>,
    reconnect_attempt: u32,
    next_reconnect_delay: Duration,
    close_expected: bool,
    reconnect_timer: Option<TimerHandle>,
    /// Bumped per transport; events tagged with an older value are ignored
    generation: u64,
    /// Bumped by `open`/`close`; a reconnect timer armed under an older
    /// value must not reopen
    timer_token: u64,
    notifier: Arc<dyn ReachabilityNotifier>,
}

struct Shared {
    state: Mutex<SocketState>,
    options: SocketOptions,
    factory: Arc<dyn TransportFactory>,
    scheduler: Arc<dyn Scheduler>,
    events: EventDispatcher<SocketEvent>,
}

/// Transport-side handle for reporting events to the owning socket
///
/// Holds only a weak reference: events from a transport that outlived its
/// socket, or that has been replaced, are dropped.
#[derive(Clone)]
pub struct EventBridge {
    shared: Weak<Shared>,
    generation: u64,
    binary_type: BinaryType,
}

impl EventBridge {
    pub fn opened(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_opened(self.generation);
        }
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>, was_clean: bool) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_closed(self.generation, code, reason.into(), was_clean);
        }
    }

    pub fn message(&self, data: MessageData) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_message(self.generation, data);
        }
    }

    /// Deliver a binary payload framed per the configured binary type
    pub fn binary(&self, bytes: Vec<u8>) {
        self.message(MessageData::binary(bytes, self.binary_type));
    }

    pub fn error(&self, message: impl Into<String>) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_error(self.generation, message.into());
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SocketState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn backoff(&self, attempt: u32) -> Duration {
        (self.options.backoff)(attempt)
    }

    /// Create a transport for the stored url/protocol
    fn establish(self: &Arc<Self>) -> Result<(), SocketError> {
        let (url, protocol, generation, notifier) = {
            let mut state = self.lock();
            let url = state.url.clone().ok_or(SocketError::NotOpen)?;
            state.generation += 1;
            (url, state.protocol.clone(), state.generation, Arc::clone(&state.notifier))
        };

        let bridge = EventBridge {
            shared: Arc::downgrade(self),
            generation,
            binary_type: self.options.binary_type,
        };
        notifier.notify_reachability(ServerReachability::RequestMade);
        let mut transport =
            self.factory
                .connect(&url, protocol.as_deref(), self.options.binary_type, bridge)?;

        let mut state = self.lock();
        if state.generation != generation || state.url.is_none() {
            // Closed while the factory was connecting
            drop(state);
            transport.close();
            return Ok(());
        }
        state.transport = Some(transport);
        Ok(())
    }

    fn handle_opened(&self, generation: u64) {
        let (url, notifier) = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.reconnect_attempt = 0;
            state.next_reconnect_delay = self.backoff(0);
            (state.url.clone().unwrap_or_default(), Arc::clone(&state.notifier))
        };

        notifier.notify_reachability(ServerReachability::RequestSucceeded);
        get_debug_logger().socket_opened(&url);
        self.events.dispatch(&SocketEvent::Opened);
    }

    fn handle_closed(self: &Arc<Self>, generation: u64, code: u16, reason: String, was_clean: bool) {
        let (expected, url, transport, reconnect, notifier) = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            // One close per transport
            state.generation += 1;
            let transport = state.transport.take();
            let expected = std::mem::take(&mut state.close_expected);
            let url = state.url.clone().unwrap_or_default();
            if expected {
                state.url = None;
                state.protocol = None;
            }
            let reconnect = !expected && self.options.auto_reconnect && state.url.is_some();
            (expected, url, transport, reconnect, Arc::clone(&state.notifier))
        };
        drop(transport);

        get_debug_logger().socket_closed(&url, code, was_clean, expected);
        if !expected {
            notifier.notify_reachability(ServerReachability::RequestFailed);
        }
        self.events.dispatch(&SocketEvent::Closed {
            code,
            reason,
            was_clean,
        });

        if reconnect {
            self.schedule_reconnect();
        }
    }

    fn handle_message(&self, generation: u64, data: MessageData) {
        let notifier = {
            let state = self.lock();
            if state.generation != generation {
                return;
            }
            Arc::clone(&state.notifier)
        };
        notifier.notify_reachability(ServerReachability::BackChannelActivity);
        self.events.dispatch(&SocketEvent::Message(data));
    }

    fn handle_error(&self, generation: u64, message: String) {
        if !self.is_current(generation) {
            return;
        }
        get_debug_logger().error_sync("PersistentSocket", "transport_error", &message);
        self.events.dispatch(&SocketEvent::Error(message));
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let (delay, attempt, token) = {
            let mut state = self.lock();
            let delay = state.next_reconnect_delay;
            state.reconnect_attempt = state.reconnect_attempt.saturating_add(1);
            state.next_reconnect_delay = self.backoff(state.reconnect_attempt);
            (delay, state.reconnect_attempt, state.timer_token)
        };
        get_debug_logger().socket_reconnect_scheduled(delay.as_millis() as u64, attempt);

        let weak = Arc::downgrade(self);
        let handle = self.scheduler.schedule_once(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.reconnect(token);
                }
            }),
        );

        let mut state = self.lock();
        if state.timer_token == token {
            if let Some(previous) = state.reconnect_timer.replace(handle) {
                previous.cancel();
            }
        } else {
            drop(state);
            handle.cancel();
        }
    }

    fn reconnect(self: &Arc<Self>, token: u64) {
        {
            let mut state = self.lock();
            if state.timer_token != token || state.transport.is_some() || state.url.is_none() {
                return;
            }
            state.reconnect_timer = None;
        }

        if let Err(e) = self.establish() {
            self.events.dispatch(&SocketEvent::Error(e.to_string()));
            self.schedule_reconnect();
        }
    }
}

/// Reconnecting full-duplex channel over a platform transport
///
/// Listeners run synchronously on whichever thread delivered the transport
/// event, with no internal lock held.
pub struct PersistentSocket {
    shared: Arc<Shared>,
}

impl PersistentSocket {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        scheduler: Arc<dyn Scheduler>,
        options: SocketOptions,
    ) -> Self {
        let next_reconnect_delay = (options.backoff)(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SocketState {
                    transport: None,
                    url: None,
                    protocol: None,
                    reconnect_attempt: 0,
                    next_reconnect_delay,
                    close_expected: false,
                    reconnect_timer: None,
                    generation: 0,
                    timer_token: 0,
                    notifier: Arc::new(NullNotifier),
                }),
                options,
                factory,
                scheduler,
                events: EventDispatcher::new("PersistentSocket"),
            }),
        }
    }

    /// Configure the sink for reachability events
    pub fn with_notifier(self, notifier: Arc<dyn ReachabilityNotifier>) -> Self {
        self.shared.lock().notifier = notifier;
        self
    }

    /// Start connecting to `url`
    ///
    /// # Errors
    /// * `SocketError::AlreadyOpen` - A transport is live or connecting
    /// * `SocketError::Transport` - The factory could not create a transport
    pub fn open(&self, url: &str, protocol: Option<&str>) -> Result<(), SocketError> {
        {
            let mut state = self.shared.lock();
            if state.transport.is_some() {
                return Err(SocketError::AlreadyOpen);
            }
            if let Some(timer) = state.reconnect_timer.take() {
                timer.cancel();
            }
            state.timer_token += 1;
            state.url = Some(url.to_string());
            state.protocol = protocol.map(str::to_string);
            state.close_expected = false;
        }
        self.shared.establish()
    }

    /// Hand `message` to the transport; nothing is buffered here
    pub fn send(&self, message: MessageData) -> Result<(), SocketError> {
        let mut state = self.shared.lock();
        match state.transport.as_mut() {
            Some(transport) if transport.ready_state() == ReadyState::Open => {
                transport.send(message).map_err(SocketError::from)
            }
            _ => Err(SocketError::NotOpen),
        }
    }

    /// Deliberately close; cancels any pending reconnect
    pub fn close(&self) {
        let transport = {
            let mut state = self.shared.lock();
            if let Some(timer) = state.reconnect_timer.take() {
                timer.cancel();
            }
            state.timer_token += 1;
            let transport = state.transport.take();
            if transport.is_some() {
                state.close_expected = true;
            } else {
                state.url = None;
                state.protocol = None;
            }
            transport
        };

        if let Some(mut transport) = transport {
            transport.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared
            .lock()
            .transport
            .as_ref()
            .map_or(false, |t| t.ready_state() == ReadyState::Open)
    }

    pub fn ready_state(&self) -> ReadyState {
        self.shared
            .lock()
            .transport
            .as_ref()
            .map_or(ReadyState::Closed, |t| t.ready_state())
    }

    pub fn buffered_amount(&self) -> usize {
        self.shared
            .lock()
            .transport
            .as_ref()
            .map_or(0, |t| t.buffered_amount())
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.lock().reconnect_attempt
    }

    pub fn next_reconnect_delay(&self) -> Duration {
        self.shared.lock().next_reconnect_delay
    }

    /// Whether a reconnect timer is armed
    pub fn reconnect_pending(&self) -> bool {
        self.shared.lock().reconnect_timer.is_some()
    }

    pub fn on(
        &self,
        kind: SocketEventKind,
        handler: impl Fn(&SocketEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.shared.events.on(kind, handler)
    }

    pub fn on_any(&self, handler: impl Fn(&SocketEvent) + Send + Sync + 'static) -> ListenerId {
        self.shared.events.on_any(handler)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }
}

impl Drop for PersistentSocket {
    fn drop(&mut self) {
        self.close();
    }
}
