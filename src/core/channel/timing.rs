//! Clock and timer abstractions
//!
//! Channel components never read wall-clock time or arm timers directly.
//! They go through [`Clock`] and [`Scheduler`] so tests can drive them with a
//! virtual clock. The production implementations are built on tokio time,
//! which means a paused tokio runtime (`start_paused = true`) also gives a
//! fully virtual clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock abstraction for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;
}

/// Production clock anchored to the system time at construction
///
/// Elapsed time is measured with tokio's monotonic clock, so paused-time
/// tests observe virtual time here as well.
pub struct SystemClock {
    anchor_epoch_ms: u64,
    anchor: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let anchor_epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        Self {
            anchor_epoch_ms,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.anchor_epoch_ms + self.anchor.elapsed().as_millis() as u64
    }
}

/// Cancellation token for a task armed with [`Scheduler::schedule_once`]
///
/// Dropping the handle does not cancel the task.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Prevent the task from running if it has not fired yet
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// One-shot timer abstraction
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay` unless the returned handle is cancelled first
    fn schedule_once(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TimerHandle;
}

/// Scheduler backed by tokio timers
///
/// Holds a runtime handle so timers can be armed from any thread, including
/// transport callbacks running outside the runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime the caller is running in
    pub fn current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Ok(Self::new(tokio::runtime::Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TimerHandle {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}
