//! Reachability and negotiation statistics

use crate::core::channel::timing::{Clock, SystemClock};
use crate::core::channel::types::{ChannelStat, ServerReachability};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Sink for discrete network events
///
/// Shared by every channel instance in the process, so implementations must
/// tolerate concurrent notifications. Counter-style semantics are expected;
/// nothing is transactional.
pub trait ReachabilityNotifier: Send + Sync {
    fn notify_reachability(&self, event: ServerReachability);

    fn notify_stat(&self, _stat: ChannelStat) {}
}

/// Notifier that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl ReachabilityNotifier for NullNotifier {
    fn notify_reachability(&self, _event: ServerReachability) {}
}

/// Individual recorded event
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Reachability(ServerReachability),
    Stat(ChannelStat),
}

/// Timestamped entry in the recorder history
#[derive(Debug, Clone)]
pub struct RecordedEntry {
    pub timestamp: u64, // Unix timestamp in milliseconds
    pub event: RecordedEvent,
}

#[derive(Default)]
struct RecorderInner {
    reachability: HashMap<ServerReachability, u64>,
    stats: HashMap<ChannelStat, u64>,
    history: VecDeque<RecordedEntry>,
}

/// In-memory notifier that counts events and keeps a bounded history
///
/// # Memory-Only Operation
///
/// Counters and history live in memory only and are lost on restart. History
/// is capped (default 100 entries); the oldest entries are evicted first.
pub struct StatsRecorder {
    inner: Mutex<RecorderInner>,
    max_history: usize,
    clock: Arc<dyn Clock>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(RecorderInner::default()),
            max_history,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Configure the clock used to timestamp history entries
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn reachability_count(&self, event: ServerReachability) -> u64 {
        self.inner
            .lock()
            .map(|inner| inner.reachability.get(&event).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn stat_count(&self, stat: ChannelStat) -> u64 {
        self.inner
            .lock()
            .map(|inner| inner.stats.get(&stat).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Recorded events, oldest first
    pub fn history(&self) -> Vec<RecordedEntry> {
        self.inner
            .lock()
            .map(|inner| inner.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of stat counters as `(stat, count)` pairs
    pub fn stat_summary(&self) -> Vec<(ChannelStat, u64)> {
        let mut summary: Vec<(ChannelStat, u64)> = self
            .inner
            .lock()
            .map(|inner| inner.stats.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default();
        summary.sort_by_key(|(stat, _)| format!("{:?}", stat));
        summary
    }

    fn record(&self, event: RecordedEvent) {
        let timestamp = self.clock.now_ms();

        // A poisoned lock only means another notifier panicked mid-update
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        match &event {
            RecordedEvent::Reachability(ev) => *inner.reachability.entry(*ev).or_insert(0) += 1,
            RecordedEvent::Stat(stat) => *inner.stats.entry(*stat).or_insert(0) += 1,
        }

        inner.history.push_back(RecordedEntry { timestamp, event });
        while inner.history.len() > self.max_history {
            inner.history.pop_front();
        }
    }
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReachabilityNotifier for StatsRecorder {
    fn notify_reachability(&self, event: ServerReachability) {
        self.record(RecordedEvent::Reachability(event));
    }

    fn notify_stat(&self, stat: ChannelStat) {
        self.record(RecordedEvent::Stat(stat));
    }
}
