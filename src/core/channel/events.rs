//! Typed event dispatch and consumer containment
//!
//! Components expose a narrow `on(kind, handler)` surface backed by
//! [`EventDispatcher`]. Handlers are invoked synchronously, in registration
//! order, without any component lock held, so a handler may call back into
//! the component that emitted the event.

use crate::core::channel::debug_logger::get_debug_logger;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identifier returned by `on`, used to unregister a handler
pub type ListenerId = u64;

/// Event with a comparable kind tag
pub trait Event {
    type Kind: Copy + PartialEq + Send + Sync + std::fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E: Event> {
    id: ListenerId,
    /// `None` listens to every kind
    kind: Option<E::Kind>,
    handler: Handler<E>,
}

/// Synchronous observer registry for one component
pub struct EventDispatcher<E: Event> {
    component: &'static str,
    next_id: AtomicU64,
    listeners: Mutex<Vec<Listener<E>>>,
}

impl<E: Event> EventDispatcher<E> {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register `handler` for events of `kind`
    pub fn on(&self, kind: E::Kind, handler: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Register `handler` for every event
    pub fn on_any(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        self.register(None, Arc::new(handler))
    }

    /// Remove a handler; returns false if it was not registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to every matching handler
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn dispatch(&self, event: &E) -> usize {
        let kind = event.kind();
        // Snapshot so handlers can register/unregister while we iterate
        let handlers: Vec<Handler<E>> = self
            .lock()
            .iter()
            .filter(|listener| listener.kind.map_or(true, |k| k == kind))
            .map(|listener| Arc::clone(&listener.handler))
            .collect();

        let label = format!("{:?}", kind);
        handlers
            .iter()
            .filter(|handler| contain(self.component, &label, || handler(event)).is_some())
            .count()
    }

    fn register(&self, kind: Option<E::Kind>, handler: Handler<E>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Listener { id, kind, handler });
        id
    }

    // Handlers run outside the lock, so poisoning cannot leave the list half-updated
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener<E>>> {
        match self.listeners.lock() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Run a consumer callback inside a panic containment boundary
///
/// A panicking consumer is logged and reported as `None`; it never unwinds
/// into the component's own control flow.
pub fn contain<R>(component: &str, callback: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            get_debug_logger().consumer_panic(component, callback, &reason);
            None
        }
    }
}
