use bchannel::core::channel::events::{contain, Event, EventDispatcher};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
enum Ping {
    Short(u8),
    Long(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PingKind {
    Short,
    Long,
}

impl Event for Ping {
    type Kind = PingKind;

    fn kind(&self) -> PingKind {
        match self {
            Ping::Short(_) => PingKind::Short,
            Ping::Long(_) => PingKind::Long,
        }
    }
}

#[test]
fn test_dispatch_filters_by_kind() {
    let dispatcher = EventDispatcher::<Ping>::new("test");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    dispatcher.on(PingKind::Short, move |e| sink.lock().unwrap().push(e.clone()));
    let sink = seen.clone();
    dispatcher.on_any(move |e| sink.lock().unwrap().push(e.clone()));

    assert_eq!(dispatcher.dispatch(&Ping::Short(1)), 2);
    assert_eq!(dispatcher.dispatch(&Ping::Long("x".into())), 1);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Ping::Short(1), Ping::Short(1), Ping::Long("x".into())]
    );
}

#[test]
fn test_panicking_handler_does_not_stop_others() {
    let dispatcher = EventDispatcher::<Ping>::new("test");
    let count = Arc::new(Mutex::new(0));

    dispatcher.on_any(|_| panic!("boom"));
    let counter = count.clone();
    dispatcher.on_any(move |_| *counter.lock().unwrap() += 1);

    assert_eq!(dispatcher.dispatch(&Ping::Short(0)), 1);
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_off_unregisters() {
    let dispatcher = EventDispatcher::<Ping>::new("test");
    let id = dispatcher.on(PingKind::Long, |_| {});
    assert_eq!(dispatcher.listener_count(), 1);

    assert!(dispatcher.off(id));
    assert!(!dispatcher.off(id));
    assert_eq!(dispatcher.dispatch(&Ping::Long(String::new())), 0);
}

#[test]
fn test_handler_may_register_during_dispatch() {
    let dispatcher = Arc::new(EventDispatcher::<Ping>::new("test"));
    let inner = dispatcher.clone();
    dispatcher.on(PingKind::Short, move |_| {
        inner.on(PingKind::Long, |_| {});
    });

    dispatcher.dispatch(&Ping::Short(1));
    assert_eq!(dispatcher.listener_count(), 2);
}

#[test]
fn test_contain() {
    assert_eq!(contain("test", "ok", || 5), Some(5));
    assert_eq!(contain("test", "boom", || -> i32 { panic!("nope") }), None);
}
