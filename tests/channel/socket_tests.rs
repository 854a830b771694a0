use crate::common::*;
use bchannel::core::channel::socket::{
    BinaryType, ExponentialBackoff, MessageData, PersistentSocket, ReadyState, SocketError,
    SocketEvent, SocketEventKind, SocketOptions,
};
use bchannel::core::channel::{ServerReachability, StatsRecorder};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const URL: &str = "wss://chat.example.com/socket";

struct SocketHarness {
    factory: Arc<MockTransportFactory>,
    scheduler: Arc<ManualScheduler>,
    stats: Arc<StatsRecorder>,
    events: Arc<Mutex<Vec<SocketEvent>>>,
    socket: PersistentSocket,
}

impl SocketHarness {
    fn new(options: SocketOptions) -> Self {
        let factory = MockTransportFactory::new();
        let scheduler = ManualScheduler::new();
        let stats = Arc::new(StatsRecorder::new());
        let socket = PersistentSocket::new(factory.clone(), scheduler.clone(), options)
            .with_notifier(stats.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        socket.on_any(move |event| sink.lock().unwrap().push(event.clone()));

        Self {
            factory,
            scheduler,
            stats,
            events,
            socket,
        }
    }

    fn standard() -> Self {
        Self::new(SocketOptions::default())
    }

    fn events(&self) -> Vec<SocketEvent> {
        self.events.lock().unwrap().clone()
    }

    fn closed_events(&self) -> Vec<SocketEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, SocketEvent::Closed { .. }))
            .collect()
    }
}

#[test]
fn test_open_creates_transport_and_reports_opened() {
    let harness = SocketHarness::standard();

    harness.socket.open(URL, Some("chat-v1")).unwrap();
    let conn = harness.factory.latest();
    assert_eq!(conn.url, URL);
    assert_eq!(conn.protocol.as_deref(), Some("chat-v1"));
    assert_eq!(conn.binary_type, BinaryType::Blob);
    assert_eq!(harness.socket.ready_state(), ReadyState::Connecting);
    assert!(!harness.socket.is_open());

    conn.open();

    assert!(harness.socket.is_open());
    assert_eq!(harness.events(), vec![SocketEvent::Opened]);
    assert_eq!(harness.stats.reachability_count(ServerReachability::RequestMade), 1);
    assert_eq!(
        harness.stats.reachability_count(ServerReachability::RequestSucceeded),
        1
    );
}

#[test]
fn test_second_open_is_rejected() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    harness.factory.latest().open();

    let result = harness.socket.open("wss://other.example.com/socket", None);

    assert!(matches!(result, Err(SocketError::AlreadyOpen)));
    assert_eq!(harness.factory.connect_count(), 1);
    assert!(harness.socket.is_open());
}

#[test]
fn test_open_while_connecting_is_rejected() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();

    assert!(matches!(harness.socket.open(URL, None), Err(SocketError::AlreadyOpen)));
    assert_eq!(harness.factory.connect_count(), 1);
}

#[test]
fn test_send_requires_open_socket() {
    let harness = SocketHarness::standard();
    assert!(matches!(
        harness.socket.send(MessageData::Text("hi".into())),
        Err(SocketError::NotOpen)
    ));

    harness.socket.open(URL, None).unwrap();
    // Still connecting
    assert!(matches!(
        harness.socket.send(MessageData::Text("hi".into())),
        Err(SocketError::NotOpen)
    ));

    let conn = harness.factory.latest();
    conn.open();
    harness.socket.send(MessageData::Text("hello".into())).unwrap();
    harness.socket.send(MessageData::ArrayBuffer(vec![1, 2, 3])).unwrap();

    assert_eq!(
        conn.sent(),
        vec![
            MessageData::Text("hello".into()),
            MessageData::ArrayBuffer(vec![1, 2, 3])
        ]
    );
    assert_eq!(harness.socket.buffered_amount(), 8);
}

#[test]
fn test_open_failure_is_reported_to_caller() {
    let harness = SocketHarness::standard();
    harness.factory.fail_next(1);

    let result = harness.socket.open(URL, None);

    assert!(matches!(result, Err(SocketError::Transport(_))));
    assert_eq!(harness.scheduler.delays(), Vec::<Duration>::new());
}

#[test]
fn test_consecutive_unexpected_closes_back_off_exponentially() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    harness.factory.latest().open();

    for n in 1..=8u32 {
        harness.factory.latest().drop_connection(1006);

        let delays = harness.scheduler.delays();
        let expected = (2u64.pow(n - 1) * 1_000).min(60_000);
        assert_eq!(delays[(n - 1) as usize], Duration::from_millis(expected), "close #{}", n);
        assert_eq!(harness.socket.reconnect_attempt(), n);

        assert!(harness.scheduler.fire_next());
        assert_eq!(harness.factory.connect_count(), n as usize + 1);
    }

    let closed = harness.closed_events();
    assert_eq!(closed.len(), 8);
    assert!(closed.iter().all(|e| matches!(
        e,
        SocketEvent::Closed {
            code: 1006,
            was_clean: false,
            ..
        }
    )));
    assert_eq!(harness.stats.reachability_count(ServerReachability::RequestFailed), 8);
}

#[test]
fn test_successful_reconnect_resets_backoff() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    harness.factory.latest().open();

    harness.factory.latest().drop_connection(1006);
    harness.scheduler.fire_next();
    harness.factory.latest().drop_connection(1006);
    assert_eq!(harness.socket.next_reconnect_delay(), Duration::from_millis(4_000));

    harness.scheduler.fire_next();
    let conn = harness.factory.latest();
    assert_eq!(conn.url, URL);
    conn.open();

    assert_eq!(harness.socket.reconnect_attempt(), 0);
    assert_eq!(harness.socket.next_reconnect_delay(), Duration::from_millis(1_000));
}

#[test]
fn test_close_cancels_pending_reconnect() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    harness.factory.latest().open();
    harness.factory.latest().drop_connection(1006);
    assert!(harness.socket.reconnect_pending());

    harness.socket.close();

    assert!(!harness.socket.reconnect_pending());
    assert_eq!(harness.scheduler.cancelled(), 1);
    assert!(!harness.scheduler.fire_next());
    assert_eq!(harness.factory.connect_count(), 1);
}

#[test]
fn test_timer_racing_close_does_not_reopen() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    harness.factory.latest().drop_connection(1006);

    harness.socket.close();
    // The timer fires anyway, as it could on another thread
    assert!(harness.scheduler.fire_even_if_cancelled());

    assert_eq!(harness.factory.connect_count(), 1);
    assert_eq!(harness.socket.ready_state(), ReadyState::Closed);
}

#[test]
fn test_deliberate_close_is_terminal() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    let conn = harness.factory.latest();
    conn.open();

    harness.socket.close();
    assert_eq!(conn.close_calls(), 1);
    assert!(!harness.socket.is_open());
    conn.finish_close();

    assert_eq!(
        harness.closed_events(),
        vec![SocketEvent::Closed {
            code: 1000,
            reason: String::new(),
            was_clean: true
        }]
    );
    assert!(harness.scheduler.delays().is_empty());
    assert_eq!(harness.stats.reachability_count(ServerReachability::RequestFailed), 0);

    // Stored url is cleared, so a new open is required and allowed
    harness.socket.open(URL, None).unwrap();
    assert_eq!(harness.factory.connect_count(), 2);
}

#[test]
fn test_disabled_auto_reconnect_makes_close_terminal() {
    let harness = SocketHarness::new(SocketOptions {
        auto_reconnect: false,
        ..SocketOptions::default()
    });
    harness.socket.open(URL, None).unwrap();
    harness.factory.latest().open();

    harness.factory.latest().drop_connection(1006);

    assert!(matches!(
        harness.closed_events().as_slice(),
        [SocketEvent::Closed { was_clean: false, .. }]
    ));
    assert!(harness.scheduler.delays().is_empty());
    assert_eq!(harness.socket.ready_state(), ReadyState::Closed);
}

#[test]
fn test_custom_backoff_function() {
    let harness = SocketHarness::new(SocketOptions {
        backoff: Arc::new(|attempt| Duration::from_millis(100 + u64::from(attempt))),
        ..SocketOptions::default()
    });
    harness.socket.open(URL, None).unwrap();

    harness.factory.latest().drop_connection(1006);
    harness.scheduler.fire_next();
    harness.factory.latest().drop_connection(1006);

    assert_eq!(
        harness.scheduler.delays(),
        vec![Duration::from_millis(100), Duration::from_millis(101)]
    );
}

#[test]
fn test_configured_exponential_backoff() {
    let harness = SocketHarness::new(SocketOptions {
        backoff: ExponentialBackoff::new(500, 1_500).into_fn(),
        ..SocketOptions::default()
    });
    harness.socket.open(URL, None).unwrap();

    for _ in 0..3 {
        harness.factory.latest().drop_connection(1006);
        harness.scheduler.fire_next();
    }

    assert_eq!(
        harness.scheduler.delays(),
        vec![
            Duration::from_millis(500),
            Duration::from_millis(1_000),
            Duration::from_millis(1_500)
        ]
    );
}

#[test]
fn test_failed_reconnect_emits_error_and_retries() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    harness.factory.latest().drop_connection(1006);

    harness.factory.fail_next(1);
    harness.scheduler.fire_next();

    assert!(harness
        .events()
        .iter()
        .any(|e| matches!(e, SocketEvent::Error(msg) if msg.contains("refused"))));
    assert_eq!(
        harness.scheduler.delays(),
        vec![Duration::from_millis(1_000), Duration::from_millis(2_000)]
    );

    harness.scheduler.fire_next();
    assert_eq!(harness.factory.connect_count(), 2);
}

#[test]
fn test_messages_pass_through_unchanged() {
    let harness = SocketHarness::new(SocketOptions {
        binary_type: BinaryType::ArrayBuffer,
        ..SocketOptions::default()
    });
    harness.socket.open(URL, None).unwrap();
    let conn = harness.factory.latest();
    assert_eq!(conn.binary_type, BinaryType::ArrayBuffer);
    conn.open();

    conn.bridge.message(MessageData::Text("{\"a\":1}".into()));
    conn.bridge.binary(vec![0xde, 0xad]);

    assert_eq!(
        harness.events(),
        vec![
            SocketEvent::Opened,
            SocketEvent::Message(MessageData::Text("{\"a\":1}".into())),
            SocketEvent::Message(MessageData::ArrayBuffer(vec![0xde, 0xad])),
        ]
    );
    assert_eq!(
        harness
            .stats
            .reachability_count(ServerReachability::BackChannelActivity),
        2
    );
}

#[test]
fn test_blob_framing_by_default() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    let conn = harness.factory.latest();
    conn.open();

    conn.bridge.binary(vec![7]);

    assert_eq!(
        harness.events().last(),
        Some(&SocketEvent::Message(MessageData::Blob(vec![7])))
    );
}

#[test]
fn test_error_event_does_not_reconnect() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    let conn = harness.factory.latest();
    conn.open();

    conn.bridge.error("frame too large");

    assert_eq!(
        harness.events().last(),
        Some(&SocketEvent::Error("frame too large".into()))
    );
    assert!(harness.scheduler.delays().is_empty());
    assert!(harness.socket.is_open());
}

#[test]
fn test_events_from_replaced_transport_are_ignored() {
    let harness = SocketHarness::standard();
    harness.socket.open(URL, None).unwrap();
    let stale = harness.factory.latest();
    stale.open();
    stale.drop_connection(1006);
    harness.scheduler.fire_next();
    let before = harness.events().len();

    stale.bridge.message(MessageData::Text("late".into()));
    stale.bridge.closed(1006, "late", false);
    stale.bridge.opened();

    assert_eq!(harness.events().len(), before);
    assert_eq!(harness.scheduler.delays().len(), 1);
}

#[test]
fn test_listener_panic_is_contained() {
    let harness = SocketHarness::standard();
    let opened = Arc::new(Mutex::new(0));
    harness
        .socket
        .on(SocketEventKind::Opened, |_| panic!("listener exploded"));
    let counter = opened.clone();
    harness
        .socket
        .on(SocketEventKind::Opened, move |_| *counter.lock().unwrap() += 1);

    harness.socket.open(URL, None).unwrap();
    harness.factory.latest().open();

    assert_eq!(*opened.lock().unwrap(), 1);
    assert!(harness.socket.is_open());
}

#[test]
fn test_off_removes_listener() {
    let harness = SocketHarness::standard();
    let count = Arc::new(Mutex::new(0));
    let counter = count.clone();
    let id = harness
        .socket
        .on(SocketEventKind::Message, move |_| *counter.lock().unwrap() += 1);

    harness.socket.open(URL, None).unwrap();
    let conn = harness.factory.latest();
    conn.open();
    conn.bridge.message(MessageData::Text("one".into()));
    assert!(harness.socket.off(id));
    conn.bridge.message(MessageData::Text("two".into()));

    assert_eq!(*count.lock().unwrap(), 1);
    assert!(!harness.socket.off(id));
}

#[test]
fn test_drop_closes_transport_and_timer() {
    let factory = MockTransportFactory::new();
    let scheduler = ManualScheduler::new();
    {
        let socket =
            PersistentSocket::new(factory.clone(), scheduler.clone(), SocketOptions::default());
        socket.open(URL, None).unwrap();
        factory.latest().open();
    }
    assert_eq!(factory.latest().close_calls(), 1);

    {
        let socket =
            PersistentSocket::new(factory.clone(), scheduler.clone(), SocketOptions::default());
        socket.open(URL, None).unwrap();
        factory.latest().drop_connection(1006);
    }
    assert_eq!(scheduler.cancelled(), 1);
    // The socket is gone, so even a timer that fires late cannot reconnect
    assert!(scheduler.fire_even_if_cancelled());
    assert_eq!(factory.connect_count(), 2);
}
