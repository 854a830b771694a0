use crate::common::*;
use bchannel::core::channel::probe::ProbeOptions;
use bchannel::core::channel::{ConnectionProbe, ServerReachability, StatsRecorder};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Paused time rounds timers up to the next millisecond
fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(10),
        "elapsed {:?}, expected {:?}",
        elapsed,
        expected
    );
}

fn image_url() -> Url {
    Url::parse("https://blocked.chat.example.com/mail/images/cleardot.gif").unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_probe_makes_n_plus_one_attempts() {
    let loader = MockImageLoader::always(LoadBehavior::Fail);
    let stats = Arc::new(StatsRecorder::new());
    let mut probe = ConnectionProbe::new(loader.clone()).with_notifier(stats.clone());

    let start = Instant::now();
    let reachable = probe
        .probe(&image_url(), Duration::from_secs(5), 3, Duration::from_secs(2))
        .await;

    assert!(!reachable);
    assert_eq!(loader.attempts(), 4);
    assert_elapsed(start, Duration::from_secs(6));
    assert_eq!(stats.reachability_count(ServerReachability::RequestMade), 4);
    assert_eq!(stats.reachability_count(ServerReachability::RequestSucceeded), 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_attempt_gets_fresh_token() {
    let loader = MockImageLoader::always(LoadBehavior::Fail);
    let mut probe = ConnectionProbe::new(loader.clone());

    probe
        .probe(&image_url(), Duration::from_secs(1), 2, Duration::from_millis(10))
        .await;

    let tokens: Vec<String> = loader
        .urls()
        .iter()
        .map(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "zx")
                .map(|(_, v)| v.into_owned())
                .expect("zx token")
        })
        .collect();
    assert_eq!(tokens.len(), 3);
    assert!(tokens.iter().all(|t| t.len() == 12));
    assert_ne!(tokens[0], tokens[1]);
    assert_ne!(tokens[1], tokens[2]);
    assert!(loader.urls().iter().all(|u| u.path() == "/mail/images/cleardot.gif"));
}

#[tokio::test(start_paused = true)]
async fn test_first_success_stops_retrying() {
    let loader = MockImageLoader::always(LoadBehavior::Succeed);
    let stats = Arc::new(StatsRecorder::new());
    let mut probe = ConnectionProbe::new(loader.clone()).with_notifier(stats.clone());

    let reachable = probe
        .probe(&image_url(), Duration::from_secs(5), 3, Duration::from_secs(2))
        .await;

    assert!(reachable);
    assert_eq!(loader.attempts(), 1);
    assert_eq!(stats.reachability_count(ServerReachability::RequestMade), 1);
    assert_eq!(stats.reachability_count(ServerReachability::RequestSucceeded), 1);
}

#[tokio::test(start_paused = true)]
async fn test_success_after_failures() {
    let loader = MockImageLoader::new(vec![LoadBehavior::Fail, LoadBehavior::Fail], LoadBehavior::Succeed);
    let mut probe = ConnectionProbe::new(loader.clone());

    let start = Instant::now();
    let reachable = probe
        .probe(&image_url(), Duration::from_secs(5), 3, Duration::from_secs(2))
        .await;

    assert!(reachable);
    assert_eq!(loader.attempts(), 3);
    assert_elapsed(start, Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_load_times_out() {
    let loader = MockImageLoader::always(LoadBehavior::Hang);
    let mut probe = ConnectionProbe::new(loader.clone());

    let start = Instant::now();
    let reachable = probe
        .probe(&image_url(), Duration::from_secs(5), 1, Duration::from_secs(2))
        .await;

    assert!(!reachable);
    assert_eq!(loader.attempts(), 2);
    // Two 5s timeouts and one pause
    assert_elapsed(start, Duration::from_secs(12));
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_is_single_attempt() {
    let loader = MockImageLoader::always(LoadBehavior::Fail);
    let mut probe = ConnectionProbe::new(loader.clone());

    let reachable = probe
        .probe_with_options(&image_url(), &ProbeOptions::single(1_000))
        .await;

    assert!(!reachable);
    assert_eq!(loader.attempts(), 1);
}

#[test]
fn test_blocked_check_defaults() {
    let options = ProbeOptions::default();
    assert_eq!(options, ProbeOptions::blocked_check());
    assert_eq!(options.timeout(), Duration::from_millis(5_000));
    assert_eq!(options.retries, 3);
    assert_eq!(options.pause(), Duration::from_millis(2_000));
}
