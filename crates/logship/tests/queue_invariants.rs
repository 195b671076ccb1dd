// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use logship::{
    Endpoint, FailureHook, LogEvent, OverflowPolicy, RetryStrategy, Shipper, ShipperConfig,
    Transport, TransportError,
};
use proptest::prelude::*;

/// Transport double that records how the queue schedules deliveries.
struct RecordingTransport {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    starts: Mutex<Vec<Instant>>,
    delivered_messages: Mutex<Vec<String>>,
    attempts: Mutex<HashMap<String, u32>>,
    failures_per_event: u32,
    delay: Duration,
}

impl RecordingTransport {
    fn new(failures_per_event: u32, delay: Duration) -> Arc<Self> {
        Arc::new(RecordingTransport {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            starts: Mutex::new(Vec::new()),
            delivered_messages: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            failures_per_event,
            delay,
        })
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn attempts_for(&self, message: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(message)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, event: &LogEvent) -> Result<(), TransportError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(event.message.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt == 1 {
            self.starts.lock().unwrap().push(Instant::now());
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if attempt <= self.failures_per_event {
            Err(TransportError::Status(500))
        } else {
            self.delivered_messages
                .lock()
                .unwrap()
                .push(event.message.clone());
            Ok(())
        }
    }
}

fn base_config() -> ShipperConfig {
    let mut config = ShipperConfig::new(Endpoint::Http {
        url: "http://localhost:1".to_string(),
    });
    config.retry_strategy = RetryStrategy::Immediate;
    config.mute_console = true;
    config
}

fn shipper_with(
    config: ShipperConfig,
    transport: &Arc<RecordingTransport>,
    hook: Option<FailureHook>,
) -> Shipper {
    Shipper::with_transport(config, Arc::clone(transport) as _, hook)
        .expect("failed to create shipper")
}

#[tokio::test]
async fn in_flight_never_exceeds_concurrency() {
    let transport = RecordingTransport::new(0, Duration::from_millis(10));
    let mut config = base_config();
    config.concurrency = 2;
    config.max_per_window = 1_000;
    let shipper = shipper_with(config, &transport, None);

    for i in 0..20 {
        shipper.info(format!("event {i}"), None);
    }
    shipper.drain().await;

    assert_eq!(shipper.stats().delivered, 20);
    assert!(
        transport.max_in_flight() <= 2,
        "observed {} concurrent sends",
        transport.max_in_flight()
    );
}

#[tokio::test]
async fn task_starts_respect_the_rate_window() {
    let window = Duration::from_millis(200);
    let transport = RecordingTransport::new(0, Duration::ZERO);
    let mut config = base_config();
    config.concurrency = 50;
    config.max_per_window = 5;
    config.window = window;
    let shipper = shipper_with(config, &transport, None);

    let begun = Instant::now();
    for i in 0..15 {
        shipper.info(format!("event {i}"), None);
    }
    shipper.drain().await;
    let elapsed = begun.elapsed();

    // 15 starts at 5 per bucket needs at least two bucket rollovers.
    assert!(
        elapsed >= Duration::from_millis(300),
        "drained too fast for the rate limit: {elapsed:?}"
    );

    let starts = transport.starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 15);
    // Fixed buckets admit at most 2R starts in any sliding window of W.
    for (i, &start) in starts.iter().enumerate() {
        let within = starts[i..]
            .iter()
            .take_while(|s| s.duration_since(start) < window)
            .count();
        assert!(within <= 10, "{within} starts within a single window");
    }
}

#[tokio::test]
async fn admission_is_fifo_when_serialized() {
    let transport = RecordingTransport::new(0, Duration::from_millis(5));
    let mut config = base_config();
    config.concurrency = 1;
    config.max_per_window = 1_000;
    let shipper = shipper_with(config, &transport, None);

    for i in 0..8 {
        shipper.info(format!("{i:02}"), None);
    }
    shipper.drain().await;

    let messages = transport.delivered_messages.lock().unwrap().clone();
    let expected: Vec<String> = (0..8).map(|i| format!("{i:02}")).collect();
    assert_eq!(messages, expected);
}

#[tokio::test]
async fn always_failing_event_consumes_exactly_the_budget() {
    let transport = RecordingTransport::new(u32::MAX, Duration::ZERO);
    let mut config = base_config();
    config.max_retries = 5;

    let failures: Arc<Mutex<Vec<(String, u32)>>> = Arc::default();
    let hook_failures = Arc::clone(&failures);
    let hook: FailureHook = Arc::new(move |event, exhausted| {
        hook_failures
            .lock()
            .unwrap()
            .push((event.message.clone(), exhausted.attempts));
    });
    let shipper = shipper_with(config, &transport, Some(hook));

    shipper.error("doomed", None);
    shipper.drain().await;

    assert_eq!(shipper.stats().failed, 1);
    assert_eq!(shipper.stats().delivered, 0);
    // max_retries counts retries after the first attempt.
    assert_eq!(transport.attempts_for("doomed"), 6);
    let failures = failures.lock().unwrap();
    assert_eq!(failures.as_slice(), [("doomed".to_string(), 6)]);
}

#[tokio::test]
async fn success_on_attempt_k_stops_retrying() {
    let transport = RecordingTransport::new(2, Duration::ZERO);
    let mut config = base_config();
    config.max_retries = 3;
    let shipper = shipper_with(config, &transport, None);

    shipper.info("eventually fine", None);
    shipper.drain().await;

    assert_eq!(shipper.stats().delivered, 1);
    assert_eq!(transport.attempts_for("eventually fine"), 3);
}

#[tokio::test]
async fn drain_waits_for_every_outstanding_event() {
    let transport = RecordingTransport::new(0, Duration::from_millis(20));
    let mut config = base_config();
    config.concurrency = 4;
    config.max_per_window = 1_000;
    let shipper = shipper_with(config, &transport, None);

    for i in 0..10 {
        shipper.info(format!("event {i}"), None);
    }
    shipper.drain().await;

    // Every event reached terminal state before drain returned.
    assert_eq!(shipper.stats().delivered, 10);
    assert_eq!(transport.delivered_messages.lock().unwrap().len(), 10);
}

#[tokio::test]
async fn events_enqueued_mid_drain_are_delivered() {
    let transport = RecordingTransport::new(0, Duration::from_millis(50));
    let mut config = base_config();
    config.concurrency = 4;
    config.max_per_window = 1_000;
    let shipper = shipper_with(config, &transport, None);

    shipper.info("first", None);
    let draining = shipper.clone();
    let drain_task = tokio::spawn(async move { draining.drain().await });

    // Land a second event while the first is still in flight and the drain
    // is already waiting on quiescence.
    tokio::time::sleep(Duration::from_millis(10)).await;
    shipper.info("late arrival", None);
    drain_task.await.expect("drain task failed");

    assert_eq!(shipper.stats().delivered, 2);
    let messages = transport.delivered_messages.lock().unwrap().clone();
    assert!(messages.contains(&"late arrival".to_string()));
}

#[tokio::test]
async fn overflow_reject_new_discards_incoming_events() {
    let transport = RecordingTransport::new(0, Duration::from_millis(200));
    let mut config = base_config();
    config.concurrency = 1;
    config.max_per_window = 1_000;
    config.pending_bound = Some(2);
    config.overflow_policy = OverflowPolicy::RejectNew;
    let shipper = shipper_with(config, &transport, None);

    for i in 0..5 {
        shipper.info(format!("event {i}"), None);
    }
    shipper.drain().await;

    assert_eq!(shipper.stats().delivered, 3);
    assert_eq!(shipper.stats().dropped, 2);
    let messages = transport.delivered_messages.lock().unwrap().clone();
    assert_eq!(messages, ["event 0", "event 1", "event 2"]);
}

#[tokio::test]
async fn overflow_drop_oldest_keeps_the_newest_events() {
    let transport = RecordingTransport::new(0, Duration::from_millis(200));
    let mut config = base_config();
    config.concurrency = 1;
    config.max_per_window = 1_000;
    config.pending_bound = Some(2);
    config.overflow_policy = OverflowPolicy::DropOldest;
    let shipper = shipper_with(config, &transport, None);

    for i in 0..5 {
        shipper.info(format!("event {i}"), None);
    }
    shipper.drain().await;

    assert_eq!(shipper.stats().delivered, 3);
    assert_eq!(shipper.stats().dropped, 2);
    let messages = transport.delivered_messages.lock().unwrap().clone();
    assert_eq!(messages, ["event 0", "event 3", "event 4"]);
}

/// Flaky collector under load: two in-flight slots, five starts per bucket,
/// and a transport that fails twice per event before succeeding.
#[tokio::test]
async fn flaky_transport_scenario_end_to_end() {
    let window = Duration::from_millis(200);
    let transport = RecordingTransport::new(2, Duration::from_millis(1));
    let mut config = base_config();
    config.concurrency = 2;
    config.max_per_window = 5;
    config.window = window;
    config.max_retries = 3;
    config.retry_strategy = RetryStrategy::FixedDelay(Duration::from_millis(1));
    let shipper = shipper_with(config, &transport, None);

    let begun = Instant::now();
    for i in 0..10 {
        shipper.info(format!("event {i}"), None);
    }
    shipper.drain().await;
    let elapsed = begun.elapsed();

    assert_eq!(shipper.stats().delivered, 10);
    assert_eq!(shipper.stats().failed, 0);
    assert!(transport.max_in_flight() <= 2);
    // 10 starts at 5 per bucket forces at least one full window of waiting.
    assert!(elapsed >= window, "finished before the rate limit allows");
    for i in 0..10 {
        assert_eq!(transport.attempts_for(&format!("event {i}")), 3);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn concurrency_cap_holds_for_random_workloads(
        concurrency in 1usize..6,
        events in 1usize..40,
        failures_per_event in 0u32..3,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let max = rt.block_on(async move {
            let transport = RecordingTransport::new(failures_per_event, Duration::from_millis(1));
            let mut config = base_config();
            config.concurrency = concurrency;
            config.max_per_window = 1_000;
            config.max_retries = 5;
            let shipper = shipper_with(config, &transport, None);

            for i in 0..events {
                shipper.info(format!("event {i}"), None);
            }
            shipper.drain().await;

            assert_eq!(shipper.stats().delivered, events as u64);
            transport.max_in_flight()
        });
        prop_assert!(max <= concurrency);
    }
}
