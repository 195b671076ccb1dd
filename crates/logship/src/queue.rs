// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rate-limited concurrent delivery queue.
//!
//! The queue runs as a service task owning all scheduling state; callers
//! interact through a cheap-to-clone [`DeliveryHandle`]. A pending event is
//! promoted to in-flight only when both budgets allow it:
//!
//! 1. fewer than `concurrency` deliveries are in flight, and
//! 2. fewer than `max_per_window` deliveries have started in the current
//!    rate window.
//!
//! The window is a fixed bucket: the start counter resets every `window`,
//! so across an interval straddling a bucket boundary at most twice the
//! configured rate can start. Concurrency budget is released when a delivery
//! reaches terminal state; rate budget is released only by the bucket
//! rollover, which is what makes this a start-rate limit rather than a
//! completion-rate limit.
//!
//! Promotion is FIFO: the longest-waiting pending event starts first.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::{OverflowPolicy, ShipperConfig};
use crate::error::{EnqueueError, RetryExhausted};
use crate::event::LogEvent;
use crate::retry::{send_with_retry, RetryStrategy};
use crate::transport::Transport;

/// Callback invoked when an event exhausts its retry budget.
pub type FailureHook = Arc<dyn Fn(&LogEvent, &RetryExhausted) + Send + Sync>;

enum DeliveryCommand {
    Enqueue(Box<LogEvent>),
    Drain(oneshot::Sender<()>),
    Shutdown,
}

/// Terminal-disposition counters shared by the service and every handle.
#[derive(Debug, Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of the queue's terminal dispositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryStats {
    /// Events acknowledged by the collector.
    pub delivered: u64,
    /// Events dropped after exhausting their retry budget.
    pub failed: u64,
    /// Events discarded by the overflow policy before ever starting.
    pub dropped: u64,
}

#[derive(Clone)]
pub struct DeliveryHandle {
    tx: mpsc::UnboundedSender<DeliveryCommand>,
    counters: Arc<DeliveryCounters>,
}

impl DeliveryHandle {
    /// Admit an event. Returns immediately; delivery failures are terminal
    /// inside the queue and only observable through the failure hook and
    /// [`DeliveryStats`].
    pub fn enqueue(&self, event: LogEvent) -> Result<(), EnqueueError> {
        self.tx
            .send(DeliveryCommand::Enqueue(Box::new(event)))
            .map_err(|_| EnqueueError::Closed)
    }

    /// Wait until every outstanding event has reached terminal state.
    /// Events enqueued while draining are covered by the same wait.
    pub async fn drain(&self) -> Result<(), EnqueueError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(DeliveryCommand::Drain(response_tx))
            .map_err(|_| EnqueueError::Closed)?;
        response_rx.await.map_err(|_| EnqueueError::Closed)
    }

    /// Stop admitting new events; deliveries already accepted still run to
    /// terminal state before the service exits.
    pub fn shutdown(&self) -> Result<(), EnqueueError> {
        self.tx
            .send(DeliveryCommand::Shutdown)
            .map_err(|_| EnqueueError::Closed)
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct DeliveryService {
    transport: Arc<dyn Transport>,
    retry_strategy: RetryStrategy,
    max_retries: u32,
    concurrency: usize,
    max_per_window: u32,
    window: std::time::Duration,
    pending_bound: Option<usize>,
    overflow_policy: OverflowPolicy,
    failure_hook: Option<FailureHook>,
    counters: Arc<DeliveryCounters>,
    rx: mpsc::UnboundedReceiver<DeliveryCommand>,
    pending: VecDeque<Box<LogEvent>>,
    in_flight: usize,
    started_in_window: u32,
    drain_waiters: Vec<oneshot::Sender<()>>,
}

impl DeliveryService {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &ShipperConfig,
        failure_hook: Option<FailureHook>,
    ) -> (Self, DeliveryHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(DeliveryCounters::default());

        let service = DeliveryService {
            transport,
            retry_strategy: config.retry_strategy.clone(),
            max_retries: config.max_retries,
            concurrency: config.concurrency,
            max_per_window: config.max_per_window,
            window: config.window,
            pending_bound: config.pending_bound,
            overflow_policy: config.overflow_policy,
            failure_hook,
            counters: Arc::clone(&counters),
            rx,
            pending: VecDeque::new(),
            in_flight: 0,
            started_in_window: 0,
            drain_waiters: Vec::new(),
        };

        let handle = DeliveryHandle { tx, counters };

        (service, handle)
    }

    pub async fn run(mut self) {
        debug!("delivery queue started");

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        let mut window_timer = tokio::time::interval(self.window);
        window_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        window_timer.tick().await; // discard the immediate tick, opening the first window
        let mut open = true;

        loop {
            self.admit(&done_tx);
            if self.is_quiescent() {
                for waiter in self.drain_waiters.drain(..) {
                    let _ = waiter.send(());
                }
                if !open {
                    break;
                }
            }

            tokio::select! {
                _ = window_timer.tick() => {
                    self.started_in_window = 0;
                }
                Some(()) = done_rx.recv() => {
                    self.in_flight -= 1;
                }
                command = self.rx.recv(), if open => {
                    match command {
                        Some(DeliveryCommand::Enqueue(event)) => self.accept(event),
                        Some(DeliveryCommand::Drain(response_tx)) => {
                            self.drain_waiters.push(response_tx);
                        }
                        Some(DeliveryCommand::Shutdown) | None => open = false,
                    }
                }
            }
        }

        self.discard_raced_commands();
        debug!("delivery queue stopped");
    }

    /// Once the queue stops accepting, commands still sitting in the channel
    /// would vanish with the receiver. Every raced-in enqueue counts as a
    /// drop and every raced-in drain resolves, so no caller hangs and no
    /// event disappears unobserved.
    fn discard_raced_commands(&mut self) {
        self.rx.close();
        let mut discarded = 0u64;
        while let Ok(command) = self.rx.try_recv() {
            match command {
                DeliveryCommand::Enqueue(_) => discarded += 1,
                DeliveryCommand::Drain(response_tx) => {
                    let _ = response_tx.send(());
                }
                DeliveryCommand::Shutdown => {}
            }
        }
        if discarded > 0 {
            self.counters.dropped.fetch_add(discarded, Ordering::Relaxed);
            warn!("discarding {discarded} event(s) enqueued after shutdown");
        }
    }

    fn is_quiescent(&self) -> bool {
        self.pending.is_empty() && self.in_flight == 0
    }

    /// Promote pending events while both the concurrency and the rate
    /// budget have room. Hard caps, never advisory.
    fn admit(&mut self, done_tx: &mpsc::UnboundedSender<()>) {
        while self.in_flight < self.concurrency && self.started_in_window < self.max_per_window {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            self.in_flight += 1;
            self.started_in_window += 1;

            let transport = Arc::clone(&self.transport);
            let strategy = self.retry_strategy.clone();
            let max_retries = self.max_retries;
            let counters = Arc::clone(&self.counters);
            let hook = self.failure_hook.clone();
            let done = done_tx.clone();
            tokio::spawn(async move {
                match send_with_retry(transport.as_ref(), &event, max_retries, &strategy).await {
                    Ok(attempts) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                        debug!("event delivered after {attempts} attempt(s)");
                    }
                    Err(exhausted) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "dropping event after {} attempts: {}",
                            exhausted.attempts, exhausted.last_error
                        );
                        if let Some(hook) = &hook {
                            hook(&event, &exhausted);
                        }
                    }
                }
                let _ = done.send(());
            });
        }
    }

    fn accept(&mut self, event: Box<LogEvent>) {
        if let Some(bound) = self.pending_bound {
            if self.pending.len() >= bound {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                match self.overflow_policy {
                    OverflowPolicy::RejectNew => {
                        warn!("pending queue full ({bound}), rejecting new event");
                        return;
                    }
                    OverflowPolicy::DropOldest => {
                        warn!("pending queue full ({bound}), dropping oldest event");
                        self.pending.pop_front();
                    }
                }
            }
        }
        self.pending.push_back(event);
    }
}
