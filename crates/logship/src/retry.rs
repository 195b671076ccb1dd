// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retry with backoff around a single-attempt transport.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::RetryExhausted;
use crate::event::LogEvent;
use crate::transport::Transport;

/// Delay policy between send attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// No delay between attempts.
    Immediate,
    /// Constant pause between attempts, the behavior of the classic
    /// logstash client.
    FixedDelay(Duration),
    /// Exponential backoff with full jitter: retry `n` sleeps a uniform
    /// random duration up to `min(base * 2^(n-1), cap)`.
    ExponentialJitter { base: Duration, cap: Duration },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::ExponentialJitter {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
        }
    }
}

impl RetryStrategy {
    /// Delay to sleep before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            RetryStrategy::Immediate => Duration::ZERO,
            RetryStrategy::FixedDelay(delay) => *delay,
            RetryStrategy::ExponentialJitter { base, cap } => {
                let ceiling = base
                    .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
                    .min(*cap);
                let max_ms = ceiling.as_millis().min(u128::from(u64::MAX)) as u64;
                if max_ms == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
            }
        }
    }
}

/// Drive one event to terminal disposition.
///
/// `max_retries` counts retries after the first attempt: the transport is
/// invoked at most `max_retries + 1` times, and at least once even when
/// `max_retries` is zero. Returns the number of attempts consumed on
/// success; on exhaustion the last transport error is carried in
/// [`RetryExhausted`] and never propagated further.
pub async fn send_with_retry(
    transport: &dyn Transport,
    event: &LogEvent,
    max_retries: u32,
    strategy: &RetryStrategy,
) -> Result<u32, RetryExhausted> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match transport.send(event).await {
            Ok(()) => return Ok(attempts),
            Err(e) => {
                if attempts > max_retries {
                    return Err(RetryExhausted {
                        attempts,
                        last_error: e,
                    });
                }
                let delay = strategy.delay(attempts);
                debug!("send attempt {attempts} failed, retrying in {delay:?}: {e}");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
