// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the shipper.
//!
//! `TransportError` covers a single failed send attempt and is retried
//! internally; `RetryExhausted` is the terminal failure surfaced to the
//! delivery queue once the retry budget is spent. Neither is ever raised
//! back to the caller that enqueued the event.

/// A single send attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("send attempt timed out")]
    Timeout,

    #[error("collector answered {0}")]
    Status(u16),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every attempt for one event failed; the event is dropped.
#[derive(Debug, thiserror::Error)]
#[error("delivery failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted {
    /// Total attempts made, including the first.
    pub attempts: u32,
    /// The error from the final attempt.
    pub last_error: TransportError,
}

/// The delivery queue could not accept an event.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("delivery queue has shut down")]
    Closed,
}

/// Invalid shipper configuration, rejected at construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unknown log level {0:?}")]
    InvalidLevel(String),

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("rate limit must allow at least one start per window")]
    ZeroRate,

    #[error("rate window must be non-zero")]
    ZeroWindow,

    #[error("pending bound must be at least 1")]
    ZeroBound,
}
