// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transports deliver one event to the remote collector.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::event::LogEvent;

pub mod http;
pub mod tcp;

pub use http::HttpTransport;
pub use tcp::TcpTransport;

/// A single delivery attempt.
///
/// Implementations perform exactly one network send and apply their own I/O
/// timeout; without one the queue's retry budget would be meaningless.
/// Retries are layered on top by the delivery queue.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, event: &LogEvent) -> Result<(), TransportError>;
}
