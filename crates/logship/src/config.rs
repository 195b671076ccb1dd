// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shipper configuration and validation.

use std::time::Duration;

use crate::error::ConfigError;
use crate::event::LogLevel;
use crate::retry::RetryStrategy;

pub const DEFAULT_CONCURRENCY: usize = 25;
pub const DEFAULT_MAX_PER_WINDOW: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Where events are shipped.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// HTTP POST with a JSON body.
    Http { url: String },
    /// Length-prefixed JSON over a raw TCP socket.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Endpoint::Http { url } if url.is_empty() => {
                Err(ConfigError::InvalidEndpoint("empty URL".to_string()))
            }
            Endpoint::Tcp { host, .. } if host.is_empty() => {
                Err(ConfigError::InvalidEndpoint("empty host".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// What to do with a new event when the pending queue is at its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the incoming event.
    #[default]
    RejectNew,
    /// Discard the oldest pending event to make room.
    DropOldest,
}

/// Configuration for a [`Shipper`](crate::Shipper).
///
/// `max_retries` counts retries after the first attempt, so an event is
/// attempted at most `max_retries + 1` times. The rate limit admits at most
/// `max_per_window` task starts per `window`.
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    pub endpoint: Endpoint,
    /// Attached to every event as `@tags`.
    pub tags: Vec<String>,
    /// Minimum severity that is shipped; events below it are only mirrored
    /// to the local console.
    pub level: LogLevel,
    pub concurrency: usize,
    pub max_per_window: u32,
    pub window: Duration,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    /// Per-attempt I/O timeout applied by the transport.
    pub send_timeout: Duration,
    /// Maximum number of pending events; unbounded when `None`.
    pub pending_bound: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    /// Suppress mirroring events through `tracing`.
    pub mute_console: bool,
}

impl ShipperConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        ShipperConfig {
            endpoint,
            tags: Vec::new(),
            level: LogLevel::Info,
            concurrency: DEFAULT_CONCURRENCY,
            max_per_window: DEFAULT_MAX_PER_WINDOW,
            window: DEFAULT_WINDOW,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_strategy: RetryStrategy::default(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            pending_bound: None,
            overflow_policy: OverflowPolicy::default(),
            mute_console: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint.validate()?;
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_per_window == 0 {
            return Err(ConfigError::ZeroRate);
        }
        if self.window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        if self.pending_bound == Some(0) {
            return Err(ConfigError::ZeroBound);
        }
        Ok(())
    }
}
