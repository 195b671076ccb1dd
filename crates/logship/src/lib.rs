// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client-side log shipper.
//!
//! Accepts structured log events from the application and forwards them to a
//! remote collector over HTTP or a raw socket, decoupling the logging call
//! from network latency. Delivery runs through a queue with bounded
//! concurrency, a start-rate limit per rolling window, and per-event
//! retry with backoff; exhausted events are dropped, counted, and reported
//! through an optional failure hook rather than surfaced to the caller.
//!
//! ```no_run
//! use logship::{Endpoint, LogLevel, Shipper, ShipperConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = ShipperConfig::new(Endpoint::Http {
//!         url: "http://logs.internal:5044".to_string(),
//!     });
//!     config.tags = vec!["service:checkout".to_string()];
//!
//!     let shipper = Shipper::new(config).expect("invalid config");
//!     shipper.info("checkout started", None);
//!     shipper.log(LogLevel::Warn, "cart is very large", None);
//!
//!     // Flush everything before exiting.
//!     shipper.drain().await;
//! }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod event;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod shipper;
pub mod transport;

pub use config::{Endpoint, OverflowPolicy, ShipperConfig};
pub use error::{ConfigError, EnqueueError, RetryExhausted, TransportError};
pub use event::{HostMetadata, LogEvent, LogLevel};
pub use queue::{DeliveryHandle, DeliveryService, DeliveryStats, FailureHook};
pub use registry::{install_panic_hook, RegistrationId, ShipperRegistry};
pub use retry::RetryStrategy;
pub use shipper::Shipper;
pub use transport::{HttpTransport, TcpTransport, Transport};
