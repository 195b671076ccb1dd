// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public entry point: event assembly plus the delivery queue lifecycle.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::{Endpoint, ShipperConfig};
use crate::error::ConfigError;
use crate::event::{HostMetadata, LogEvent, LogLevel};
use crate::queue::{DeliveryHandle, DeliveryService, DeliveryStats, FailureHook};
use crate::transport::{HttpTransport, TcpTransport, Transport};

/// Ships structured log events to a remote collector.
///
/// `log` and the level helpers never block and never surface delivery
/// failures to the caller; exhausted events are observable through
/// [`Shipper::stats`] and the optional failure hook. Cloning a shipper
/// shares the underlying delivery queue.
///
/// Must be constructed inside a tokio runtime, which hosts the queue
/// service and its delivery tasks.
#[derive(Clone)]
pub struct Shipper {
    handle: DeliveryHandle,
    tags: Vec<String>,
    min_level: LogLevel,
    mute_console: bool,
    host: HostMetadata,
}

impl Shipper {
    pub fn new(config: ShipperConfig) -> Result<Self, ConfigError> {
        Self::with_failure_hook(config, None)
    }

    pub fn with_failure_hook(
        config: ShipperConfig,
        failure_hook: Option<FailureHook>,
    ) -> Result<Self, ConfigError> {
        let transport: Arc<dyn Transport> = match &config.endpoint {
            Endpoint::Http { url } => {
                Arc::new(HttpTransport::new(url.clone(), config.send_timeout))
            }
            Endpoint::Tcp { host, port } => {
                Arc::new(TcpTransport::new(host, *port, config.send_timeout))
            }
        };
        Self::with_transport(config, transport, failure_hook)
    }

    /// Construct with a custom transport, for tests and alternative
    /// collectors.
    pub fn with_transport(
        config: ShipperConfig,
        transport: Arc<dyn Transport>,
        failure_hook: Option<FailureHook>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (service, handle) = DeliveryService::new(transport, &config, failure_hook);
        tokio::spawn(service.run());

        Ok(Shipper {
            handle,
            tags: config.tags,
            min_level: config.level,
            mute_console: config.mute_console,
            host: HostMetadata::capture(),
        })
    }

    /// Assemble the event envelope and enqueue it for delivery. Events
    /// below the configured level are mirrored locally but not shipped.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: Option<Map<String, Value>>,
    ) {
        let message = message.into();
        if !self.mute_console {
            self.mirror(level, &message, fields.as_ref());
        }
        if level < self.min_level {
            return;
        }

        let mut event = LogEvent::new(level, message, fields);
        event.tags = self.tags.clone();
        event.host = Some(self.host.clone());
        self.enqueue(event);
    }

    /// Admit a pre-built event as-is, without attaching tags or host
    /// metadata.
    pub fn enqueue(&self, event: LogEvent) {
        if self.handle.enqueue(event).is_err() {
            warn!("delivery queue has shut down, event discarded");
        }
    }

    pub fn debug(&self, message: impl Into<String>, fields: Option<Map<String, Value>>) {
        self.log(LogLevel::Debug, message, fields);
    }

    pub fn info(&self, message: impl Into<String>, fields: Option<Map<String, Value>>) {
        self.log(LogLevel::Info, message, fields);
    }

    pub fn warn(&self, message: impl Into<String>, fields: Option<Map<String, Value>>) {
        self.log(LogLevel::Warn, message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: Option<Map<String, Value>>) {
        self.log(LogLevel::Error, message, fields);
    }

    pub fn fatal(&self, message: impl Into<String>, fields: Option<Map<String, Value>>) {
        self.log(LogLevel::Fatal, message, fields);
    }

    /// Log an error value at `error` level, flattening its source chain
    /// into the event fields.
    pub fn error_with(
        &self,
        err: &(dyn std::error::Error + 'static),
        fields: Option<Map<String, Value>>,
    ) {
        self.log(
            LogLevel::Error,
            err.to_string(),
            Some(Self::with_error_chain(err, fields)),
        );
    }

    /// Like [`Shipper::error_with`] at `fatal` level.
    pub fn fatal_with(
        &self,
        err: &(dyn std::error::Error + 'static),
        fields: Option<Map<String, Value>>,
    ) {
        self.log(
            LogLevel::Fatal,
            err.to_string(),
            Some(Self::with_error_chain(err, fields)),
        );
    }

    /// Wait until every outstanding event has reached terminal state.
    pub async fn drain(&self) {
        if self.handle.drain().await.is_err() {
            warn!("delivery queue has shut down, nothing to drain");
        }
    }

    /// Stop admitting new events; already-accepted deliveries run to
    /// terminal state.
    pub fn shutdown(&self) {
        let _ = self.handle.shutdown();
    }

    pub fn stats(&self) -> DeliveryStats {
        self.handle.stats()
    }

    fn with_error_chain(
        err: &(dyn std::error::Error + 'static),
        fields: Option<Map<String, Value>>,
    ) -> Map<String, Value> {
        let mut fields = fields.unwrap_or_default();
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(Value::String(cause.to_string()));
            source = cause.source();
        }
        if !chain.is_empty() {
            fields.insert("error_chain".to_string(), Value::Array(chain));
        }
        fields
    }

    fn mirror(&self, level: LogLevel, message: &str, fields: Option<&Map<String, Value>>) {
        let fields_str = fields
            .map(|f| format!(" - {}", Value::Object(f.clone())))
            .unwrap_or_default();
        match level {
            LogLevel::Fatal | LogLevel::Error => error!("{message}{fields_str}"),
            LogLevel::Warn => warn!("{message}{fields_str}"),
            LogLevel::Info => info!("{message}{fields_str}"),
            LogLevel::Debug => debug!("{message}{fields_str}"),
        }
    }
}
