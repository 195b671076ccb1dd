// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured log events and the envelope shipped to the collector.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Severity of a log event, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(ConfigError::InvalidLevel(other.to_string())),
        }
    }
}

/// Identity of the emitting process, captured once per shipper and attached
/// to every event.
#[derive(Debug, Clone, Serialize)]
pub struct HostMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub pid: u32,
}

impl HostMetadata {
    pub fn capture() -> Self {
        let hostname = std::env::var("HOSTNAME")
            .ok()
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty());
        HostMetadata {
            hostname,
            pid: std::process::id(),
        }
    }
}

/// One structured log record destined for the remote collector.
///
/// Immutable once enqueued: the delivery queue owns the event from enqueue
/// until it is either sent or dropped after exhausting its retry budget.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Map<String, Value>>,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    #[serde(rename = "@tags")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostMetadata>,
}

impl LogEvent {
    /// Build an event stamped with the current time. Tags and host metadata
    /// are filled in by the shipper that enqueues it.
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        fields: Option<Map<String, Value>>,
    ) -> Self {
        LogEvent {
            level,
            message: message.into(),
            fields,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            tags: Vec::new(),
            host: None,
        }
    }
}
