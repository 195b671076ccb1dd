// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP POST transport: one JSON request per attempt.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::event::LogEvent;
use crate::transport::Transport;

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        HttpTransport {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, event: &LogEvent) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Connect(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
