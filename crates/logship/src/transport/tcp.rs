// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raw socket transport: one connection per attempt, length-prefixed JSON.
//!
//! Wire format is `<byte-length>#<json>`, the framing spoken by the
//! logstash-side json-socket collaborator, e.g. `17#{"level":"info"}`.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::TransportError;
use crate::event::LogEvent;
use crate::transport::Transport;

pub struct TcpTransport {
    addr: String,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        TcpTransport {
            addr: format!("{host}:{port}"),
            timeout,
        }
    }

    fn frame(event: &LogEvent) -> Result<Vec<u8>, TransportError> {
        let body = serde_json::to_vec(event)?;
        let prefix = body.len().to_string();
        let mut framed = Vec::with_capacity(prefix.len() + 1 + body.len());
        framed.extend_from_slice(prefix.as_bytes());
        framed.push(b'#');
        framed.extend_from_slice(&body);
        Ok(framed)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, event: &LogEvent) -> Result<(), TransportError> {
        let framed = Self::frame(event)?;
        let io = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(&framed).await?;
            stream.flush().await?;
            stream.shutdown().await?;
            Ok::<(), std::io::Error>(())
        };

        match tokio::time::timeout(self.timeout, io).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                Err(TransportError::Connect(e.to_string()))
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
