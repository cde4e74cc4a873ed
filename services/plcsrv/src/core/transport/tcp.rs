//! TCP transport
//!
//! Carries MC protocol (Mitsubishi) and Modbus TCP (Keyence) sessions. One
//! short-lived stream per polling cycle; no pooling.

use std::time::Duration;

use async_trait::async_trait;
use errors::{AgentError, AgentResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::traits::Transport;

#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            read_timeout,
            stream: None,
        }
    }

    fn stream_mut(&mut self) -> AgentResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| AgentError::Transport("TCP session not connected".to_string()))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn transport_type(&self) -> &str {
        "tcp"
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&mut self) -> AgentResult<()> {
        let endpoint = self.endpoint();
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| AgentError::ConnectionFailed {
            endpoint: endpoint.clone(),
            reason: format!("connect timed out after {:?}", self.connect_timeout),
        })?
        .map_err(|e| AgentError::ConnectionFailed {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        stream.set_nodelay(true).ok();
        self.stream = Some(stream);
        debug!("TCP session established: {}", endpoint);
        Ok(())
    }

    async fn disconnect(&mut self) -> AgentResult<()> {
        if let Some(mut stream) = self.stream.take() {
            // Half-open sockets are expected after controller resets; a close
            // failure carries no information worth propagating.
            let _ = stream.shutdown().await;
            trace!("TCP session closed: {}", self.endpoint());
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> AgentResult<()> {
        let stream = self.stream_mut()?;
        stream
            .write_all(data)
            .await
            .map_err(|e| AgentError::Transport(format!("TCP send failed: {}", e)))
    }

    async fn receive(&mut self, buf: &mut [u8]) -> AgentResult<usize> {
        let read_timeout = self.read_timeout;
        let endpoint = self.endpoint();
        let stream = self.stream_mut()?;
        let n = timeout(read_timeout, stream.read(buf))
            .await
            .map_err(|_| {
                AgentError::Timeout(format!(
                    "no response from {} within {:?}",
                    endpoint, read_timeout
                ))
            })?
            .map_err(|e| AgentError::Transport(format!("TCP receive failed: {}", e)))?;
        if n == 0 {
            return Err(AgentError::Transport(format!(
                "connection closed by {}",
                endpoint
            )));
        }
        Ok(n)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
