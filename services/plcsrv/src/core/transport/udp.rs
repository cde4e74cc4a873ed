//! UDP transport
//!
//! Carries FINS (Omron) sessions. The socket is "connected" so receive only
//! accepts datagrams from the controller; connecting a UDP socket is a local
//! operation, so unreachable controllers surface as receive timeouts.

use std::time::Duration;

use async_trait::async_trait;
use errors::{AgentError, AgentResult};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use super::traits::Transport;

#[derive(Debug)]
pub struct UdpTransport {
    host: String,
    port: u16,
    read_timeout: Duration,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(host: impl Into<String>, port: u16, read_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout,
            socket: None,
        }
    }

    fn socket_ref(&self) -> AgentResult<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| AgentError::Transport("UDP session not connected".to_string()))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn transport_type(&self) -> &str {
        "udp"
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&mut self) -> AgentResult<()> {
        let endpoint = self.endpoint();
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| AgentError::ConnectionFailed {
                endpoint: endpoint.clone(),
                reason: format!("bind failed: {}", e),
            })?;
        socket
            .connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| AgentError::ConnectionFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        self.socket = Some(socket);
        debug!("UDP session bound for {}", endpoint);
        Ok(())
    }

    async fn disconnect(&mut self) -> AgentResult<()> {
        self.socket = None;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> AgentResult<()> {
        let socket = self.socket_ref()?;
        socket
            .send(data)
            .await
            .map(|_| ())
            .map_err(|e| AgentError::Transport(format!("UDP send failed: {}", e)))
    }

    async fn receive(&mut self, buf: &mut [u8]) -> AgentResult<usize> {
        let endpoint = self.endpoint();
        let read_timeout = self.read_timeout;
        let socket = self.socket_ref()?;
        timeout(read_timeout, socket.recv(buf))
            .await
            .map_err(|_| {
                AgentError::Timeout(format!(
                    "no response from {} within {:?}",
                    endpoint, read_timeout
                ))
            })?
            .map_err(|e| AgentError::Transport(format!("UDP receive failed: {}", e)))
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}
