//! Transport trait
//!
//! One request/response session to a controller. Implementations own their
//! socket and apply their own receive timeout; adapters only see bytes.

use std::fmt;

use async_trait::async_trait;
use errors::AgentResult;

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Transport type identifier (`tcp`, `udp`, `mock`)
    fn transport_type(&self) -> &str;

    /// Remote endpoint description for log lines
    fn endpoint(&self) -> String;

    /// Connect to the remote endpoint
    async fn connect(&mut self) -> AgentResult<()>;

    /// Close the session. Must be idempotent and must not fail on a
    /// half-open socket; a close error is not actionable mid-cycle.
    async fn disconnect(&mut self) -> AgentResult<()>;

    /// Send one request frame
    async fn send(&mut self, data: &[u8]) -> AgentResult<()>;

    /// Receive one response frame into `buf`, returning the byte count.
    /// Applies the transport's configured read timeout.
    async fn receive(&mut self, buf: &mut [u8]) -> AgentResult<usize>;

    /// Whether the session is currently connected
    fn is_connected(&self) -> bool;
}
