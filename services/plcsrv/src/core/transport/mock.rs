//! Mock transport for testing
//!
//! Replays canned response frames and records sent frames so adapter and
//! scheduler logic can be exercised without a controller on the network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use errors::{AgentError, AgentResult};

use super::factory::TransportFactory;
use super::traits::Transport;
use crate::core::config::PollingConfiguration;
use crate::core::settings::AgentSettings;

/// Counters shared with the test after the transport moves into a session
#[derive(Debug, Default)]
pub struct MockCounters {
    pub connect_attempts: AtomicU32,
    pub disconnects: AtomicU32,
}

#[derive(Debug)]
pub struct MockTransport {
    responses: VecDeque<Vec<u8>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    counters: Arc<MockCounters>,
    fail_connect: bool,
    connected: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(MockCounters::default()),
            fail_connect: false,
            connected: false,
        }
    }

    /// A transport whose every connect attempt fails
    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::new()
        }
    }

    /// Queue a response frame to be returned by the next `receive`
    pub fn push_response(&mut self, frame: Vec<u8>) {
        self.responses.push_back(frame);
    }

    /// Handle to the sent-frame log, usable after the transport moves away
    pub fn sent_frames(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent)
    }

    /// Handle to the attempt counters, usable after the transport moves away
    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn transport_type(&self) -> &str {
        "mock"
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }

    async fn connect(&mut self) -> AgentResult<()> {
        self.counters.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(AgentError::ConnectionFailed {
                endpoint: "mock".to_string(),
                reason: "simulated connection failure".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> AgentResult<()> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> AgentResult<()> {
        if !self.connected {
            return Err(AgentError::Transport("mock not connected".to_string()));
        }
        self.sent
            .lock()
            .expect("sent-frame lock")
            .push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> AgentResult<usize> {
        let frame = self
            .responses
            .pop_front()
            .ok_or_else(|| AgentError::Timeout("mock: no queued response".to_string()))?;
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Factory handing out pre-loaded mock transports, one per acquire
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    transports: Mutex<VecDeque<MockTransport>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, transport: MockTransport) {
        self.transports
            .lock()
            .expect("mock factory lock")
            .push_back(transport);
    }
}

impl TransportFactory for MockTransportFactory {
    fn build(
        &self,
        _config: &PollingConfiguration,
        _settings: &AgentSettings,
    ) -> AgentResult<Box<dyn Transport>> {
        let transport = self
            .transports
            .lock()
            .expect("mock factory lock")
            .pop_front()
            .ok_or_else(|| AgentError::Internal("mock factory exhausted".to_string()))?;
        Ok(Box::new(transport))
    }
}
