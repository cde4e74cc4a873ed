//! Connection lifecycle management
//!
//! Owns connect, bounded retry with increasing backoff, and close for one
//! polling cycle's session. Controllers in this class generally permit a
//! single active session, and cycle intervals sit in the seconds range, so
//! sessions are never pooled or reused across cycles.

use std::sync::Arc;
use std::time::Duration;

use errors::{AgentError, AgentResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::config::PollingConfiguration;
use crate::core::settings::AgentSettings;
use crate::core::transport::{Transport, TransportFactory};

/// A live transport scoped to exactly one polling cycle
#[derive(Debug)]
pub struct Session {
    transport: Box<dyn Transport>,
}

impl Session {
    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}

pub struct ConnectionManager {
    factory: Arc<dyn TransportFactory>,
    max_retries: u32,
    base_delay: Duration,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn TransportFactory>, settings: &AgentSettings) -> Self {
        Self {
            factory,
            max_retries: settings.max_retries.max(1),
            base_delay: settings.retry_base_delay(),
        }
    }

    /// Acquire a connected session, retrying up to `max_retries` times with
    /// an inter-attempt delay of `attempt_index × base_delay`. Every delay is
    /// interruptible by `token` so a stop request takes effect within one
    /// backoff unit.
    pub async fn acquire(
        &self,
        config: &PollingConfiguration,
        settings: &AgentSettings,
        token: &CancellationToken,
    ) -> AgentResult<Session> {
        let transport = self.factory.build(config, settings)?;
        let max_retries = config.max_retries.unwrap_or(self.max_retries).max(1);
        self.acquire_attempts(transport, max_retries, token).await
    }

    /// Retry loop over an already-built transport (the seam tests drive).
    pub async fn acquire_with(
        &self,
        transport: Box<dyn Transport>,
        token: &CancellationToken,
    ) -> AgentResult<Session> {
        self.acquire_attempts(transport, self.max_retries, token)
            .await
    }

    async fn acquire_attempts(
        &self,
        mut transport: Box<dyn Transport>,
        max_retries: u32,
        token: &CancellationToken,
    ) -> AgentResult<Session> {
        let endpoint = transport.endpoint();
        let mut last_error: Option<AgentError> = None;

        for attempt in 1..=max_retries {
            match transport.connect().await {
                Ok(()) => {
                    debug!(
                        "Session established to {} on attempt {}/{}",
                        endpoint, attempt, max_retries
                    );
                    return Ok(Session { transport });
                },
                Err(e) => {
                    warn!(
                        "Connect attempt {}/{} to {} failed: {}",
                        attempt, max_retries, endpoint, e
                    );
                    last_error = Some(e);
                },
            }

            let delay = self.base_delay * attempt;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = token.cancelled() => {
                    return Err(AgentError::ConnectionFailed {
                        endpoint,
                        reason: "cancelled while backing off".to_string(),
                    });
                },
            }
        }

        Err(last_error.unwrap_or_else(|| AgentError::ConnectionFailed {
            endpoint,
            reason: "no connection attempt made".to_string(),
        }))
    }

    /// Close the session. Idempotent; close errors are swallowed because a
    /// half-open session must never abort the cycle that owns it.
    pub async fn release(&self, mut session: Session) {
        if let Err(e) = session.transport.disconnect().await {
            debug!("Ignoring close error: {}", e);
        }
    }
}
