//! Polling scheduler
//!
//! Drives the acquisition loop for one managed device. Cycles are strictly
//! sequential; a new cycle never starts before the previous one finished
//! reporting, so there is never more than one session against the
//! controller. Every suspension point (connect backoff, config-retry delay,
//! end-of-cycle wait) is a cancellable select against the stop token, so a
//! stop request takes effect within one backoff unit rather than a full
//! interval.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::{ConfigSource, PlcDataType, PollingConfiguration};
use crate::core::connection::ConnectionManager;
use crate::core::identity::DeviceIdentity;
use crate::core::protocols::{adapter_for, scaled_value};
use crate::core::reading::Reading;
use crate::core::settings::AgentSettings;
use crate::core::sink::ReadingSink;
use crate::core::stats::FailureTracker;
use crate::core::transport::TransportFactory;

/// Scheduler state, visible to the health API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AgentState {
    Idle = 0,
    ResolvingConfig = 1,
    Connecting = 2,
    Reading = 3,
    Reporting = 4,
    /// Synthesizing a reading because the transport is unreachable
    Fallback = 5,
    Waiting = 6,
    Stopped = 7,
}

impl AgentState {
    fn from_u8(value: u8) -> AgentState {
        match value {
            1 => AgentState::ResolvingConfig,
            2 => AgentState::Connecting,
            3 => AgentState::Reading,
            4 => AgentState::Reporting,
            5 => AgentState::Fallback,
            6 => AgentState::Waiting,
            7 => AgentState::Stopped,
            _ => AgentState::Idle,
        }
    }
}

/// Lock-free state cell: single writer (the scheduler), any readers
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> AgentState {
        AgentState::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, state: AgentState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}

/// Handle to a spawned scheduler: stop control plus shared observability
pub struct SchedulerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    stats: Arc<FailureTracker>,
    state: Arc<StateCell>,
}

impl SchedulerHandle {
    /// Request a stop and wait up to `grace` for the task to finish.
    /// Returns `true` on a clean stop; on timeout the task is aborted.
    pub async fn stop(mut self, grace: Duration) -> bool {
        self.token.cancel();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(_) => true,
            Err(_) => {
                self.task.abort();
                false
            },
        }
    }

    pub fn stats(&self) -> Arc<FailureTracker> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> AgentState {
        self.state.get()
    }
}

pub struct PollingScheduler {
    identity: DeviceIdentity,
    settings: AgentSettings,
    source: Arc<dyn ConfigSource>,
    sink: Arc<dyn ReadingSink>,
    connections: ConnectionManager,
    stats: Arc<FailureTracker>,
    state: Arc<StateCell>,
    equipment_id: Arc<RwLock<Option<String>>>,
    token: CancellationToken,
}

impl PollingScheduler {
    pub fn new(
        identity: DeviceIdentity,
        settings: AgentSettings,
        source: Arc<dyn ConfigSource>,
        sink: Arc<dyn ReadingSink>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let connections = ConnectionManager::new(factory, &settings);
        Self {
            identity,
            settings,
            source,
            sink,
            connections,
            stats: Arc::new(FailureTracker::new()),
            state: Arc::new(StateCell::default()),
            equipment_id: Arc::new(RwLock::new(None)),
            token: CancellationToken::new(),
        }
    }

    pub fn stats(&self) -> Arc<FailureTracker> {
        Arc::clone(&self.stats)
    }

    pub fn state_cell(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    pub fn equipment_id(&self) -> Arc<RwLock<Option<String>>> {
        Arc::clone(&self.equipment_id)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn the loop onto the runtime and hand back the stop handle.
    pub fn spawn(self) -> SchedulerHandle {
        let token = self.token.clone();
        let stats = self.stats();
        let state = self.state_cell();
        let task = tokio::spawn(self.run());
        SchedulerHandle {
            token,
            task,
            stats,
            state,
        }
    }

    /// Run until cancelled. Nothing inside a cycle is fatal: the agent's job
    /// is to run forever on unattended hardware.
    pub async fn run(self) {
        info!(
            "Polling scheduler started for device {} ({})",
            self.identity.hardware_serial, self.identity.ip_address
        );
        loop {
            if self.token.is_cancelled() {
                break;
            }
            self.run_cycle().await;
        }
        self.state.set(AgentState::Stopped);
        info!("Polling scheduler stopped");
    }

    /// One full cycle including the end-of-cycle wait.
    async fn run_cycle(&self) {
        self.state.set(AgentState::ResolvingConfig);
        let config = match self.source.fetch(&self.identity).await {
            Ok(config) => config,
            Err(e) => {
                // Recoverable forever: a device waiting to be registered
                // just keeps asking on a short delay
                warn!("No polling configuration: {}", e);
                self.wait(self.settings.config_retry_delay()).await;
                return;
            },
        };

        if let Ok(mut slot) = self.equipment_id.write() {
            *slot = Some(config.equipment_id.clone());
        }

        let synthetic = config.synthetic.unwrap_or(self.settings.synthetic);
        let reading = self.poll_device(&config, synthetic).await;

        self.state.set(AgentState::Reporting);
        if let Some(reading) = reading {
            if reading.is_empty() {
                debug!("Cycle produced no values, nothing to report");
            } else if let Err(e) = self.sink.send(&config.equipment_id, &reading).await {
                // Samples are droppable; the next cycle matters more
                warn!("Dropping reading for {}: {}", config.equipment_id, e);
            }
        }

        self.state.set(AgentState::Waiting);
        self.wait(Duration::from_millis(config.interval_ms.max(1))).await;
    }

    /// Acquire, read every enabled point, release. Returns the reading to
    /// report, or `None` when the cycle must skip reporting.
    async fn poll_device(
        &self,
        config: &PollingConfiguration,
        synthetic: bool,
    ) -> Option<Reading> {
        self.state.set(AgentState::Connecting);
        let mut session = match self
            .connections
            .acquire(config, &self.settings, &self.token)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("Connection to {} failed: {}", config.endpoint(), e);
                self.stats.record_connection_failure();
                if synthetic {
                    self.state.set(AgentState::Fallback);
                    return Some(self.synthesize(config));
                }
                return None;
            },
        };

        self.state.set(AgentState::Reading);
        let adapter = adapter_for(config);
        let mut reading = Reading::new(Utc::now());
        let mut attempted = 0usize;

        for spec in config.enabled_points() {
            attempted += 1;
            match adapter.read(session.transport_mut(), spec).await {
                Ok(raw) => {
                    reading.insert(&spec.key, scaled_value(raw, spec.scale_factor));
                },
                Err(e) => {
                    // One unreadable point must not abort the cycle
                    warn!("Read failed for '{}' ({}): {}", spec.key, spec.address, e);
                    self.stats.record_read_error();
                },
            }
        }

        self.connections.release(session).await;

        if !reading.is_empty() {
            self.stats.record_cycle_success();
            Some(reading)
        } else {
            if attempted > 0 {
                self.stats.record_cycle_failure();
            }
            if synthetic {
                self.state.set(AgentState::Fallback);
                return Some(self.synthesize(config));
            }
            None
        }
    }

    /// Synthesize a reading shaped exactly like a live one, so downstream
    /// consumers keep receiving data while the controller is unreachable.
    /// Never counts as a transport success.
    fn synthesize(&self, config: &PollingConfiguration) -> Reading {
        let mut rng = rand::thread_rng();
        let mut reading = Reading::synthetic(Utc::now());

        for spec in config.enabled_points() {
            let value = match spec.key.as_str() {
                "current" => round_to(rng.gen_range(2.0..5.0), 10.0),
                "temperature" => round_to(rng.gen_range(20.0..40.0), 10.0),
                "pressure" => round_to(rng.gen_range(0.1..0.8), 100.0),
                "production_count" => f64::from(rng.gen_range(1200..1300)),
                "cycle_time" => f64::from(rng.gen_range(800..900)),
                "error_code" => {
                    if rng.gen_bool(0.05) {
                        f64::from(rng.gen_range(1..=5))
                    } else {
                        0.0
                    }
                },
                _ => match spec.plc_data_type {
                    PlcDataType::Bit => f64::from(rng.gen_range(0..=1)),
                    PlcDataType::Float32 => round_to(rng.gen_range(0.0..100.0), 10.0),
                    PlcDataType::Word | PlcDataType::Dword => f64::from(rng.gen_range(0..1000)),
                },
            };
            reading.insert(&spec.key, value);
        }
        reading
    }

    /// Cancellable sleep: returns as soon as either the duration elapses or
    /// the stop token fires.
    async fn wait(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {},
            _ = self.token.cancelled() => {},
        }
    }
}

fn round_to(value: f64, precision: f64) -> f64 {
    (value * precision).round() / precision
}
