//! PLC Telemetry Agent (`plcsrv`)
//!
//! An async edge agent that polls one programmable controller on a fixed
//! cadence, decodes raw register values into typed engineering readings, and
//! forwards them to a central collector. Designed to run unattended: every
//! error path ends in "log, record statistic, continue".
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ IdentityResolver│───►│ ConfigProvider  │───►│ PollingScheduler│
//! │ (serial/MAC/IP) │    │ (remote + cache)│    │ (one per device)│
//! └─────────────────┘    └─────────────────┘    └────────┬────────┘
//!                                                        │ per cycle
//!                              ┌─────────────────────────┼──────────┐
//!                              ▼                         ▼          ▼
//!                     ┌─────────────────┐    ┌─────────────────┐  ┌──────────┐
//!                     │ConnectionManager│───►│ ProtocolAdapter │  │Telemetry │
//!                     │ (retry/backoff) │    │ (per maker)     │  │Sink POST │
//!                     └─────────────────┘    └─────────────────┘  └──────────┘
//! ```
//!
//! Manufacturer adapters hide their own addressing grammar and word order
//! behind one `read` contract: Mitsubishi (MC protocol 3E frames), Omron
//! (FINS), Keyence (Modbus TCP), and a Siemens stub.

pub mod api;
pub mod core;

pub use crate::core::config::{DataPointSpec, Manufacturer, PlcDataType, PollingConfiguration};
pub use crate::core::identity::{DeviceIdentity, IdentityResolver};
pub use crate::core::reading::Reading;
pub use crate::core::scheduler::{AgentState, PollingScheduler};
pub use crate::core::settings::AgentSettings;
pub use crate::core::stats::{FailureSnapshot, FailureTracker};

pub use errors::{AgentError, AgentResult};
