//! Polling configuration: data model and acquisition
//!
//! The configuration is owned remotely (the central server's equipment
//! registry) and pulled at the start of every cycle so edits take effect
//! without an agent restart. A last-known-good JSON cache covers central
//! server outages.

pub mod provider;
pub mod types;

pub use provider::{ConfigProvider, ConfigSource, StaticConfigSource};
pub use types::{DataPointSpec, Manufacturer, PlcDataType, PollingConfiguration};
