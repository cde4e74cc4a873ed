//! Polling configuration data model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use errors::{AgentError, AgentResult};
use serde::{Deserialize, Deserializer, Serialize};

/// Controller manufacturer family
///
/// Each variant has exactly one protocol adapter; the enum is total so an
/// unrecognized manufacturer fails at configuration time, not mid-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Manufacturer {
    /// MC protocol (3E binary frames) over TCP
    Mitsubishi,
    /// Modbus TCP (KV series in Modbus slave mode)
    Keyence,
    /// FINS over UDP
    Omron,
    /// Present for completeness; the adapter is a stub
    Siemens,
}

impl FromStr for Manufacturer {
    type Err = AgentError;

    fn from_str(s: &str) -> AgentResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mitsubishi" => Ok(Manufacturer::Mitsubishi),
            "keyence" => Ok(Manufacturer::Keyence),
            "omron" => Ok(Manufacturer::Omron),
            "siemens" => Ok(Manufacturer::Siemens),
            other => Err(AgentError::InvalidConfig {
                field: "manufacturer".to_string(),
                reason: format!("unknown manufacturer '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Manufacturer::Mitsubishi => "mitsubishi",
            Manufacturer::Keyence => "keyence",
            Manufacturer::Omron => "omron",
            Manufacturer::Siemens => "siemens",
        };
        f.write_str(name)
    }
}

/// Declared width/type of a controller data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlcDataType {
    Bit,
    Word,
    Dword,
    Float32,
}

impl PlcDataType {
    /// Registers occupied on word-oriented transports
    pub fn register_count(self) -> u16 {
        match self {
            PlcDataType::Bit | PlcDataType::Word => 1,
            PlcDataType::Dword | PlcDataType::Float32 => 2,
        }
    }
}

fn default_scale() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

/// A scale factor below 1 carries no meaning; normalize at the boundary so
/// the rest of the agent can divide unconditionally.
fn de_scale<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(if raw < 1 { 1 } else { raw as u32 })
}

/// One named measurement bound to a controller address and decoding rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointSpec {
    /// Reading key (e.g. `temperature`)
    pub key: String,
    /// Manufacturer-specific address string (e.g. `D101`, `R10.3`)
    pub address: String,
    #[serde(default = "default_scale", deserialize_with = "de_scale")]
    pub scale_factor: u32,
    pub plc_data_type: PlcDataType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl DataPointSpec {
    pub fn new(
        key: impl Into<String>,
        address: impl Into<String>,
        plc_data_type: PlcDataType,
        scale_factor: u32,
        enabled: bool,
    ) -> Self {
        Self {
            key: key.into(),
            address: address.into(),
            plc_data_type,
            scale_factor: scale_factor.max(1),
            enabled,
        }
    }
}

/// Full polling configuration for one managed device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfiguration {
    pub equipment_id: String,
    pub transport_host: String,
    pub transport_port: u16,
    pub manufacturer: Manufacturer,
    pub interval_ms: u64,
    /// Per-device override of the process-level synthetic-data flag
    #[serde(default)]
    pub synthetic: Option<bool>,
    /// Per-device override of the connection attempt limit
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Per-device override of the connect timeout
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Per-device override of the read timeout
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    /// All configured points, disabled ones included (they stay visible in
    /// the registry but are excluded from every read cycle)
    pub data_points: BTreeMap<String, DataPointSpec>,
}

impl PollingConfiguration {
    /// Enabled specs in key order
    pub fn enabled_points(&self) -> impl Iterator<Item = &DataPointSpec> {
        self.data_points.values().filter(|spec| spec.enabled)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.transport_host, self.transport_port)
    }
}

/// The original deployment's six canonical points, installed when a freshly
/// registered device has no point list yet.
pub fn default_data_points() -> BTreeMap<String, DataPointSpec> {
    let defaults = [
        ("production_count", "D150", PlcDataType::Word, 1, false),
        ("current", "D100", PlcDataType::Word, 10, true),
        ("temperature", "D101", PlcDataType::Word, 10, true),
        ("pressure", "D102", PlcDataType::Word, 100, true),
        ("cycle_time", "D200", PlcDataType::Dword, 1, false),
        ("error_code", "D300", PlcDataType::Word, 1, false),
    ];
    defaults
        .into_iter()
        .map(|(key, address, data_type, scale, enabled)| {
            (
                key.to_string(),
                DataPointSpec::new(key, address, data_type, scale, enabled),
            )
        })
        .collect()
}
