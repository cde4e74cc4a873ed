//! Adapter contract shared by all manufacturer families

use async_trait::async_trait;
use errors::AgentResult;

use crate::core::config::{DataPointSpec, Manufacturer, PollingConfiguration};
use crate::core::transport::Transport;

use super::keyence::KeyenceAdapter;
use super::mitsubishi::MitsubishiAdapter;
use super::omron::OmronAdapter;
use super::siemens::SiemensAdapter;

/// Decoded wire value before scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Bit(bool),
    Word(u16),
    DWord(u32),
    Float32(f32),
}

impl RawValue {
    pub fn as_f64(self) -> f64 {
        match self {
            RawValue::Bit(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            },
            RawValue::Word(v) => f64::from(v),
            RawValue::DWord(v) => f64::from(v),
            RawValue::Float32(v) => f64::from(v),
        }
    }
}

/// Manufacturer-specific wire-level read of one data point.
///
/// Implementations must confine every failure (malformed address, wrong bit
/// syntax for the family, short or error responses) to the returned error;
/// nothing may panic past this boundary. The scheduler books each error as
/// a per-key read failure and keeps the cycle going.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn manufacturer(&self) -> Manufacturer;

    async fn read(
        &self,
        transport: &mut dyn Transport,
        spec: &DataPointSpec,
    ) -> AgentResult<RawValue>;
}

/// Select the adapter for a configuration's manufacturer, once per cycle.
pub fn adapter_for(config: &PollingConfiguration) -> Box<dyn ProtocolAdapter> {
    match config.manufacturer {
        Manufacturer::Mitsubishi => Box::new(MitsubishiAdapter::new()),
        Manufacturer::Keyence => Box::new(KeyenceAdapter::new()),
        Manufacturer::Omron => Box::new(OmronAdapter::for_host(&config.transport_host)),
        Manufacturer::Siemens => Box::new(SiemensAdapter),
    }
}
