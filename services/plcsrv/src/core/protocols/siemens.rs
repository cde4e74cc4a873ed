//! Siemens adapter stub
//!
//! Keeps the manufacturer enum total: a Siemens configuration produces a
//! uniform per-point error instead of a crash, and the cycle machinery
//! (statistics, fallback policy) behaves exactly as for any failing read.

use async_trait::async_trait;
use errors::{AgentError, AgentResult};

use crate::core::config::{DataPointSpec, Manufacturer};
use crate::core::transport::Transport;

use super::traits::{ProtocolAdapter, RawValue};

#[derive(Debug, Default)]
pub struct SiemensAdapter;

#[async_trait]
impl ProtocolAdapter for SiemensAdapter {
    fn manufacturer(&self) -> Manufacturer {
        Manufacturer::Siemens
    }

    async fn read(
        &self,
        _transport: &mut dyn Transport,
        _spec: &DataPointSpec,
    ) -> AgentResult<RawValue> {
        Err(AgentError::NotImplemented(
            "siemens S7 support is not implemented".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PlcDataType;
    use crate::core::transport::MockTransport;

    #[tokio::test]
    async fn test_every_read_returns_not_implemented() {
        let adapter = SiemensAdapter;
        let mut mock = MockTransport::new();
        let spec = DataPointSpec::new("point", "DB1.DBW0", PlcDataType::Word, 1, true);
        let err = adapter.read(&mut mock, &spec).await.unwrap_err();
        assert!(matches!(err, AgentError::NotImplemented(_)));
    }
}
