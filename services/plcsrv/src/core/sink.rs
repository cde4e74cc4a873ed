//! Telemetry sink client
//!
//! Readings are time-series samples: a lost sample is acceptable, a stuck
//! agent is not. Send failures are reported as `SinkUnavailable` and the
//! sample is dropped; there is no retry queue.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use errors::{AgentError, AgentResult};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::core::reading::Reading;

/// Where finished readings go. The HTTP sink is the production impl; the
/// recording sink backs scheduler tests.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn send(&self, equipment_id: &str, reading: &Reading) -> AgentResult<()>;
}

pub struct TelemetrySink {
    url: String,
    client: reqwest::Client,
}

impl TelemetrySink {
    pub fn new(url: impl Into<String>) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Flattened payload: identity and timestamp beside the reading keys.
    /// Keys absent from the reading are simply absent from the document —
    /// consumers treat missing as unknown, never as zero.
    fn payload(equipment_id: &str, reading: &Reading) -> Value {
        let mut body = Map::new();
        body.insert("equipment_id".to_string(), json!(equipment_id));
        body.insert(
            "timestamp".to_string(),
            json!(reading
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        for (key, value) in &reading.values {
            body.insert(key.clone(), json!(value));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl ReadingSink for TelemetrySink {
    async fn send(&self, equipment_id: &str, reading: &Reading) -> AgentResult<()> {
        let body = Self::payload(equipment_id, reading);
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::SinkUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::SinkUnavailable(format!(
                "sink answered {}",
                response.status()
            )));
        }
        debug!(
            "Forwarded {} values for {} to sink",
            reading.len(),
            equipment_id
        );
        Ok(())
    }
}

/// Captures sent readings in memory for assertions
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, Reading)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Reading)> {
        self.sent.lock().expect("recording sink lock").clone()
    }
}

#[async_trait]
impl ReadingSink for RecordingSink {
    async fn send(&self, equipment_id: &str, reading: &Reading) -> AgentResult<()> {
        self.sent
            .lock()
            .expect("recording sink lock")
            .push((equipment_id.to_string(), reading.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_payload_is_flat() {
        let mut reading = Reading::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        reading.insert("temperature", 25.5);
        reading.insert("current", 3.2);

        let body = TelemetrySink::payload("EQ-1", &reading);
        assert_eq!(body["equipment_id"], "EQ-1");
        assert_eq!(body["timestamp"], "2025-06-01T12:00:00.000Z");
        assert_eq!(body["temperature"], 25.5);
        assert_eq!(body["current"], 3.2);
        // No nested "values" wrapper, no placeholder for absent keys
        assert!(body.get("values").is_none());
        assert!(body.get("pressure").is_none());
    }
}
