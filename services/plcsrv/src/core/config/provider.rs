//! Configuration acquisition
//!
//! Pulls the polling configuration from the central registry by device
//! identity, with precedence hardware serial > MAC > IP (first match wins).
//! A successful fetch refreshes the local last-known-good cache; a failed
//! fetch falls back to that cache, and only when both are missing does the
//! caller see `ConfigUnavailable`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::config::types::{
    default_data_points, DataPointSpec, Manufacturer, PlcDataType, PollingConfiguration,
};
use crate::core::identity::DeviceIdentity;
use crate::core::settings::AgentSettings;

/// Where a polling configuration comes from.
///
/// The scheduler depends on this seam rather than on the HTTP provider so
/// cycle behavior can be tested without a registry.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self, identity: &DeviceIdentity) -> AgentResult<PollingConfiguration>;
}

/// Equipment record as served by `GET /api/equipment/search`
#[derive(Debug, Deserialize)]
struct EquipmentRecord {
    equipment_id: String,
    manufacturer: String,
    #[serde(default)]
    plc_ip: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    modbus_port: Option<u16>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    synthetic: Option<bool>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    read_timeout_ms: Option<u64>,
}

/// Point record as served by `GET /api/equipment/{id}/plc_configs`
#[derive(Debug, Deserialize)]
struct PointRecord {
    data_type: String,
    #[serde(default)]
    enabled: bool,
    address: String,
    #[serde(default = "default_point_scale")]
    scale_factor: i64,
    #[serde(default = "default_point_type")]
    plc_data_type: String,
}

fn default_point_scale() -> i64 {
    1
}

fn default_point_type() -> String {
    "word".to_string()
}

/// On-disk shape of the last-known-good cache
#[derive(Debug, Serialize, Deserialize)]
struct CachedConfiguration {
    identity_key: String,
    fetched_at: DateTime<Utc>,
    config: PollingConfiguration,
}

/// HTTP-backed configuration provider with a JSON file cache
pub struct ConfigProvider {
    base_url: String,
    client: reqwest::Client,
    cache_path: PathBuf,
    defaults: AgentSettings,
}

impl ConfigProvider {
    pub fn new(settings: &AgentSettings) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: settings.config_source_url.trim_end_matches('/').to_string(),
            client,
            cache_path: settings.cache_path.clone(),
            defaults: settings.clone(),
        })
    }

    async fn fetch_remote(&self, identity: &DeviceIdentity) -> AgentResult<PollingConfiguration> {
        let lookups = [
            ("cpu_serial_number", identity.hardware_serial.as_str()),
            ("mac_address", identity.mac_address.as_str()),
            ("ip_address", identity.ip_address.as_str()),
        ];

        for (param, value) in lookups {
            let url = format!("{}/api/equipment/search", self.base_url);
            let response = self
                .client
                .get(&url)
                .query(&[(param, value)])
                .send()
                .await?;

            if response.status().is_success() {
                let record: EquipmentRecord = response.json().await?;
                debug!(
                    "Equipment matched by {}: {}",
                    param, record.equipment_id
                );
                return self.assemble(record).await;
            }
            debug!("No equipment match for {}={}", param, value);
        }

        Err(AgentError::ConfigUnavailable(
            "no equipment record matched device identity".to_string(),
        ))
    }

    /// Join the equipment record with its point list into one configuration.
    async fn assemble(&self, record: EquipmentRecord) -> AgentResult<PollingConfiguration> {
        let manufacturer: Manufacturer = record.manufacturer.parse()?;

        let url = format!(
            "{}/api/equipment/{}/plc_configs",
            self.base_url, record.equipment_id
        );
        let response = self.client.get(&url).send().await?;
        let points: Vec<PointRecord> = if response.status().is_success() {
            response.json().await?
        } else {
            Vec::new()
        };

        let mut data_points: BTreeMap<String, DataPointSpec> = BTreeMap::new();
        for point in points {
            let data_type = parse_plc_data_type(&point.plc_data_type)?;
            let scale = if point.scale_factor < 1 {
                1
            } else {
                point.scale_factor as u32
            };
            data_points.insert(
                point.data_type.clone(),
                DataPointSpec::new(point.data_type, point.address, data_type, scale, point.enabled),
            );
        }
        if data_points.is_empty() {
            // Freshly registered device: start with the canonical point set
            data_points = default_data_points();
        }

        // Keyence controllers speak Modbus on their own port
        let transport_port = match manufacturer {
            Manufacturer::Keyence => record.modbus_port.unwrap_or(self.defaults.modbus_port),
            _ => record.port.unwrap_or(self.defaults.plc_port),
        };

        let transport_host = record
            .plc_ip
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| self.defaults.plc_host.clone());

        Ok(PollingConfiguration {
            equipment_id: record.equipment_id,
            transport_host,
            transport_port,
            manufacturer,
            interval_ms: record.interval.unwrap_or(self.defaults.interval_ms),
            synthetic: record.synthetic,
            max_retries: record.max_retries,
            connect_timeout_ms: record.connect_timeout_ms,
            read_timeout_ms: record.read_timeout_ms,
            data_points,
        })
    }

    fn store_cache(&self, identity: &DeviceIdentity, config: &PollingConfiguration) {
        let cached = CachedConfiguration {
            identity_key: identity.hardware_serial.clone(),
            fetched_at: Utc::now(),
            config: config.clone(),
        };
        let result = (|| -> AgentResult<()> {
            if let Some(parent) = self.cache_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let json = serde_json::to_string_pretty(&cached)?;
            std::fs::write(&self.cache_path, json)?;
            Ok(())
        })();
        if let Err(e) = result {
            // Cache is best-effort; a broken disk must not stop polling
            warn!("Failed to write configuration cache: {}", e);
        }
    }

    fn load_cache(&self, identity: &DeviceIdentity) -> Option<PollingConfiguration> {
        let content = std::fs::read_to_string(&self.cache_path).ok()?;
        let cached: CachedConfiguration = serde_json::from_str(&content).ok()?;
        if cached.identity_key != identity.hardware_serial {
            warn!(
                "Configuration cache belongs to a different device ({}), ignoring",
                cached.identity_key
            );
            return None;
        }
        Some(cached.config)
    }
}

#[async_trait]
impl ConfigSource for ConfigProvider {
    async fn fetch(&self, identity: &DeviceIdentity) -> AgentResult<PollingConfiguration> {
        match self.fetch_remote(identity).await {
            Ok(config) => {
                self.store_cache(identity, &config);
                Ok(config)
            },
            Err(e) => {
                warn!("Remote configuration fetch failed: {}", e);
                match self.load_cache(identity) {
                    Some(config) => {
                        info!(
                            "Using cached configuration for {}",
                            config.equipment_id
                        );
                        Ok(config)
                    },
                    None => Err(AgentError::ConfigUnavailable(format!(
                        "remote fetch failed and no cached configuration exists: {}",
                        e
                    ))),
                }
            },
        }
    }
}

fn parse_plc_data_type(s: &str) -> AgentResult<PlcDataType> {
    match s.trim().to_ascii_lowercase().as_str() {
        "bit" => Ok(PlcDataType::Bit),
        "word" => Ok(PlcDataType::Word),
        "dword" => Ok(PlcDataType::Dword),
        "float32" => Ok(PlcDataType::Float32),
        other => Err(AgentError::InvalidConfig {
            field: "plc_data_type".to_string(),
            reason: format!("unknown data type '{}'", other),
        }),
    }
}

/// Fixed configuration source for tests and bench rigs.
pub struct StaticConfigSource {
    config: Option<PollingConfiguration>,
}

impl StaticConfigSource {
    pub fn new(config: PollingConfiguration) -> Self {
        Self {
            config: Some(config),
        }
    }

    /// A source that always reports `ConfigUnavailable`.
    pub fn unavailable() -> Self {
        Self { config: None }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn fetch(&self, _identity: &DeviceIdentity) -> AgentResult<PollingConfiguration> {
        self.config
            .clone()
            .ok_or_else(|| AgentError::ConfigUnavailable("static source empty".to_string()))
    }
}
