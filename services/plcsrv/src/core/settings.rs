//! Process-level agent settings
//!
//! Loaded once at startup with Figment: coded defaults, then an optional
//! YAML file, then `PLCSRV_`-prefixed environment variables. Per-device
//! values from the fetched polling configuration override these at cycle
//! time; these are the fallbacks when configuration is unavailable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use errors::{AgentError, AgentResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Base URL of the configuration source (central server)
    pub config_source_url: String,
    /// Telemetry sink endpoint receiving reading POSTs
    pub sink_url: String,

    /// Default controller host when configuration does not provide one
    pub plc_host: String,
    /// Default controller port (MC / FINS transports)
    pub plc_port: u16,
    /// Default Modbus port (Keyence transport)
    pub modbus_port: u16,

    /// Default polling interval in milliseconds
    pub interval_ms: u64,
    /// Maximum connection attempts per cycle
    pub max_retries: u32,
    /// Base inter-attempt delay; attempt `i` waits `i × base`
    pub retry_base_delay_ms: u64,
    /// TCP/UDP connect timeout
    pub connect_timeout_ms: u64,
    /// Per-request read timeout
    pub read_timeout_ms: u64,
    /// Delay before re-resolving configuration after `ConfigUnavailable`
    pub config_retry_delay_ms: u64,

    /// Synthetic-data mode: skip the real transport and synthesize readings
    pub synthetic: bool,

    /// Last-known-good configuration cache location
    pub cache_path: PathBuf,

    /// Health/stats API bind address
    pub api_bind: String,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            config_source_url: "http://192.168.1.10:5000".to_string(),
            sink_url: "http://192.168.1.10:5000/api/logs".to_string(),
            plc_host: "192.168.0.10".to_string(),
            plc_port: 5000,
            modbus_port: 502,
            interval_ms: 5000,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            connect_timeout_ms: 3000,
            read_timeout_ms: 3000,
            config_retry_delay_ms: 10_000,
            synthetic: false,
            cache_path: PathBuf::from("config/polling_cache.json"),
            api_bind: "0.0.0.0:5001".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl AgentSettings {
    /// Load settings: defaults < YAML file (if given) < `PLCSRV_*` env.
    pub fn load(config_file: Option<&Path>) -> AgentResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(AgentSettings::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed("PLCSRV_"))
            .extract()
            .map_err(|e| AgentError::Configuration(e.to_string()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn config_retry_delay(&self) -> Duration {
        Duration::from_millis(self.config_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AgentSettings::load(None).unwrap();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.interval_ms, 5000);
        assert_eq!(settings.modbus_port, 502);
        assert!(!settings.synthetic);
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PLCSRV_PLC_HOST", "10.0.0.42");
            jail.set_env("PLCSRV_SYNTHETIC", "true");
            jail.set_env("PLCSRV_INTERVAL_MS", "250");
            let settings = AgentSettings::load(None).expect("load");
            assert_eq!(settings.plc_host, "10.0.0.42");
            assert!(settings.synthetic);
            assert_eq!(settings.interval_ms, 250);
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file_between_defaults_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("plcsrv.yaml", "plc_port: 6000\nlog_level: debug\n")?;
            jail.set_env("PLCSRV_PLC_PORT", "7000");
            let settings =
                AgentSettings::load(Some(Path::new("plcsrv.yaml"))).expect("load");
            // env wins over file, file wins over default
            assert_eq!(settings.plc_port, 7000);
            assert_eq!(settings.log_level, "debug");
            Ok(())
        });
    }
}
