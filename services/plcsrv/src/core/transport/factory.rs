//! Transport selection
//!
//! One place knows which wire a manufacturer speaks: FINS rides UDP, MC
//! protocol and Modbus ride TCP. The factory seam lets tests substitute the
//! mock transport without touching the connection manager.

use std::time::Duration;

use errors::AgentResult;

use super::tcp::TcpTransport;
use super::traits::Transport;
use super::udp::UdpTransport;
use crate::core::config::{Manufacturer, PollingConfiguration};
use crate::core::settings::AgentSettings;

pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        config: &PollingConfiguration,
        settings: &AgentSettings,
    ) -> AgentResult<Box<dyn Transport>>;
}

/// Production factory building real network transports
#[derive(Debug, Default)]
pub struct NetTransportFactory;

impl TransportFactory for NetTransportFactory {
    fn build(
        &self,
        config: &PollingConfiguration,
        settings: &AgentSettings,
    ) -> AgentResult<Box<dyn Transport>> {
        // Per-device timeout overrides win over process defaults
        let connect_timeout = config
            .connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| settings.connect_timeout());
        let read_timeout = config
            .read_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| settings.read_timeout());

        let transport: Box<dyn Transport> = match config.manufacturer {
            Manufacturer::Omron => Box::new(UdpTransport::new(
                config.transport_host.clone(),
                config.transport_port,
                read_timeout,
            )),
            _ => Box::new(TcpTransport::new(
                config.transport_host.clone(),
                config.transport_port,
                connect_timeout,
                read_timeout,
            )),
        };
        Ok(transport)
    }
}
