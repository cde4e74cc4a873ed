//! PLC Telemetry Agent (`plcsrv`)
//!
//! Binary entry point: resolves settings and device identity, spawns the
//! polling scheduler and the health API, then waits for a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use plcsrv::api::{self, ApiState};
use plcsrv::core::config::provider::ConfigProvider;
use plcsrv::core::sink::TelemetrySink;
use plcsrv::core::transport::NetTransportFactory;
use plcsrv::{AgentSettings, IdentityResolver, PollingScheduler};

#[derive(Parser, Debug)]
#[command(name = "plcsrv", about = "Edge telemetry agent polling programmable controllers")]
struct Args {
    /// Optional YAML settings file (env vars still take precedence)
    #[arg(long, env = "PLCSRV_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Resolve settings and identity, print them, then exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = AgentSettings::load(args.config.as_deref())?;
    common::logging::init(&settings.log_level);

    info!("plcsrv starting");
    let identity = IdentityResolver::new().resolve();
    info!(
        "Device identity: serial={} mac={} ip={} host={}",
        identity.hardware_serial, identity.mac_address, identity.ip_address, identity.hostname
    );

    if args.validate {
        info!(
            "Configuration source: {}, sink: {}, interval default: {} ms",
            settings.config_source_url, settings.sink_url, settings.interval_ms
        );
        info!("Validation completed successfully");
        return Ok(());
    }

    let provider = Arc::new(ConfigProvider::new(&settings)?);
    let sink = Arc::new(TelemetrySink::new(settings.sink_url.clone())?);

    let scheduler = PollingScheduler::new(
        identity.clone(),
        settings.clone(),
        provider,
        sink,
        Arc::new(NetTransportFactory),
    );

    let api_state = ApiState {
        identity,
        stats: scheduler.stats(),
        state: scheduler.state_cell(),
        equipment_id: scheduler.equipment_id(),
    };
    let api_token = scheduler.cancellation_token();
    let api_bind = settings.api_bind.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(&api_bind, api_state, api_token).await {
            error!("Health API terminated: {}", e);
        }
    });

    let handle = scheduler.spawn();

    common::shutdown::wait_for_shutdown().await;
    info!("Shutdown signal received, stopping scheduler");

    if handle.stop(Duration::from_secs(5)).await {
        info!("Scheduler stopped cleanly");
    } else {
        warn!("Scheduler did not stop within the grace period, task aborted");
    }
    Ok(())
}
