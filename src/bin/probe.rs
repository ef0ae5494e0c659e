//! Pushes readings from a Linux thermal zone to the monitor service.
//!
//! Configured from the environment (`PROBE_BACKEND_URL` is required); see
//! `push_monitor::config::ProbeConfig`.

use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use push_monitor::{
    config::ProbeConfig,
    probe::{client::ProbeClient, reader::ThermalZoneReader, Probe, ProbeState},
    shutdown,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = ProbeConfig::from_env()?;
    info!(
        backend = %config.backend_url,
        sensor = %config.sensor_id,
        "Starting probe"
    );

    let probe = Probe::new(
        ThermalZoneReader::new(&config.thermal_zone, &config.sensor_id),
        ProbeClient::new(&config.backend_url)?,
        ProbeState::new(config.dip_threshold, config.max_pending),
        Duration::from_secs(config.sample_secs),
        Duration::from_secs(config.upload_secs),
    );

    let state = probe.run(shutdown::signal()).await;

    if let Some(stats) = state.stats(&format!("{}_temp", config.sensor_id)) {
        info!(
            last = ?stats.last().map(|s| s.value),
            min = ?stats.min().map(|s| s.value),
            max = ?stats.max().map(|s| s.value),
            dipped_at = ?stats.dipped().map(|s| s.timestamp),
            threshold = stats.threshold(),
            "Final statistics"
        );
    }
    Ok(())
}
