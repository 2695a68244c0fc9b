//! Recorder Application
//!
//! Loads the device list and records every device until killed.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_recorder::{
    config::AppConfig,
    merge::{ContainerMerger, TranscoderLocator},
    network::StreamDemuxer,
    recording::Recorder,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    tracing::info!(
        "Starting live recorder: {} device(s), storage at {}",
        config.devices.len(),
        config.storage_root.display()
    );

    // One locator for all workers so a bundled transcoder is written once
    let merger = ContainerMerger::new(Arc::new(TranscoderLocator::new()));

    let mut workers = JoinSet::new();
    for device in config.device_configs() {
        let span = tracing::info_span!("device", name = %device.name);
        let recorder = Recorder::new(device.clone(), StreamDemuxer::new(&device), merger.clone());
        workers.spawn(recorder.run().instrument(span));
    }

    // Workers only return on a fatal persistence error
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("Recorder stopped: {}", e);
                return Err(e.into());
            }
            Err(e) => return Err(e).context("recorder task panicked"),
        }
    }

    Ok(())
}
