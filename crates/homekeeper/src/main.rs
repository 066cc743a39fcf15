use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use homekeeper::Config;
use homekeeper::DeviceStore;
use homekeeper::Engine;
use homekeeper::JsonFileStore;
use homekeeper::Scheduler;
use homekeeper::integrations::mqtt::MqttTransport;
use homekeeper::integrations::mqtt::RumqttcClient;
use homekeeper::integrations::ping::PingProbe;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Presence and daylight driven home automation daemon
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "homekeeper.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    // RUST_LOG wins over the config file when set.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.directives()))
        .context("invalid logging configuration")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("homekeeper starting");
    info!("Loaded config from: {}", args.config.display());
    info!(
        "Location: {}, {}",
        config.location.latitude, config.location.longitude
    );

    let store = Arc::new(
        JsonFileStore::open(&config.store.path)
            .await
            .with_context(|| format!("failed to open store {}", config.store.path.display()))?,
    );

    let (transport, inbound) =
        MqttTransport::connect(RumqttcClient::new(&config.mqtt), config.notify)
            .await
            .context("failed to connect to MQTT broker")?;

    let devices = store
        .get_devices()
        .await
        .context("failed to read devices")?;
    transport
        .subscribe(devices.iter().map(|d| d.name.as_str()))
        .await
        .context("failed to subscribe to MQTT topics")?;
    info!("Managing {} devices", devices.len());

    let engine = Arc::new(Engine::new(
        store,
        Arc::new(transport),
        Arc::new(PingProbe::default()),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(
        engine.clone(),
        config.location.into(),
        &config.scheduler,
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));
    let router_task = tokio::spawn(MqttTransport::<RumqttcClient>::route_messages(
        engine,
        inbound,
        shutdown_rx,
    ));

    info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    // Receivers may already be gone if both tasks ended on their own.
    let _ = shutdown_tx.send(true);
    for (name, task) in [("scheduler", scheduler_task), ("router", router_task)] {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("homekeeper shutdown complete");

    Ok(())
}
