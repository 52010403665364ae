//! Edge temperature relay
//!
//! Samples the CPU thermal zone on a fixed interval and publishes each
//! reading on the output route, while relaying everything that arrives on
//! the input route to the same output unchanged.
//!
//! Module structure:
//! - `domain/` - Message types and error taxonomy
//! - `io/` - External interfaces (MQTT module client, thermal zone file)
//! - `services/` - Sampler loop and relay handler
//! - `infra/` - Infrastructure (Config, Metrics, embedded Broker)

use clap::Parser;
use edge_temp_relay::infra::{broker, Config, RelayMetrics};
use edge_temp_relay::io::{MessageSink, ModuleClient, ThermalZone};
use edge_temp_relay::services::{PipeHandler, TemperatureSampler};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RELAY_GIT_HASH"), ")");

/// Edge temperature relay - thermal zone sampler and message pass-through
#[derive(Parser, Debug)]
#[command(name = "edge-temp-relay", version = VERSION, about)]
struct Args {
    /// Path to JSON configuration file (falls back to CONFIG_FILE, then config/appsettings.json)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %VERSION, "edge-temp-relay starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref(), |key| std::env::var(key).ok());
    let config = Config::load(&config_path)?;

    info!(
        config_file = %config.config_file(),
        delay_ms = %config.delay_ms(),
        sensor_path = %config.sensor_path(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        topic_prefix = %config.topic_prefix(),
        input = %config.input_name(),
        output = %config.output_name(),
        broker_enabled = %config.broker_enabled(),
        "config_loaded"
    );

    broker::start_embedded_broker(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let metrics = Arc::new(RelayMetrics::new());

    // Outbound client shared by both flows
    let (client, mut dispatcher) = ModuleClient::connect(&config);
    let client = Arc::new(client);

    let handler = Arc::new(PipeHandler::new(config.output_name(), metrics.clone()));
    let context = Arc::downgrade(&client) as Weak<dyn MessageSink>;
    client
        .set_input_message_handler(&mut dispatcher, config.input_name(), handler, context)
        .await?;

    let mut dispatcher_task = tokio::spawn(dispatcher.run(shutdown_rx.clone()));

    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let reporter_metrics = metrics.clone();
        let mut reporter_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => reporter_metrics.report().log(),
                    _ = reporter_shutdown.changed() => return,
                }
            }
        });
    }

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let signal = wait_for_shutdown_signal().await;
        info!(signal, "shutdown_signal_received");
        let _ = signal_tx.send(true);
    });

    let sampler = TemperatureSampler::new(
        Arc::new(ThermalZone::new(config.sensor_path())),
        client.clone(),
        config.output_name(),
        config.delay(),
        metrics.clone(),
    );
    let mut sampler_task = tokio::spawn(sampler.run(shutdown_rx.clone()));

    tokio::select! {
        _ = &mut sampler_task => {
            // Sampler only returns on shutdown; let the dispatcher observe it too
            let _ = dispatcher_task.await;
        }
        result = &mut dispatcher_task => {
            let _ = shutdown_tx.send(true);
            let _ = sampler_task.await;
            match result {
                Ok(Ok(stats)) => info!(?stats, "dispatcher_stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "relay_fatal");
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    metrics.report().log();
    info!("edge-temp-relay shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM where the platform has it
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "sigterm_handler_failed");
            tokio::signal::ctrl_c().await.ok();
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> &'static str {
    tokio::signal::ctrl_c().await.ok();
    "ctrl_c"
}
