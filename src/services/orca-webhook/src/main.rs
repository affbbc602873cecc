//! Main binary entry point for the Orca webhook relay
//!
//! Serves the receiver route and, optionally, sends the example row to Orca
//! before listening.

use anyhow::{anyhow, Context};
use clap::Parser;
use orca_webhook::{NoopHandler, OrcaConfig, OrcaWebhookService};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Orca webhook relay
#[derive(Debug, Parser)]
#[command(name = "orca-webhook-server", version, about)]
struct Cli {
    /// Config file (any format the config crate understands)
    #[arg(long, env = "ORCA_CONFIG_FILE")]
    config: Option<String>,

    /// Send the example row to the configured Orca URL before serving
    #[arg(long)]
    fire_add_row: bool,

    /// Override the listening port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config =
        OrcaConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.fire_add_row {
        config.sender.fire_on_startup = true;
    }

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!(
        "Starting Orca webhook relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

    log_configuration(&config);

    let service = OrcaWebhookService::new(config, Arc::new(NoopHandler))?;
    service.start().await?;

    info!("Orca webhook relay shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .or_else(|_| EnvFilter::try_new("info"))?;

    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        "pretty" | "text" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false),
            )
            .try_init()?,
        _ => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()?,
    }

    Ok(())
}

fn log_configuration(config: &OrcaConfig) {
    info!(
        path = %config.receiver.path,
        decode_mode = ?config.receiver.decode_mode,
        decode_error_status = config.receiver.decode_error_status,
        max_body_size = config.receiver.max_body_size,
        "Receiver configured"
    );

    if config.sender.trigger_enabled {
        info!(
            path = %config.sender.trigger_path,
            target = %config.sender.target_url,
            "Sender trigger route enabled"
        );
    }

    if config.observability.metrics_enabled {
        info!("Metrics collection enabled at {}", config.observability.metrics_path);
    }
}
