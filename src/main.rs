//! domainwatch - certificate and domain registration expiry monitor.

use anyhow::{Context, Result};
use clap::Parser;
use domainwatch::{
    app::App,
    cli::{Cli, Command},
    config::{Config, StoreBackend},
    domain_name,
    probe::Prober,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).context("Failed to load configuration")?;

    // RUST_LOG, when set, takes precedence over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.core.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command() {
        Command::Serve => serve(config).await,
        Command::RunOnce => run_once(config).await,
        Command::Check { domain } => check(config, &domain).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("domainwatch starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.core.log_level);
    info!("Listen Address: {}", config.server.listen_address);
    info!("Batch Concurrency: {}", config.batch.concurrency);
    match config.batch.interval_seconds {
        Some(seconds) => info!("Batch Interval: {}s", seconds),
        None => info!("Batch Interval: none (external trigger only)"),
    }
    info!("Email: {}", if config.email.smtp.is_some() { "smtp" } else { "log only" });
    match config.store.backend {
        StoreBackend::Sqlite => info!("Store: sqlite ({})", config.store.database_path.display()),
        StoreBackend::Memory => info!("Store: memory"),
    }
    info!("Metrics Enabled: {}", config.metrics.enabled);
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Ctrl-C received, initiating shutdown.");
        let _ = shutdown_tx.send(true);
    });

    let app = App::builder(config).build(shutdown_rx).await?;
    app.run().await
}

async fn run_once(config: Config) -> Result<()> {
    let summary = App::builder(config).run_once().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn check(config: Config, domain: &str) -> Result<()> {
    let name = domain_name::parse(domain)?;
    let prober = Prober::from_config(&config.probe)?;
    let report = prober.probe(&name).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
