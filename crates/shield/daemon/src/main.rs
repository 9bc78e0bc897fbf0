//! Guardian Shield Daemon
//!
//! Hosts the periodic side of Guardian Shield:
//! - evaluates every enabled shield and starts activations when warranted
//! - escalates unanswered activations and expires stale ones

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shield_activity::ActivityTracker;
use shield_notifier::{GuardianNotifier, LoggingChannel};
use shield_service::EmergencyService;
use shield_storage::ShieldStorage;
use shield_types::{Clock, DeliveryMethod, SystemClock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod scheduler;
mod sources;

use config::{DaemonConfig, StorageConfig};
use scheduler::Scheduler;
use sources::HealthCheckActivitySource;

/// Guardian Shield daemon CLI
#[derive(Parser)]
#[command(name = "shieldd")]
#[command(
    about = "Guardian Shield daemon - emergency monitoring and escalation",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SHIELD_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "SHIELD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SHIELD_LOG_JSON")]
    json: bool,

    /// Run one monitoring pass and one escalation sweep, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = DaemonConfig::load(cli.config.as_deref()).context("loading configuration")?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let storage = build_storage(&config.storage).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tracker = Arc::new(
        ActivityTracker::new(storage.clone(), clock.clone())
            .with_source(Arc::new(HealthCheckActivitySource::new(storage.clone()))),
    );

    // No transport is wired in here; deliveries are written to the log.
    let notifier = Arc::new(
        GuardianNotifier::new(config.notifier.clone())
            .with_channel(Arc::new(LoggingChannel::new(DeliveryMethod::Email)))
            .with_channel(Arc::new(LoggingChannel::new(DeliveryMethod::Sms)))
            .with_channel(Arc::new(LoggingChannel::new(DeliveryMethod::Push))),
    );

    let service = Arc::new(EmergencyService::new(
        storage.clone(),
        clock.clone(),
        tracker,
        notifier,
        config.emergency.clone(),
    ));

    let scheduler = Scheduler::new(config.scheduler.clone(), storage, service, clock);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = storage_kind(&config.storage),
        "shieldd starting"
    );

    if cli.once {
        scheduler.monitor_all().await;
        scheduler.escalate().await;
        return Ok(());
    }

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;
    Ok(())
}

fn storage_kind(config: &StorageConfig) -> &'static str {
    match config {
        StorageConfig::Memory => "memory",
        StorageConfig::Postgres { .. } => "postgres",
    }
}

async fn build_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn ShieldStorage>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(shield_storage::memory::InMemoryShieldStorage::new())),
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let store = shield_storage::postgres::PostgresShieldStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await
            .context("connecting to postgres")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => {
            anyhow::bail!("postgres storage requires building shieldd with the `postgres` feature")
        }
    }
}
