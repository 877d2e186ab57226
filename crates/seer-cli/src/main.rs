mod config;

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use seer_core::report::Generator;
use seer_storage::StoredOpportunity;
use seer_sync::{Manager, WebhookAlerts};
use seer_web::AppState;
use sqlx::SqlitePool;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "seer")]
#[command(about = "Self-hosted opportunity detection for indie developers")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the API server and the fetch scheduler (default).
    Serve,
    /// Run one fetch cycle over all enabled sources and exit.
    Fetch,
    /// Print the human-readable digest for the last N days.
    Report {
        #[arg(long, default_value_t = 1)]
        days: i64,
    },
    /// Apply pending database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Fetch => fetch_once(config).await,
        Commands::Report { days } => report(config, days).await,
        Commands::Migrate => {
            open_database(&config).await?;
            println!("migrations applied");
            Ok(())
        }
    }
}

async fn open_database(config: &Config) -> Result<SqlitePool> {
    let pool = seer_storage::connect(&config.database.path).await?;
    seer_storage::migrate(&pool).await?;
    Ok(pool)
}

fn build_manager(pool: SqlitePool, config: &Config) -> Manager {
    let mut manager = Manager::new(pool, config.sources.fetch_interval_minutes);
    if let Some(url) = &config.alerts.webhook_url {
        manager = manager.with_alerts(
            Arc::new(WebhookAlerts::new(url.clone())),
            config.alerts.min_score,
        );
    }
    manager
}

async fn serve(config: Config) -> Result<()> {
    info!(address = %config.address(), "starting seer");

    let pool = open_database(&config).await?;
    let manager = Arc::new(build_manager(pool.clone(), &config));
    Arc::clone(&manager).start().await?;

    let state = AppState::new(pool, Arc::clone(&manager));
    tokio::select! {
        result = seer_web::serve(state, &config.server.host, config.server.port) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    manager.stop().await;
    Ok(())
}

async fn fetch_once(config: Config) -> Result<()> {
    let pool = open_database(&config).await?;
    let manager = Arc::new(build_manager(pool, &config));
    manager.repository().seed().await?;

    let summary = manager.fetch_all().await?;
    println!(
        "fetch complete: run_id={} sources={} stored={} errors={}",
        summary.run_id,
        summary.sources,
        summary.stored,
        summary.errors.len()
    );
    for error in &summary.errors {
        println!("  - {error}");
    }
    Ok(())
}

async fn report(config: Config, days: i64) -> Result<()> {
    let pool = open_database(&config).await?;
    let store = seer_storage::OpportunityStore::new(pool);

    let period_end = Utc::now();
    let period_start = period_end - Duration::days(days.max(1));
    let rows = store.range(period_start, period_end).await?;
    let items: Vec<_> = rows.iter().map(StoredOpportunity::to_report_item).collect();

    let report = Generator::new().generate(&items, period_start, period_end);
    println!("{}", report.content_human);
    Ok(())
}
