use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use symbol_etl::{
    api::BrsClient,
    data_collector::{DataCollector, RunSummary},
    database::DatabaseManager,
    models::{Config, RunMode},
    scheduler::SectionScheduler,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Daily price and deal history ETL for TSETMC symbols", long_about = None)]
struct Args {
    /// Run mode; overrides ETL_MODE
    #[arg(short, long, value_enum)]
    mode: Option<RunMode>,

    /// Load variables from this file before ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

/// RUST_LOG wins; otherwise LOG_LEVEL sets this crate's level
fn init_logging() {
    let directive = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| std::env::var("LOG_LEVEL").ok().map(|level| format!("symbol_etl={}", level.to_lowercase())))
        .unwrap_or_else(|| "symbol_etl=info".to_string());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("symbol_etl=info"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.env_file {
        if let Err(e) = dotenvy::from_path(path) {
            eprintln!("❌ Could not read env file {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }

    // Reads ./.env too, so LOG_LEVEL from it is visible to the subscriber
    let config = Config::from_env();
    init_logging();

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Some(mode) = args.mode {
        config.run_mode = mode;
    }

    info!("🚀 Starting symbol ETL ({:?} mode)", config.run_mode);
    info!("📅 Period: {}", config.period);

    let database = match DatabaseManager::new(&config.database_path).await {
        Ok(db) => db,
        Err(e) => {
            error!("❌ Failed to open database {}: {:#}", config.database_path, e);
            std::process::exit(1);
        }
    };
    info!("💾 Database ready at {}", config.database_path);

    let client = BrsClient::new(&config)?;
    let collector = DataCollector::new(Arc::new(client), database.clone(), config.clone());

    let result = match config.run_mode {
        RunMode::Full => collector.run_full().await,
        RunMode::Sectioned => {
            let scheduler = SectionScheduler::new(
                Arc::new(database.clone()),
                config.section_size,
                config.total_sections,
            );
            collector.run_sectioned(&scheduler).await
        }
    };

    match result {
        Ok(summary) => {
            log_summary(&summary);
            match database.get_stats().await {
                Ok((symbols, prices, deals)) => {
                    info!("📈 Database totals: {} symbols, {} price rows, {} deal rows", symbols, prices, deals)
                }
                Err(e) => warn!("Could not read database totals: {:#}", e),
            }
            Ok(())
        }
        Err(e) => {
            error!("❌ Run aborted: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn log_summary(summary: &RunSummary) {
    if let Some(plan) = &summary.section {
        info!("🧭 Section {} ({}..={})", plan.section, plan.start_index, plan.end_index);
    }
    info!(
        "🎉 Done: {}/{} symbols processed, {} skipped, {} failed",
        summary.processed_symbols, summary.total_symbols, summary.skipped_symbols, summary.failed_symbols
    );
    info!("📊 Upserted {} price rows and {} deal rows", summary.price_rows, summary.deal_rows);
}
