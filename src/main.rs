//! # Motriz — vehicle maintenance reminder engine
//!
//! Usage:
//!   motriz init                # Write default config, seed maintenance catalog
//!   motriz scan                # Run one scan-then-dispatch pass and exit
//!   motriz run                 # Run the periodic scan-then-dispatch loop
//!   motriz log --limit 20      # Show recent delivery attempts

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use motriz_core::MotrizConfig;
use motriz_core::types::{MaintenanceCategory, MaintenanceType};
use motriz_engine::{ReminderEngine, TemplateRenderer, spawn_engine};
use motriz_store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "motriz",
    version,
    about = "🔧 Motriz — maintenance due detection & reminder dispatch"
)]
struct Cli {
    /// Path to config file (defaults to ~/.motriz/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config and seed the maintenance-type catalog
    Init,
    /// Run one scan-then-dispatch pass and exit
    Scan,
    /// Run the periodic scan-then-dispatch loop
    Run,
    /// Show recent delivery attempts
    Log {
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "motriz=debug"
    } else {
        "motriz=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => MotrizConfig::load_from(std::path::Path::new(path))?,
        None => MotrizConfig::load()?,
    };

    let store = Arc::new(SqliteStore::open(&config.store.resolved_db_path())?);

    match cli.command {
        Command::Init => init(&config, &store),
        Command::Scan => {
            let engine = build_engine(store, &config);
            let summary = engine.run_pass(chrono::Utc::now().date_naive()).await?;
            println!(
                "🔎 {} due, {} sent, {} failed, {} deduped",
                summary.due, summary.sent, summary.failed, summary.deduped
            );
            Ok(())
        }
        Command::Run => {
            let engine = Arc::new(build_engine(store, &config));
            println!("🔧 Motriz v{}", env!("CARGO_PKG_VERSION"));
            println!("   🗄️  Database: {}", config.store.db_path);
            println!("   ⏰ Scan interval: {}s", config.scanner.interval_secs);
            spawn_engine(engine, config.scanner.interval_secs).await;
            Ok(())
        }
        Command::Log { limit } => {
            for entry in store.recent_deliveries(limit)? {
                println!(
                    "{}  {:<9} attempt {}  {:<8} reminder {}",
                    entry.claimed_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.channel.as_str(),
                    entry.attempt,
                    entry.outcome.as_str(),
                    entry.reminder_id,
                );
            }
            Ok(())
        }
    }
}

fn build_engine(store: Arc<SqliteStore>, config: &MotrizConfig) -> ReminderEngine {
    let senders = motriz_channels::senders_from_config(&config.channel);
    if senders.is_empty() {
        tracing::warn!("⚠️ No notification channels configured; dispatch will be a no-op");
    }
    ReminderEngine::new(store, senders, Box::new(TemplateRenderer), config)
}

fn init(config: &MotrizConfig, store: &SqliteStore) -> Result<()> {
    if !MotrizConfig::default_path().exists() {
        config.save()?;
        println!("✅ Config written to {}", MotrizConfig::default_path().display());
    } else {
        println!("⚠️  Config already exists, leaving it untouched");
    }

    for mtype in default_catalog() {
        store.insert_maintenance_type(&mtype)?;
    }
    println!("✅ Maintenance catalog seeded ({} types)", default_catalog().len());
    Ok(())
}

/// Default maintenance-type catalog seeded by `init`.
fn default_catalog() -> Vec<MaintenanceType> {
    let mk = |id: &str, name: &str, km: Option<i64>, days: Option<i64>, category| MaintenanceType {
        id: id.into(),
        name: name.into(),
        interval_km: km,
        interval_days: days,
        category,
    };
    vec![
        mk("oil-change", "Oil change", Some(5_000), Some(180), MaintenanceCategory::Oil),
        mk("oil-filter", "Oil filter", Some(10_000), Some(365), MaintenanceCategory::Filter),
        mk("air-filter", "Air filter", Some(15_000), Some(365), MaintenanceCategory::Filter),
        mk("tire-rotation", "Tire rotation", Some(10_000), Some(180), MaintenanceCategory::Tire),
        mk("brake-pads", "Brake pads", Some(20_000), None, MaintenanceCategory::Brake),
        mk("brake-fluid", "Brake fluid", None, Some(730), MaintenanceCategory::Fluid),
        mk("coolant-flush", "Coolant flush", Some(30_000), Some(730), MaintenanceCategory::Fluid),
        mk("annual-inspection", "Annual inspection", None, Some(365), MaintenanceCategory::Inspection),
    ]
}
