//! Shearbook operator commands.
//!
//! The scheduled passes (slot generation, completion sweep, slot expiry) and
//! operator tasks (migrate, seed, audit) are invoked from here, typically by
//! cron or by hand:
//!
//! ```bash
//! shearbook migrate
//! shearbook seed
//! shearbook generate-slots --horizon 14
//! shearbook completion-sweep
//! shearbook expire-slots
//! shearbook audit
//! ```

mod config;
mod seed;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shearbook_core::engine::BookingEngine;
use shearbook_core::environment::SystemClock;
use shearbook_postgres::PostgresStore;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "shearbook", version, about = "Barbershop booking engine operator commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema (safe to re-run)
    Migrate,
    /// Load a starter service catalog and opening hours
    Seed,
    /// Generate 15-minute slots for the rolling horizon
    GenerateSlots {
        /// Number of future days to cover (default from SLOT_HORIZON_DAYS)
        #[arg(long)]
        horizon: Option<u32>,
    },
    /// Mark confirmed bookings whose end time has passed as completed
    CompletionSweep {
        /// Maximum bookings checked in this pass
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Mark past, never-used slots as expired
    ExpireSlots {
        /// Maximum slots expired in this pass
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Check slot and booking integrity (read-only)
    Audit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shearbook=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let store = PostgresStore::connect(&config.database_url).await?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await?;
            println!("schema is up to date");
        }
        Commands::Seed => {
            seed::run(&store).await?;
            println!("seeded starter services and opening hours");
        }
        Commands::GenerateSlots { horizon } => {
            let engine = engine(store);
            let created = engine
                .generate_slots(horizon.unwrap_or(config.horizon_days))
                .await?;
            println!("created {created} new slot(s)");
        }
        Commands::CompletionSweep { limit } => {
            let engine = engine(store);
            let updated = engine
                .run_completion_sweep(limit.unwrap_or(config.sweep_limit))
                .await?;
            println!("completed {updated} booking(s)");
        }
        Commands::ExpireSlots { limit } => {
            let engine = engine(store);
            let expired = engine
                .expire_past_slots(limit.unwrap_or(config.sweep_limit))
                .await?;
            println!("expired {expired} slot(s)");
        }
        Commands::Audit => {
            let engine = engine(store);
            let report = engine.audit_integrity().await?;
            println!("{report}");
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn engine(store: PostgresStore) -> BookingEngine {
    BookingEngine::new(Arc::new(store), Arc::new(SystemClock))
}
