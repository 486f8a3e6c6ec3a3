#![allow(clippy::result_large_err)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use salon_ledger::{
    Ledger, Result,
    config::{database, settings},
    core::{cycle, dates, migration, stats},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Cycle-based service and product ledger for salons.
#[derive(Debug, Parser)]
#[command(name = "salon-ledger", version, about)]
struct Cli {
    /// Database URL, overrides `DATABASE_URL`
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Re-file every record into the cycle matching its date
    Migrate {
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Directory for the pre-migration snapshot
        #[arg(long)]
        backup_dir: Option<PathBuf>,
    },
    /// Print statistics for a cycle
    Stats {
        /// Cycle id
        cycle_id: i64,
        /// Restrict to one stylist
        #[arg(long)]
        user: Option<String>,
    },
    /// List cycles, or only those containing a date (YYYY-MM-DD)
    Cycles {
        #[arg(long)]
        date: Option<String>,
    },
    /// List pairs of cycles whose date ranges overlap
    Overlaps,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal
    dotenv().ok();

    let cli = Cli::parse();

    // 3. Load settings and open the database
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load configuration: {e}"))?;

    let database_url = cli.database_url.unwrap_or_else(database::get_database_url);
    if database_url == database::DEFAULT_DATABASE_URL {
        std::fs::create_dir_all("data")?;
    }
    let db = database::create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    database::create_tables(&db).await?;
    info!("Database ready");

    let ledger = Ledger::with_settings(db, &settings);

    match cli.command {
        Command::Migrate {
            dry_run,
            backup_dir,
        } => {
            let mut options = migration::MigrationOptions::from_settings(&settings.migration);
            options.dry_run = dry_run;
            if backup_dir.is_some() {
                options.backup_dir = backup_dir;
            }
            let report = ledger.run_cycle_migration(&options).await?;
            println!("{}", migration::format_migration_summary(&report));
        }
        Command::Stats { cycle_id, user } => {
            let report = ledger.get_stats(cycle_id, user.as_deref()).await?;
            println!("{}", stats::format_stats_report(&report));
        }
        Command::Cycles { date } => {
            let cycles = match date {
                Some(raw) => {
                    let date = dates::parse_calendar_date(&raw)?;
                    ledger.find_cycles_containing(date).await?
                }
                None => cycle::list_cycles(ledger.db()).await?,
            };
            if cycles.is_empty() {
                println!("No cycles found.");
            }
            for c in cycles {
                println!(
                    "#{} {} ({} to {})",
                    c.id,
                    c.name,
                    dates::format_date(c.start_date),
                    dates::format_date(c.end_date)
                );
            }
        }
        Command::Overlaps => {
            let pairs = cycle::overlapping_pairs(ledger.db()).await?;
            if pairs.is_empty() {
                println!("No overlapping cycles.");
            }
            for (a, b) in pairs {
                println!(
                    "#{} {} ({} to {}) overlaps #{} {} ({} to {})",
                    a.id,
                    a.name,
                    a.start_date,
                    a.end_date,
                    b.id,
                    b.name,
                    b.start_date,
                    b.end_date
                );
            }
        }
    }

    Ok(())
}
