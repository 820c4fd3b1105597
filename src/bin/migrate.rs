use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use motor_migrate::assets::{HttpAssetIngester, RetryPolicy};
use motor_migrate::document::{CategoryConfig, OLD_MOTORS, REFURBISHED_MOTORS};
use motor_migrate::logging::init_tracing;
use motor_migrate::migrate::{load_records, Migrator};
use motor_migrate::store::{SanityClient, SanityConfig};
use motor_migrate::util::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "migrate", version, about = "Legacy motor catalog migration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Migrate the refurbished-engine export into the content store
    RefurbishedMotors {
        /// Path to the legacy JSON export
        #[arg(long, default_value = "prod.Motor.json")]
        file: PathBuf,
        /// Delay between created records, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Maximum number of records to process (default: all)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Migrate the old/used-engine export into the content store
    OldMotors {
        /// Path to the legacy JSON export
        #[arg(long, default_value = "prod.OldMotor.json")]
        file: PathBuf,
        /// Delay between created records, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Maximum number of records to process (default: all)
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing("info,motor_migrate=info")?;

    let cli = Cli::parse();
    let (category, file, delay_ms, limit) = match cli.command {
        Commands::RefurbishedMotors {
            file,
            delay_ms,
            limit,
        } => (REFURBISHED_MOTORS, file, delay_ms, limit),
        Commands::OldMotors {
            file,
            delay_ms,
            limit,
        } => (OLD_MOTORS, file, delay_ms, limit),
    };

    run_migration(category, &file, delay_ms, limit).await
}

async fn run_migration(
    category: CategoryConfig,
    file: &PathBuf,
    delay_ms: Option<u64>,
    limit: Option<usize>,
) -> Result<()> {
    let mut records = load_records(file)?;
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    println!(
        "migrating {} {} record(s) from {}",
        records.len(),
        category.label,
        file.display()
    );

    let cfg = SanityConfig::from_env().context("content store configuration")?;
    let client = SanityClient::new(cfg)?;
    let ingester = HttpAssetIngester::new(client.http().clone(), &client, RetryPolicy::from_env());

    let mut migrator = Migrator::new(&client, &ingester, category);
    if let Some(ms) = delay_ms {
        migrator = migrator.with_pacing(Duration::from_millis(ms));
    }

    let summary = migrator.run(&records).await;
    println!(
        "migration finished: total={} created={} skipped={} failed={}",
        summary.total, summary.created, summary.skipped, summary.failed
    );
    // Per-record failures are already logged and counted; only a setup
    // failure earlier in this function exits non-zero.
    Ok(())
}
