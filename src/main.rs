use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, LevelFilter};
use std::path::PathBuf;

use docstore_bootstrap::config::{Config, DEFAULT_CONFIG_PATH};
use docstore_bootstrap::database::MongoDbService;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "info")]
    log_level: String,

    /// TOML configuration file; environment variables are used when it is missing
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, select the active database and ensure indexes (default)
    Bootstrap,
    /// Like `bootstrap`, but exit non-zero if any index could not be ensured
    EnsureIndexes,
    /// Print whether a database exists on the server
    Exists { name: String },
    /// Drop the configured test database
    DropTestDb,
    /// Print the resolved configuration with secrets masked
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse command line arguments and setup logging
    let args = Args::parse();
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level.to_string())).init();

    // 2. Load configuration
    let config = Config::load(&args.config).context("Failed to load configuration")?;

    let command = args.command.unwrap_or(Command::Bootstrap);
    if let Command::ShowConfig = command {
        print!("{}", toml::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    // 3. Connect; construction failures abort here
    info!("Starting database bootstrap...");
    let service = MongoDbService::from_config(&config)
        .await
        .context("Failed to initialize database service")?;

    let strict = matches!(command, Command::EnsureIndexes);
    match command {
        Command::Bootstrap | Command::EnsureIndexes => {
            let report = service.ensure_indices().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
                for failed in &report.failures {
                    println!("  {} {}: {}", failed.collection, failed.keys, failed.failure);
                }
            }

            if strict && !report.failures.is_empty() {
                bail!("{} index(es) could not be ensured", report.failures.len());
            }
        }
        Command::Exists { name } => {
            let exists = service.database_exists(&name).await?;
            println!("{}", exists);
        }
        Command::DropTestDb => {
            service.drop_test_database().await?;
            println!("Dropped {}", config.database.test_database);
        }
        Command::ShowConfig => {}
    }

    Ok(())
}
