//! Pump Cycler - resumable multi-account swap cycles
//!
//! # WARNING
//! - Every non dry-run cycle trades with real money.
//! - Participant keys are only as safe as CYCLER_KEYSTORE__SECRET.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use pump_cycler::cli::commands;
use pump_cycler::config::{Config, DEFAULT_CONFIG_FILE};

/// Pump Cycler - multi-account pump/dump cycles
#[derive(Parser)]
#[command(name = "cycle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "CYCLER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or import participant and mint keypairs
    Provision {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,

        /// Record the liquidity pool id
        #[arg(long)]
        pool_id: Option<String>,

        /// Record the LP token mint
        #[arg(long)]
        lp_mint: Option<String>,
    },

    /// Show or generate participant shares
    Shares {
        /// Regenerate even if shares are already persisted
        #[arg(long)]
        force: bool,

        /// Print without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Run pump/dump cycles, resuming from the last checkpoint
    Run {
        /// Number of cycles (default: cycle.count from config)
        #[arg(short = 'n', long)]
        cycles: Option<u32>,

        /// Simulate swaps and do not save progress
        #[arg(long)]
        dry_run: bool,
    },

    /// Show checkpoint and provisioning state
    Status,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pump_cycler=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Provision {
            force,
            pool_id,
            lp_mint,
        } => commands::provision(&config, force, pool_id, lp_mint),
        Commands::Shares { force, dry_run } => commands::shares(&config, force, dry_run),
        Commands::Run { cycles, dry_run } => commands::run(&config, cycles, dry_run).await,
        Commands::Status => commands::status(&config),
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
