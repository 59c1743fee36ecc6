//! Volume Session Engine CLI
//!
//! # WARNING
//! - Synthetic volume generation may violate the terms of the venue you
//!   point it at. The simulated backends carry no such risk; the
//!   aggregator backend trades with real funds.
//! - Only use funds you can afford to lose.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use volume_runner::cli::commands::{self, RunOverrides};
use volume_runner::config::Config;

/// Synthetic trading-volume session runner
#[derive(Parser)]
#[command(name = "volrun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one volume session to completion
    Run {
        /// Override the configured volume target, in SOL
        #[arg(long)]
        target_volume: Option<f64>,

        /// Override the configured wallet count
        #[arg(long)]
        wallets: Option<usize>,

        /// Override the configured duration, in minutes
        #[arg(long)]
        duration: Option<u64>,

        /// Seed the decision rng for a reproducible session
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Fetch a quote from the configured settlement backend
    Quote {
        /// buy or sell
        side: String,

        /// SOL for buys, tokens for sells
        amount: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("volume_runner=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            target_volume,
            wallets,
            duration,
            seed,
        } => {
            commands::run(
                &config,
                RunOverrides {
                    target_volume,
                    wallets,
                    duration_minutes: duration,
                    seed,
                },
            )
            .await
        }
        Commands::Config => commands::show_config(&config),
        Commands::Quote { side, amount } => commands::quote(&config, &side, amount).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
