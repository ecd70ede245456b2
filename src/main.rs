//! intel - multi-chain trading intelligence
//!
//! Reconstructs wallet trades from raw transfers, ranks token holders by PNL,
//! intersects holder sets across tokens and scores token deployers.
//! All results are printed to stdout as JSON; logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use chain_intel::cli::commands;
use chain_intel::config::Config;

/// Exit code for rejected input, distinct from upstream/runtime failures
const EXIT_INVALID_INPUT: i32 = 2;

/// Multi-chain trading intelligence
#[derive(Parser)]
#[command(name = "intel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "intel.toml", env = "INTEL_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata, price and lifecycle status of a token
    Token {
        /// Token as <chain>:<address>
        token: String,
    },

    /// Reconstruct a wallet's buy/sell history for one token
    History {
        /// Token as <chain>:<address>
        token: String,

        /// Wallet address
        wallet: String,
    },

    /// Rank a token's top holders by realized PNL
    TopTraders {
        /// Token as <chain>:<address>
        token: String,

        /// Number of traders to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Find wallets holding two or more of the given tokens
    Common {
        /// Tokens as <chain>:<address> (2 to 10)
        #[arg(required = true, num_args = 1..)]
        tokens: Vec<String>,

        /// Show this wallet's trade history across the tokens instead
        #[arg(long)]
        wallet: Option<String>,
    },

    /// Score a wallet by the outcomes of tokens it deployed
    Deployer {
        /// Chain (solana, ethereum, base, bsc)
        chain: String,

        /// Deployer wallet address
        wallet: String,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing; stdout is reserved for JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chain_intel=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Token { token } => commands::token(&config, &token).await,
        Commands::History { token, wallet } => commands::history(&config, &token, &wallet).await,
        Commands::TopTraders { token, limit } => {
            commands::top_traders(&config, &token, limit).await
        }
        Commands::Common { tokens, wallet } => {
            commands::common(&config, &tokens, wallet.as_deref()).await
        }
        Commands::Deployer { chain, wallet } => commands::deployer(&config, &chain, &wallet).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        let invalid_input = e
            .downcast_ref::<chain_intel::Error>()
            .is_some_and(chain_intel::Error::is_validation);
        if invalid_input {
            error!("Invalid input: {}", e);
            std::process::exit(EXIT_INVALID_INPUT);
        }
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
