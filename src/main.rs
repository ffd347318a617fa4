//! --- AML Market Entrypoint ---

use aml_market::{
    api,
    config::{Config, ConfigError},
    market::{MarketContext, MarketError},
};
use clap::{Parser, Subcommand};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Error)]
enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Market error: {0}")]
    Market(#[from] MarketError),
    #[error("Invalid API address: {0}")]
    Address(#[from] std::net::AddrParseError),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Server error: {0}")]
    Server(#[from] anyhow::Error),
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Cross-institution AML prediction market demo backend."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API.
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Run one demo market and print the result as JSON.
    Run {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, default_value = "high")]
        scenario: String,
    },
    /// Write a default configuration file.
    InitConfig {
        #[arg(short, long, value_name = "OUTPUT_FILE", default_value = "config.toml")]
        output: PathBuf,
    },
}

fn initialize_logging(level: &str) {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set up logging subscriber.");
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(config).await?,
        Commands::Run { config, scenario } => run_once(config, &scenario).await?,
        Commands::InitConfig { output } => {
            initialize_logging("info");
            Config::default().save(&output.display().to_string())?;
            info!("Default configuration written to '{}'.", output.display());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config, CliError> {
    let config = Config::load(&path.display().to_string())?;
    initialize_logging(&config.logging.level);
    info!("Configuration loaded from '{}'.", path.display());
    Ok(config)
}

async fn serve(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let addr: SocketAddr = config.api_address.parse()?;
    let market = Arc::new(MarketContext::from_config(&config)?);
    info!(
        strategy = market.weight_strategy(),
        participants = market.roster().len(),
        ledger = config.ledger.enabled,
        "AML market backend starting"
    );
    api::serve(addr, market).await?;
    Ok(())
}

async fn run_once(config_path: PathBuf, scenario: &str) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let market = MarketContext::from_config(&config)?;
    let (result, audit) = market.run_demo_with_audit(scenario).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    // A one-shot process would otherwise exit before the write lands.
    if let Some(handle) = audit {
        if let Some(outcome) = handle.outcome().await {
            info!(?outcome, "audit write finished");
        }
    }
    Ok(())
}
