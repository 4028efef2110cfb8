//! Trade analysis reports
//!
//! Offline, read-only ML reports over the weather-market trading database.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tradescope::config::AppConfig;
use tradescope::report;

#[derive(Parser)]
#[command(name = "tradescope")]
#[command(about = "Offline ML reports over the weather-market trading database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Train and evaluate the opportunity win predictor
    Win,
    /// Analyze exit windows on losing trades
    PeakExit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Win => report::win::run(&config).await?,
        Commands::PeakExit => report::peak_exit::run(&config).await?,
    }

    Ok(())
}
