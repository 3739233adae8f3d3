use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use price_refresher::config::AppConfig;
use price_refresher::{reconciler, server};
use reqwest::Client;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "price-refresher")]
#[command(about = "Refreshes current prices on the latest stock-screening snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP trigger endpoint
    Serve,
    /// Run a single reconciliation pass and print the summary
    RunOnce,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    let http = Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to construct HTTP client")?;

    match cli.command {
        Commands::Serve => server::serve(config, http).await?,
        Commands::RunOnce => {
            let summary = reconciler::execute(&config, &http).await?;
            println!("{}", summary.to_text());
        }
    }

    Ok(())
}
