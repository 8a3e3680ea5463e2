//! Alert bridge CLI
//!
//! Inspects a running bridge and triggers manual poll cycles and
//! connectivity checks through its HTTP API.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{status, trigger};

/// Alert bridge CLI
#[derive(Parser)]
#[command(name = "bridgectl")]
#[command(author, version, about = "CLI for the monitoring alert bridge", long_about = None)]
pub struct Cli {
    /// Bridge API URL (can also be set via BRIDGE_API_URL env var)
    #[arg(long, env = "BRIDGE_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show session, poller and dedup cache status
    Status,

    /// Show component health and readiness
    Health,

    /// Run a poll cycle immediately
    Poll,

    /// Re-authenticate against the monitoring API and count alerts
    TestConnection,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        output::print_info(&format!("Using bridge API at {}", cli.api_url));
    }

    let client = client::ApiClient::new(&cli.api_url)?;

    let result = match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await,
        Commands::Health => status::show_health(&client, cli.format).await,
        Commands::Poll => trigger::force_poll(&client, cli.format).await,
        Commands::TestConnection => trigger::test_connection(&client, cli.format).await,
    };

    if let Err(e) = &result {
        if cli.verbose {
            output::print_error(&format!("{:#}", e));
        }
    }
    result
}
