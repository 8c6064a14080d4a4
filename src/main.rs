#![cfg(not(tarpaulin_include))]

use clap::Parser;
use power_ledger::app;
use power_ledger::config::ServerConfig;

/// Main entry point for the ledger web service
///
/// Reads configuration from flags or `LEDGER_*` environment variables,
/// sets up logging (`RUST_LOG`, default `info`) and serves until stopped.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    app::run(config).await
}
