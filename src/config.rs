#![cfg(feature = "web")]

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Project ledger web server
#[derive(Clone, Debug, Parser)]
#[command(name = "ledger-server", version, about)]
pub struct ServerConfig {
    /// Store file (gzip-compressed JSON), created on first write
    #[arg(long, env = "LEDGER_DATA", default_value = "database/ledger.json.gz")]
    pub data: PathBuf,

    /// Address to listen on
    #[arg(long, env = "LEDGER_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// JSON list of employee IDs allowed to register
    #[arg(long, env = "LEDGER_ROSTER", default_value = "database/employees.json")]
    pub roster: PathBuf,
}
