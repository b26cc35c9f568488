// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gemini-relay",
    version,
    about = "Resilient chat relay for the Google Gemini API with key rotation and request throttling"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "GEMINI_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server bind address (overrides the config file)
    #[arg(long, env = "GEMINI_RELAY_HOST")]
    pub host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(short, long, env = "GEMINI_RELAY_PORT")]
    pub port: Option<u16>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "GEMINI_RELAY_JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
