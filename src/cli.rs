//! Command-line interface

use clap::Parser;
use std::path::PathBuf;

/// Real-time conversational relay for paced AI responses
#[derive(Debug, Parser)]
#[command(name = "chatrelay", version, about)]
pub struct Cli {
    /// Path to a YAML config file (defaults to ./chatrelay.yml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
