// CLI surface: argument parsing and the `serve` entry point.

use clap::{Parser, Subcommand};

pub mod serve;

pub use serve::run;

#[derive(Parser)]
#[command(name = "mcpman")]
#[command(about = "Multiplexing proxy for the Model Context Protocol")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the settings directory (defaults to $MCP_CONFIG_DIR or ~/.mcpman).
    #[arg(long, global = true, env = "MCP_CONFIG_DIR")]
    pub config: Option<std::path::PathBuf>,

    /// Override the configured logging level.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as an MCP server over stdio (default).
    Serve,
}
