//! Argument parsing: a top-level `Cli` struct with a `#[command(subcommand)]`
//! field, split from the `Subcommand` enum it dispatches on.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "execd", version, about = "WebSocket-fronted process execution service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the WebSocket server. Also the default when no subcommand is given.
    Serve {
        /// Override the configured bind address (host:port).
        #[arg(long)]
        bind: Option<String>,
        /// Path to config.toml; defaults to the platform config directory.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Config file inspection.
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Load and validate the config file, printing a summary, then exit.
    Validate {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
