//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::core::settings::default_config_path;
use commands::Commands;

/// repowright - Periodic clean-chroot builder for pacman repositories
///
/// Rebuilds configured packages on a schedule and publishes them into a
/// repository database.
#[derive(Parser, Debug)]
#[command(name = "repowright")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored log output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file
    #[arg(short, long, global = true, env = "REPOWRIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Config file to load
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    /// Default log filter for the verbosity level
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "repowright=info",
            1 => "repowright=debug",
            _ => "repowright=trace",
        }
    }

    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let config = self.config_path();
        self.command.run(&config).await
    }
}
