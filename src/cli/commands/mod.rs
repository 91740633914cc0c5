//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod check;
pub mod forget;
pub mod once;
pub mod run;
pub mod status;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;
use std::sync::Arc;

use crate::core::cache::{IdempotencyCache, MarkerStore};
use crate::core::settings::Settings;
use crate::infra::dirs::WorkDirs;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run as a daemon, rebuilding packages on the configured schedule
    Run {
        /// Do not build anything at startup
        #[arg(short, long)]
        skip_initial_build: bool,
    },

    /// Run one pass now and exit
    Once {
        /// Packages to build (all if not specified)
        targets: Vec<String>,
    },

    /// Validate the config and check host dependencies
    Check,

    /// Show the last build state of every package
    Status {
        /// Output in JSON format for scripting
        #[arg(long)]
        json: bool,
    },

    /// Forget the last build of packages so the next pass rebuilds them
    Forget {
        /// Packages to forget
        #[arg(required = true)]
        targets: Vec<String>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, config: &Path) -> Result<()> {
        match self {
            Commands::Run { skip_initial_build } => run::execute(config, skip_initial_build).await,
            Commands::Once { targets } => once::execute(config, &targets).await,
            Commands::Check => check::execute(config),
            Commands::Status { json } => status::execute(config, json),
            Commands::Forget { targets } => forget::execute(config, &targets),
        }
    }
}

/// Load settings, naming the file in the error
pub(crate) fn load_settings(config: &Path) -> Result<Settings> {
    Settings::load(config).with_context(|| format!("Failed to load config {}", config.display()))
}

/// Marker-backed cache for the configured working directory
pub(crate) fn marker_cache(settings: &Settings) -> IdempotencyCache {
    let dirs = WorkDirs::new(&settings.working_dir);
    IdempotencyCache::new(Arc::new(MarkerStore::new(dirs.clone())), dirs)
}
