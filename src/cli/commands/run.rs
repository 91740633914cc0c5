//! CLI command for `repowright run`
//!
//! Runs the scheduler until SIGINT or SIGTERM, then waits for running builds
//! and removes temporary files.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::output::print_success;
use crate::core::doctor::run_doctor;
use crate::core::engine::Engine;
use crate::error::RepowrightError;

/// Execute the run command
pub async fn execute(config: &Path, skip_initial_build: bool) -> Result<()> {
    let settings = Arc::new(super::load_settings(config)?);

    tracing::info!("checking dependencies...");
    let report = run_doctor(&settings);
    let missing = report.missing_required();
    if !missing.is_empty() {
        return Err(RepowrightError::MissingDependencies { missing }.into());
    }
    for issue in &report.config_issues {
        tracing::warn!("{issue}");
    }

    let engine = Engine::production(settings);
    engine
        .setup()
        .await
        .context("Failed to prepare working directories")?;

    let lifecycle = Arc::clone(engine.lifecycle());
    let shutdown = async move {
        if let Err(e) = lifecycle.wait_for_signal().await {
            tracing::error!("Can not listen for signals: {e}");
            lifecycle.request_shutdown();
        }
    };

    let report = engine.run_until(shutdown, skip_initial_build).await;
    let stats = engine.dispatcher().stats();
    print_success(&format!(
        "Stopped after {} build(s), {} failed, {} tmp file(s) removed",
        stats.finished(),
        stats.failed(),
        report.cleanup.removed.len()
    ));
    Ok(())
}
