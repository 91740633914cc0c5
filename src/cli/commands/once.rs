//! CLI command for `repowright once`
//!
//! Runs a single pass immediately, optionally limited to some packages.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::output::{print_detail, print_success, print_warning, status};
use crate::core::doctor::run_doctor;
use crate::core::engine::Engine;
use crate::error::RepowrightError;

/// Execute the once command
pub async fn execute(config: &Path, targets: &[String]) -> Result<()> {
    let settings = Arc::new(super::load_settings(config)?);
    let (_, unknown) = settings.registry.select(targets);
    if let Some(name) = unknown.into_iter().next() {
        return Err(RepowrightError::UnknownTarget { name }.into());
    }

    let missing = run_doctor(&settings).missing_required();
    if !missing.is_empty() {
        return Err(RepowrightError::MissingDependencies { missing }.into());
    }

    let engine = Engine::production(settings);
    engine
        .setup()
        .await
        .context("Failed to prepare working directories")?;

    // A signal stops admission; running builds still finish
    let lifecycle = Arc::clone(engine.lifecycle());
    let watcher = tokio::spawn(async move {
        if let Err(e) = lifecycle.wait_for_signal().await {
            tracing::warn!("Can not listen for signals: {e}");
        }
    });

    let result = engine.run_once(targets).await;
    engine.lifecycle().drain().await;
    watcher.abort();
    let report = result?;

    for name in &report.built {
        println!("  {} {name}", status::SUCCESS);
    }
    for name in &report.skipped {
        println!("  {} {name} (up to date)", status::INFO);
    }
    for (name, error) in &report.failed {
        println!("  {} {name}", status::ERROR);
        print_detail(error);
    }
    if !report.not_admitted.is_empty() {
        print_warning(&format!(
            "Interrupted, not built: {}",
            report.not_admitted.join(", ")
        ));
    }

    if !report.is_success() {
        bail!("{} package(s) failed", report.failed.len());
    }
    print_success(&format!(
        "{} built, {} up to date",
        report.built.len(),
        report.skipped.len()
    ));
    Ok(())
}
