//! CLI command for `repowright check`
//!
//! Validates the config file and checks host dependencies.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{print_detail, print_info, print_success, print_warning, status};
use crate::core::doctor::run_doctor;
use crate::error::RepowrightError;

/// Execute the check command
pub fn execute(config: &Path) -> Result<()> {
    let settings = super::load_settings(config)?;

    print_success(&format!("Config {} is valid", config.display()));
    print_detail(&format!(
        "{} package(s), {} worker(s), pass every {:?}",
        settings.registry.len(),
        settings.workers,
        settings.schedule
    ));
    if settings.sign_key.is_some() {
        print_detail("Packages and database are signed");
    }
    println!();

    let report = run_doctor(&settings);
    print_info("Checking system dependencies...");
    println!();

    for check in &report.checks {
        let path_str = check
            .path
            .as_ref()
            .map(|p| format!(" ({})", p.display()))
            .unwrap_or_default();
        let required_str = if check.required { "" } else { " [optional]" };

        if check.passed {
            println!("  {} {}{path_str}{required_str}", status::SUCCESS, check.name);
        } else {
            println!("  {} {}{required_str}", status::ERROR, check.name);
            if let Some(error) = &check.error {
                print_detail(&format!("Error: {error}"));
            }
            if let Some(suggestion) = &check.suggestion {
                print_detail(&format!("Suggestion: {suggestion}"));
            }
        }
    }

    if !report.config_issues.is_empty() {
        println!();
        print_warning("Configuration issues:");
        for issue in &report.config_issues {
            print_detail(&format!("• {issue}"));
        }
    }

    println!();
    let passed = report.passed_count();
    let total = report.checks.len();
    let missing = report.missing_required();

    if report.all_passed() {
        print_success(&format!("All checks passed ({passed}/{total})"));
    } else if missing.is_empty() {
        print_warning(&format!("{passed}/{total} checks passed"));
    } else {
        println!("{} {passed}/{total} checks passed", status::ERROR);
        return Err(RepowrightError::MissingDependencies { missing }.into());
    }

    Ok(())
}
