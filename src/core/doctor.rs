//! Host dependency checks
//!
//! Verifies that the tools the configured build needs are installed before
//! the daemon starts, and reports issues with suggestions.

use std::path::PathBuf;

use crate::core::settings::Settings;
use crate::core::target::RecipeLocator;
use crate::infra::chroot::{BIN_ARCH_NSPAWN, BIN_MAKECHROOTPKG, BIN_MKARCHROOT, BIN_PROXYCHAINS};
use crate::infra::index::BIN_REPO_ADD;
use crate::infra::process::{BIN_SH, BIN_SUDO};
use crate::infra::signer::BIN_GPG;

/// Result of a single dependency check
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the dependency being checked
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Resolved location if found
    pub path: Option<PathBuf>,
    /// Error message if check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
    /// Whether this is a required or optional dependency
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: &str, path: Option<PathBuf>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            path,
            error: None,
            suggestion: None,
            required,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            path: None,
            error: Some(error.to_string()),
            suggestion: suggestion.map(String::from),
            required,
        }
    }
}

/// Overall doctor report
#[derive(Debug, Default)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Configuration issues found
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check result
    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    /// Add a configuration issue
    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// Check if all required checks passed
    pub fn all_required_passed(&self) -> bool {
        self.checks
            .iter()
            .filter(|c| c.required)
            .all(|c| c.passed)
    }

    /// Check if all checks passed (including optional)
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    /// Count passed checks
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Count failed checks
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Names of failed required checks
    pub fn missing_required(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Look up `program` in PATH
pub fn check_program(program: &str, required: bool, suggestion: &str) -> CheckResult {
    match which::which(program) {
        Ok(path) => CheckResult::pass(program, Some(path), required),
        Err(_) => CheckResult::fail(
            program,
            &format!("{program} not found in PATH"),
            Some(suggestion),
            required,
        ),
    }
}

/// Check configuration details that only show up at build time
pub fn check_settings(settings: &Settings) -> Vec<String> {
    let mut issues = Vec::new();

    for file in &settings.env_files {
        if !file.source.is_file() {
            issues.push(format!(
                "Environment file {} does not exist",
                file.source.display()
            ));
        }
    }

    for target in settings.registry.targets() {
        if let RecipeLocator::Local(path) = &target.recipe {
            if !path.is_file() {
                issues.push(format!(
                    "PKGBUILD {} of package {} does not exist",
                    path.display(),
                    target.name
                ));
            }
        }
    }

    if settings.uses_proxy() && !settings.runtime_dir.is_dir() {
        issues.push(format!(
            "Runtime directory {} does not exist",
            settings.runtime_dir.display()
        ));
    }

    if settings.registry.is_empty() {
        issues.push("No package is configured".to_string());
    }

    issues
}

/// Run all doctor checks for `settings`
pub fn run_doctor(settings: &Settings) -> DoctorReport {
    let mut report = DoctorReport::new();

    report.add_check(check_program(BIN_SUDO, true, "Install sudo"));
    report.add_check(check_program(BIN_SH, true, "Install a POSIX shell"));
    for program in [BIN_MKARCHROOT, BIN_ARCH_NSPAWN, BIN_MAKECHROOTPKG] {
        report.add_check(check_program(program, true, "Install devtools: pacman -S devtools"));
    }
    report.add_check(check_program(
        BIN_REPO_ADD,
        true,
        "repo-add ships with pacman",
    ));
    // Only needed for what the config actually uses
    report.add_check(check_program(
        BIN_GPG,
        settings.sign_key.is_some(),
        "Install gnupg: pacman -S gnupg",
    ));
    report.add_check(check_program(
        BIN_PROXYCHAINS,
        settings.uses_proxy(),
        "Install proxychains-ng: pacman -S proxychains-ng",
    ));

    for issue in check_settings(settings) {
        report.add_config_issue(issue);
    }

    report
}
