//! CLI command for `repowright forget`
//!
//! Deletes success markers so the next pass rebuilds the packages.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{print_info, print_success};
use crate::error::RepowrightError;

/// Execute the forget command
pub fn execute(config: &Path, targets: &[String]) -> Result<()> {
    let settings = super::load_settings(config)?;
    let (_, unknown) = settings.registry.select(targets);
    if let Some(name) = unknown.into_iter().next() {
        return Err(RepowrightError::UnknownTarget { name }.into());
    }

    let cache = super::marker_cache(&settings);
    for name in targets {
        if cache.forget(name)? {
            print_success(&format!("{name} will be rebuilt on the next pass"));
        } else {
            print_info(&format!("{name} has no build record"));
        }
    }
    Ok(())
}
