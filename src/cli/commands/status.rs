//! CLI command for `repowright status`

use anyhow::Result;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cli::output::{format_age, print_info, status};
use crate::core::cache::{IdempotencyRecord, Outcome};

/// Execute the status command
pub fn execute(config: &Path, json: bool) -> Result<()> {
    let settings = super::load_settings(config)?;
    let cache = super::marker_cache(&settings);

    let mut rows = Vec::with_capacity(settings.registry.len());
    for target in settings.registry.dispatch_order() {
        let record = cache.inspect(&target.name)?;
        rows.push((target, record));
    }

    if json {
        let packages: Vec<_> = rows
            .iter()
            .map(|(target, record)| {
                serde_json::json!({
                    "name": target.name,
                    "priority": target.priority,
                    "recipe": target.recipe.to_string(),
                    "record": record,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&packages)?);
        return Ok(());
    }

    print_info(&format!("{} package(s) configured", rows.len()));
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    for (target, record) in &rows {
        println!("  {} {}", prefix(record.as_ref()), target.name);
        println!("      {}", describe(record.as_ref(), now));
    }
    Ok(())
}

fn prefix(record: Option<&IdempotencyRecord>) -> &'static str {
    match record.map(|r| r.outcome) {
        Some(Outcome::Success) => status::SUCCESS,
        Some(Outcome::Unknown) => status::WARNING,
        None => status::INFO,
    }
}

fn describe(record: Option<&IdempotencyRecord>, now: u64) -> String {
    match record {
        None => "never built".to_string(),
        Some(r) if r.outcome == Outcome::Unknown => "marker unreadable, will rebuild".to_string(),
        Some(r) => {
            let hash = r
                .content_hash
                .as_deref()
                .map_or("?", |h| &h[..h.len().min(12)]);
            match r.recorded_at {
                Some(at) => format!(
                    "built from {hash}, {} ago",
                    format_age(now.saturating_sub(at))
                ),
                None => format!("built from {hash}"),
            }
        }
    }
}
