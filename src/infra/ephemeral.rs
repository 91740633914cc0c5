//! Ephemeral file registry
//!
//! Pipelines create short-lived files that may hold secrets, such as proxy
//! configs with credentials. They are recorded here and removed once, at
//! shutdown.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::BackendError;

/// Result of a cleanup run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files removed
    pub removed: Vec<PathBuf>,
    /// Files that could not be removed, with the error text
    pub failed: Vec<(PathBuf, String)>,
}

/// Shared list of ephemeral files
#[derive(Debug, Clone, Default)]
pub struct EphemeralRegistry {
    files: Arc<Mutex<Vec<PathBuf>>>,
}

impl EphemeralRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file for removal at shutdown
    pub fn track(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        if !files.contains(&path) {
            files.push(path);
        }
    }

    /// Write `content` to `path` with owner-only permissions and track it
    pub fn write(&self, path: &Path, content: &[u8]) -> Result<(), BackendError> {
        // Track before writing so a partial write is still cleaned up
        self.track(path);
        write_private(path, content).map_err(|e| BackendError::Ephemeral {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Currently tracked files
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove every tracked file; failures are logged and reported
    pub fn cleanup(&self) -> CleanupReport {
        let files = std::mem::take(
            &mut *self.files.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let mut report = CleanupReport::default();
        for path in files {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("tmp file {} already gone", path.display());
                }
                Err(e) => {
                    tracing::warn!("Can not remove tmp file {}: {e}", path.display());
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}
