//! Per-run log capture
//!
//! Every pipeline run owns one log file. Command output is appended to it
//! directly, and the pipeline adds short notes between stages.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::CommandError;

/// Append-only log file of one pipeline run
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    /// Log into `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File, CommandError> {
        let to_error = |e: std::io::Error| CommandError::Log {
            path: self.path.clone(),
            error: e.to_string(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(to_error)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(to_error)
    }

    /// stdout and stderr handles writing into the log
    pub fn stdio(&self) -> Result<(Stdio, Stdio), CommandError> {
        let stdout = self.open()?;
        let stderr = stdout.try_clone().map_err(|e| CommandError::Log {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    /// Append a line; failures are only traced
    pub fn note(&self, message: &str) {
        let written = self
            .open()
            .and_then(|mut file| {
                writeln!(file, "==> {message}").map_err(|e| CommandError::Log {
                    path: self.path.clone(),
                    error: e.to_string(),
                })
            });
        if let Err(e) = written {
            tracing::debug!("{e}");
        }
    }
}
