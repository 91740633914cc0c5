//! Shutdown lifecycle
//!
//! Owns the stop token and the task tracker every pass runs on. Shutdown
//! stops admission, waits for in-flight pipelines and then removes ephemeral
//! files once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::infra::ephemeral::{CleanupReport, EphemeralRegistry};

/// Result of a drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Time spent waiting for tracked tasks
    pub waited: Duration,
    /// Ephemeral cleanup of this drain
    pub cleanup: CleanupReport,
    /// Cleanup had already run in an earlier drain
    pub already_cleaned: bool,
}

/// Coordinates stop signalling, draining and cleanup
#[derive(Debug)]
pub struct Lifecycle {
    stop: CancellationToken,
    tracker: TaskTracker,
    ephemeral: EphemeralRegistry,
    requested: AtomicBool,
    cleaned: AtomicBool,
}

impl Lifecycle {
    pub fn new(ephemeral: EphemeralRegistry) -> Self {
        Self {
            stop: CancellationToken::new(),
            tracker: TaskTracker::new(),
            ephemeral,
            requested: AtomicBool::new(false),
            cleaned: AtomicBool::new(false),
        }
    }

    /// Stop token observed by the scheduler and dispatcher
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Tracker that passes are spawned on
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Ephemeral file registry
    pub fn ephemeral(&self) -> &EphemeralRegistry {
        &self.ephemeral
    }

    /// Check if shutdown was requested
    pub fn is_shutting_down(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Signal shutdown; returns `true` only for the first request
    pub fn request_shutdown(&self) -> bool {
        let first = !self.requested.swap(true, Ordering::SeqCst);
        if first {
            tracing::info!("shutdown requested, waiting for running jobs");
        }
        self.stop.cancel();
        first
    }

    /// Resolve on the first SIGINT or SIGTERM, then request shutdown
    ///
    /// Later signals are logged and otherwise ignored.
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        wait_signal().await?;
        self.request_shutdown();

        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tracker.wait() => break,
                    result = wait_signal() => match result {
                        Ok(()) => tracing::warn!(
                            "already shutting down, {} task(s) still running",
                            tracker.len()
                        ),
                        Err(_) => break,
                    },
                }
            }
        });
        Ok(())
    }

    /// Stop admission, await every tracked task and clean up
    pub async fn drain(&self) -> ShutdownReport {
        self.request_shutdown();
        self.tracker.close();
        let started = Instant::now();
        self.tracker.wait().await;
        let waited = started.elapsed();
        tracing::info!("all jobs finished after {:?}", waited);

        match self.cleanup() {
            Some(cleanup) => ShutdownReport {
                waited,
                cleanup,
                already_cleaned: false,
            },
            None => ShutdownReport {
                waited,
                cleanup: CleanupReport::default(),
                already_cleaned: true,
            },
        }
    }

    /// Remove ephemeral files; `None` when cleanup already ran
    pub fn cleanup(&self) -> Option<CleanupReport> {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return None;
        }
        tracing::info!("cleaning tmp files...");
        let report = self.ephemeral.cleanup();
        tracing::info!(
            "{} tmp file(s) removed, {} failed",
            report.removed.len(),
            report.failed.len()
        );
        Some(report)
    }
}

#[cfg(unix)]
async fn wait_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
