//! Pass dispatcher
//!
//! Walks a pass's targets in dispatch order, admits each into the worker pool
//! and runs its pipeline. A pass returns only after every admitted pipeline
//! has finished.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::pipeline::{Completion, Pipeline, PipelineOutcome, PipelineReport};
use crate::core::pool::BoundedPool;
use crate::core::target::Target;

/// Process-wide pipeline counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    started: AtomicUsize,
    finished: AtomicUsize,
    failed: AtomicUsize,
}

impl DispatchStats {
    /// Pipelines started
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Pipelines that reached a terminal state
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Pipelines that ended in `Failed` or panicked
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Summary of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Pass number, starting at 1
    pub pass_id: u64,
    /// Targets built and published
    pub built: Vec<String>,
    /// Targets skipped as unchanged
    pub skipped: Vec<String>,
    /// Failed targets with the error text
    pub failed: Vec<(String, String)>,
    /// Targets still running in an overlapping pass
    pub busy: Vec<String>,
    /// Targets never admitted because shutdown was requested
    pub not_admitted: Vec<String>,
    /// Admission stopped early
    pub halted: bool,
}

impl PassReport {
    fn new(pass_id: u64) -> Self {
        Self {
            pass_id,
            ..Self::default()
        }
    }

    /// Check if no target failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn halt(&mut self, remaining: &[Arc<Target>]) {
        tracing::info!("shutdown requested, {} package(s) not admitted", remaining.len());
        self.halted = true;
        self.not_admitted
            .extend(remaining.iter().map(|t| t.name.clone()));
    }

    fn record(&mut self, report: PipelineReport) {
        match report.outcome {
            PipelineOutcome::Completed(Completion::Built { .. }) => self.built.push(report.target),
            PipelineOutcome::Completed(Completion::Skipped) => self.skipped.push(report.target),
            PipelineOutcome::Failed { stage, error } => self
                .failed
                .push((report.target, format!("{stage}: {error}"))),
        }
    }
}

/// Marks a target active until dropped
struct TargetClaim {
    name: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for TargetClaim {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Admits targets into the pool and runs their pipelines
#[derive(Debug)]
pub struct Dispatcher {
    pool: BoundedPool,
    pipeline: Arc<Pipeline>,
    active: Arc<Mutex<HashSet<String>>>,
    stats: Arc<DispatchStats>,
    passes: AtomicU64,
}

impl Dispatcher {
    pub fn new(pool: BoundedPool, pipeline: Arc<Pipeline>) -> Self {
        Self {
            pool,
            pipeline,
            active: Arc::new(Mutex::new(HashSet::new())),
            stats: Arc::new(DispatchStats::default()),
            passes: AtomicU64::new(0),
        }
    }

    /// Worker pool
    pub fn pool(&self) -> &BoundedPool {
        &self.pool
    }

    /// Pipeline counters
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Check if `name` is running in some pass
    pub fn is_active(&self, name: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    fn claim(&self, name: &str) -> Option<TargetClaim> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(name.to_string()) {
            return None;
        }
        Some(TargetClaim {
            name: name.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    /// Run one pass over `targets`, which must already be in dispatch order
    pub async fn dispatch(&self, targets: &[Arc<Target>], stop: &CancellationToken) -> PassReport {
        let pass_id = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        let span = tracing::info_span!("pass", pass = pass_id);
        self.run_pass(pass_id, targets, stop).instrument(span).await
    }

    async fn run_pass(
        &self,
        pass_id: u64,
        targets: &[Arc<Target>],
        stop: &CancellationToken,
    ) -> PassReport {
        tracing::info!("starting pass with {} package(s)", targets.len());
        let mut report = PassReport::new(pass_id);
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        for (index, target) in targets.iter().enumerate() {
            if stop.is_cancelled() {
                report.halt(&targets[index..]);
                break;
            }
            let Some(claim) = self.claim(&target.name) else {
                tracing::info!("package {} is still building, skipped", target.name);
                report.busy.push(target.name.clone());
                continue;
            };
            let Some(slot) = self.pool.acquire(stop).await else {
                drop(claim);
                report.halt(&targets[index..]);
                break;
            };

            self.stats.started.fetch_add(1, Ordering::SeqCst);
            let name = target.name.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let target = Arc::clone(target);
            let handle = tasks.spawn(
                async move {
                    let _slot = slot;
                    let _claim = claim;
                    pipeline.run(target).await
                }
                .in_current_span(),
            );
            names.insert(handle.id(), name);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            self.stats.finished.fetch_add(1, Ordering::SeqCst);
            match joined {
                Ok((_, pipeline_report)) => {
                    if !pipeline_report.is_success() {
                        self.stats.failed.fetch_add(1, Ordering::SeqCst);
                    }
                    report.record(pipeline_report);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::SeqCst);
                    let name = names.remove(&e.id()).unwrap_or_default();
                    tracing::warn!("Job for package \"{name}\" aborted: {e}");
                    report.failed.push((name, format!("pipeline aborted: {e}")));
                }
            }
        }

        tracing::info!(
            "pass finished: {} built, {} skipped, {} failed, {} busy, {} not admitted",
            report.built.len(),
            report.skipped.len(),
            report.failed.len(),
            report.busy.len(),
            report.not_admitted.len()
        );
        report
    }
}
