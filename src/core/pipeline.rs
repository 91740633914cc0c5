//! Build pipeline
//!
//! One pipeline run takes a target through `Prepare -> Build -> Publish ->
//! Done`. Any error moves the work item to `Failed`, which is terminal; the
//! success marker is only written from `Done`, so a failed run always leaves
//! the previous record in place.

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::cache::IdempotencyCache;
use crate::core::publish::Publisher;
use crate::core::settings::EnvFile;
use crate::core::target::Target;
use crate::error::{HookError, HookKind, PipelineError, PublishError};
use crate::infra::backend::BuildBackend;
use crate::infra::dirs::WorkDirs;
use crate::infra::fetch::compute_checksum;
use crate::infra::filesystem::{create_dir_all, reconcile_file};
use crate::infra::log_sink::LogSink;
use crate::infra::process::CommandRunner;

/// Environment variables exported to hooks
pub const ENV_TARGET: &str = "REPOWRIGHT_TARGET";
pub const ENV_BUILD_DIR: &str = "REPOWRIGHT_BUILD_DIR";
pub const ENV_RECIPE: &str = "REPOWRIGHT_RECIPE";

/// Pipeline stage, used to report where a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepare,
    Build,
    Publish,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Build => "build",
            Stage::Publish => "publish",
            Stage::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Packages were built and published
    Built {
        /// Published package paths
        artifacts: Vec<PathBuf>,
    },
    /// Recipe unchanged since the last success
    Skipped,
}

/// State of a work item
#[derive(Debug)]
pub enum PipelineState {
    Prepare,
    Build { changed: bool },
    Publish,
    Done { completion: Completion },
    Finished(Completion),
    Failed { stage: Stage, error: PipelineError },
}

impl PipelineState {
    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Failed { .. })
    }
}

/// A target admitted into a pass
#[derive(Debug)]
pub struct WorkItem {
    /// Target being built
    pub target: Arc<Target>,
    /// Per-run log
    pub log: LogSink,
    /// Current state
    pub state: PipelineState,
    /// Recipe fetched during `Prepare`
    pub snapshot: Option<Vec<u8>>,
    /// SHA-256 of the snapshot
    pub snapshot_hash: Option<String>,
    /// A matching success record existed when the run started
    pub skip_eligible: bool,
}

impl WorkItem {
    fn new(target: Arc<Target>, log: LogSink) -> Self {
        Self {
            target,
            log,
            state: PipelineState::Prepare,
            snapshot: None,
            snapshot_hash: None,
            skip_eligible: false,
        }
    }
}

/// Final result of a pipeline run
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(Completion),
    Failed { stage: Stage, error: PipelineError },
}

/// Report of one pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    /// Target name
    pub target: String,
    /// Log written by the run
    pub log_path: PathBuf,
    /// How the run ended
    pub outcome: PipelineOutcome,
}

impl PipelineReport {
    /// Check if the run reached `Done`
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Completed(_))
    }
}

/// Runs work items against the backend, cache and publisher
pub struct Pipeline {
    backend: Arc<dyn BuildBackend>,
    cache: IdempotencyCache,
    publisher: Arc<Publisher>,
    env_files: Vec<EnvFile>,
    dirs: WorkDirs,
    runner: CommandRunner,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("cache", &self.cache)
            .field("publisher", &self.publisher)
            .field("env_files", &self.env_files)
            .field("dirs", &self.dirs)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        backend: Arc<dyn BuildBackend>,
        cache: IdempotencyCache,
        publisher: Arc<Publisher>,
        env_files: Vec<EnvFile>,
        dirs: WorkDirs,
        runner: CommandRunner,
    ) -> Self {
        Self {
            backend,
            cache,
            publisher,
            env_files,
            dirs,
            runner,
        }
    }

    /// Idempotency cache used by this pipeline
    pub fn cache(&self) -> &IdempotencyCache {
        &self.cache
    }

    /// Run `target` to a terminal state
    pub async fn run(&self, target: Arc<Target>) -> PipelineReport {
        let log = LogSink::new(self.dirs.new_log_path(&target.name));
        tracing::info!(package = %target.name, "Job for package \"{}\" started", target.name);
        tracing::debug!("log file for {} is {}", target.name, log.path().display());

        let mut item = WorkItem::new(target, log);
        let outcome = loop {
            match std::mem::replace(&mut item.state, PipelineState::Prepare) {
                PipelineState::Finished(completion) => {
                    break PipelineOutcome::Completed(completion)
                }
                PipelineState::Failed { stage, error } => {
                    break PipelineOutcome::Failed { stage, error }
                }
                state => item.state = self.step(&mut item, state).await,
            }
        };

        let name = item.target.name.clone();
        match &outcome {
            PipelineOutcome::Completed(Completion::Built { artifacts }) => {
                item.log.note("done");
                tracing::info!(
                    package = %name,
                    "Job for package \"{name}\" finished, {} package(s) published",
                    artifacts.len()
                );
            }
            PipelineOutcome::Completed(Completion::Skipped) => {
                item.log.note("recipe unchanged, skipped");
                tracing::info!(package = %name, "Package \"{name}\" is up to date, skipped");
            }
            PipelineOutcome::Failed { stage, error } => {
                item.log.note(&format!("failed in {stage}: {error}"));
                tracing::warn!(
                    package = %name,
                    %stage,
                    "Can not finish job for package \"{name}\": {error}"
                );
            }
        }

        PipelineReport {
            target: name,
            log_path: item.log.path().to_path_buf(),
            outcome,
        }
    }

    async fn step(&self, item: &mut WorkItem, state: PipelineState) -> PipelineState {
        match state {
            PipelineState::Prepare => match self.prepare(item).await {
                Ok(changed) => PipelineState::Build { changed },
                Err(error) => PipelineState::Failed {
                    stage: Stage::Prepare,
                    error,
                },
            },
            PipelineState::Build { changed } => match self.build(item, changed).await {
                Ok(true) => PipelineState::Publish,
                Ok(false) => PipelineState::Done {
                    completion: Completion::Skipped,
                },
                Err(error) => PipelineState::Failed {
                    stage: Stage::Build,
                    error,
                },
            },
            PipelineState::Publish => match self.publish(item).await {
                Ok(artifacts) => PipelineState::Done {
                    completion: Completion::Built { artifacts },
                },
                Err(error) => PipelineState::Failed {
                    stage: Stage::Publish,
                    error,
                },
            },
            PipelineState::Done { completion } => match self.finish(item, &completion) {
                Ok(()) => PipelineState::Finished(completion),
                Err(error) => PipelineState::Failed {
                    stage: Stage::Done,
                    error,
                },
            },
            terminal => terminal,
        }
    }

    async fn prepare(&self, item: &mut WorkItem) -> Result<bool, PipelineError> {
        let target = &item.target;
        item.log.note(&format!("fetching recipe from {}", target.recipe));
        let snapshot = self
            .backend
            .fetch_recipe(&target.recipe, target.proxy.as_deref())
            .await?;

        let changed = self.cache.apply_snapshot(&target.name, &snapshot)?;
        if changed {
            item.log.note("recipe changed");
        }

        let root = self.backend.environment_root(target);
        for file in &self.env_files {
            let dest = root.join(&file.relative);
            if reconcile_file(&dest, &file.source)? {
                tracing::debug!("updated {} for {}", dest.display(), target.name);
                item.log.note(&format!("updated {}", dest.display()));
            }
        }

        // Any recipe without a matching success record gets a synced chroot
        item.skip_eligible = self.cache.should_skip(&target.name, &snapshot)?;
        if changed || !item.skip_eligible {
            item.log.note("syncing build environment");
            self.backend.sync_environment(target, &item.log).await?;
        }

        item.snapshot_hash = Some(compute_checksum(&snapshot));
        item.snapshot = Some(snapshot);
        Ok(changed)
    }

    async fn build(&self, item: &WorkItem, changed: bool) -> Result<bool, PipelineError> {
        if !changed && item.skip_eligible {
            return Ok(false);
        }
        let target = &item.target;
        if let Some(hook) = &target.pre_build {
            self.run_hook(HookKind::PreBuild, hook, item).await?;
        }
        item.log.note("building");
        self.backend.run_build(target, &item.log).await?;
        if let Some(hook) = &target.post_build {
            self.run_hook(HookKind::PostBuild, hook, item).await?;
        }
        Ok(true)
    }

    async fn run_hook(
        &self,
        kind: HookKind,
        script: &str,
        item: &WorkItem,
    ) -> Result<(), PipelineError> {
        let name = &item.target.name;
        let build_dir = self.dirs.target_build_dir(name);
        item.log.note(&format!("running {kind} hook"));
        create_dir_all(&build_dir)?;
        let mut cmd = CommandRunner::shell(script, &build_dir);
        cmd.env(ENV_TARGET, name)
            .env(ENV_BUILD_DIR, &build_dir)
            .env(ENV_RECIPE, self.dirs.recipe_path(name));
        self.runner
            .run(cmd, &item.log)
            .await
            .map_err(|source| HookError { kind, source })?;
        Ok(())
    }

    async fn publish(&self, item: &WorkItem) -> Result<Vec<PathBuf>, PipelineError> {
        let artifacts = self
            .backend
            .list_artifacts(&item.target)
            .await
            .map_err(PublishError::from)?;
        item.log.note(&format!("publishing {} file(s)", artifacts.len()));
        Ok(self
            .publisher
            .publish(&item.target, &artifacts, &item.log)
            .await?)
    }

    fn finish(&self, item: &WorkItem, completion: &Completion) -> Result<(), PipelineError> {
        // Skipped runs already hold an identical record
        if let (Completion::Built { .. }, Some(snapshot)) = (completion, &item.snapshot) {
            self.cache.record_success(&item.target.name, snapshot)?;
        }
        Ok(())
    }
}
