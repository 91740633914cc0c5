//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a temporary
//! workspace, a scripted build backend and a recording output index.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use repowright::core::cache::MarkerStore;
use repowright::core::engine::{Engine, Services};
use repowright::core::settings::Settings;
use repowright::core::target::{RecipeLocator, Target, TargetRegistry};
use repowright::error::{BackendError, CommandError, FetchError};
use repowright::infra::backend::{scan_artifacts, Artifact, BuildBackend};
use repowright::infra::dirs::WorkDirs;
use repowright::infra::ephemeral::EphemeralRegistry;
use repowright::infra::fetch::RecipeFetcher;
use repowright::infra::index::OutputIndex;
use repowright::infra::log_sink::LogSink;
use repowright::infra::signer::NoopSigner;

/// Temporary working directory plus output repository
pub struct TestWorkspace {
    /// Temporary directory holding everything
    pub dir: TempDir,
}

impl TestWorkspace {
    /// Create a new workspace in a temporary directory
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(dir.path().join("repo")).expect("Failed to create repo dir");
        Self { dir }
    }

    /// Root of the temporary directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Working directory layout
    pub fn dirs(&self) -> WorkDirs {
        WorkDirs::new(self.dir.path().join("work"))
    }

    /// Directory packages are published into
    pub fn repo_dir(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Settings for `targets` with `workers` slots
    pub fn settings(&self, targets: Vec<Target>, workers: usize) -> Settings {
        Settings {
            working_dir: self.dirs().root().to_path_buf(),
            target_db: self.repo_dir().join("test.db.tar.gz"),
            user: "builder".to_string(),
            group: "builder".to_string(),
            workers,
            schedule: Duration::from_secs(3600),
            sign_key: None,
            env_files: Vec::new(),
            runtime_dir: self.dir.path().join("shm"),
            debug: false,
            skip_initial_build: false,
            registry: TargetRegistry::new(targets),
        }
    }

    /// Write a config file and return its path
    pub fn write_config(&self, packages: &str) -> PathBuf {
        let path = self.dir.path().join("config.toml");
        let content = format!(
            r#"
[general]
dir = "{}"
target_db = "{}"
user = "builder"
group = "builder"
workers = 2
{packages}
"#,
            self.dirs().root().display(),
            self.repo_dir().join("test.db.tar.gz").display(),
        );
        std::fs::write(&path, content).expect("Failed to write config");
        path
    }

    /// Check if a package file was published
    pub fn published(&self, file: &str) -> bool {
        self.repo_dir().join(file).exists()
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Target with a local recipe locator; the fake backend ignores the path
pub fn target(name: &str) -> Target {
    Target::new(name, RecipeLocator::Local(PathBuf::from(format!("/recipes/{name}"))))
}

/// Package file the fake backend produces for `name`
pub fn package_file(name: &str) -> String {
    format!("{name}-1-1-any.pkg.tar.zst")
}

/// Scripted build backend
///
/// Builds drop a package file into the target build directory. Recipes,
/// failures, panics and a gate that holds builds in flight are scriptable.
pub struct FakeBackend {
    dirs: WorkDirs,
    fetcher: RecipeFetcher,
    recipes: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    gate: Option<Arc<Semaphore>>,
    fetches: AtomicUsize,
    syncs: AtomicUsize,
    builds: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    build_order: Mutex<Vec<String>>,
}

impl FakeBackend {
    /// Backend building into `dirs`
    pub fn new(dirs: WorkDirs) -> Self {
        Self {
            dirs,
            fetcher: RecipeFetcher::with_config(1, 0),
            recipes: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            gate: None,
            fetches: AtomicUsize::new(0),
            syncs: AtomicUsize::new(0),
            builds: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            build_order: Mutex::new(Vec::new()),
        }
    }

    /// Hold every build until a permit is added to `gate`
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Set the recipe returned for `name`
    pub fn set_recipe(&self, name: &str, recipe: &[u8]) {
        self.recipes
            .lock()
            .unwrap()
            .insert(name.to_string(), recipe.to_vec());
    }

    /// Make the build of `name` fail
    pub fn fail_build(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Let the build of `name` succeed again
    pub fn clear_failure(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    /// Make the build of `name` panic
    pub fn panic_build(&self, name: &str) {
        self.panicking.lock().unwrap().insert(name.to_string());
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    /// Build tool invocations
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Builds currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent builds
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Targets in the order their builds started
    pub fn build_order(&self) -> Vec<String> {
        self.build_order.lock().unwrap().clone()
    }

    /// Number of builds started for `name`
    pub fn builds_of(&self, name: &str) -> usize {
        self.build_order().iter().filter(|n| *n == name).count()
    }

    /// Wait until `count` builds are running at the same time
    pub async fn wait_for_active(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.active() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("builds did not start in time");
    }
}

/// Decrements the active counter when a build ends, even by panic
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BuildBackend for FakeBackend {
    async fn fetch_recipe(
        &self,
        locator: &RecipeLocator,
        proxy: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match locator {
            RecipeLocator::Remote(_) => self.fetcher.fetch(locator, proxy).await,
            RecipeLocator::Local(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let recipes = self.recipes.lock().unwrap();
                Ok(recipes
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| format!("pkgname={name}\npkgver=1\n").into_bytes()))
            }
        }
    }

    fn environment_root(&self, target: &Target) -> PathBuf {
        self.dirs.chroot_root(&target.name)
    }

    async fn sync_environment(&self, _target: &Target, _log: &LogSink) -> Result<(), BackendError> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run_build(&self, target: &Target, log: &LogSink) -> Result<(), BackendError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.build_order.lock().unwrap().push(target.name.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        } else {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        if self.panicking.lock().unwrap().contains(&target.name) {
            panic!("scripted panic in {}", target.name);
        }
        if self.failing.lock().unwrap().contains(&target.name) {
            return Err(BackendError::Command(CommandError::Failed {
                program: "makechrootpkg".to_string(),
                status: "exit status: 1".to_string(),
                log: log.path().to_path_buf(),
            }));
        }

        let dir = self.dirs.target_build_dir(&target.name);
        std::fs::create_dir_all(&dir).expect("Failed to create build dir");
        std::fs::write(dir.join(package_file(&target.name)), b"package").expect("write package");
        Ok(())
    }

    async fn list_artifacts(&self, target: &Target) -> Result<Vec<Artifact>, BackendError> {
        scan_artifacts(&self.dirs.target_build_dir(&target.name))
    }
}

/// Output index that records upserts and detects overlapping updates
#[derive(Default)]
pub struct RecordingIndex {
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    added: Mutex<Vec<PathBuf>>,
}

impl RecordingIndex {
    /// Packages added, in order
    pub fn added(&self) -> Vec<PathBuf> {
        self.added.lock().unwrap().clone()
    }

    /// Check if two upserts ever ran at once
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputIndex for RecordingIndex {
    async fn upsert(&self, artifact: &Path, _log: &LogSink) -> Result<(), CommandError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.added.lock().unwrap().push(artifact.to_path_buf());
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine over the fake backend with marker files in the workspace
pub fn engine(
    workspace: &TestWorkspace,
    settings: Settings,
    backend: Arc<FakeBackend>,
    index: Arc<RecordingIndex>,
) -> Engine {
    engine_with_ephemeral(workspace, settings, backend, index, EphemeralRegistry::new())
}

/// Like [`engine`], with a caller-provided ephemeral registry
pub fn engine_with_ephemeral(
    workspace: &TestWorkspace,
    settings: Settings,
    backend: Arc<FakeBackend>,
    index: Arc<RecordingIndex>,
    ephemeral: EphemeralRegistry,
) -> Engine {
    let services = Services {
        backend,
        signer: Arc::new(NoopSigner),
        index,
        store: Arc::new(MarkerStore::new(workspace.dirs())),
    };
    Engine::new(Arc::new(settings), services, ephemeral)
}
