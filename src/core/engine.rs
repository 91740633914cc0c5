//! Build orchestration engine
//!
//! Wires validated settings and the external collaborators into the pipeline,
//! dispatcher, scheduler and lifecycle. The CLI and the integration tests
//! both drive the system through [`Engine`].

use std::future::Future;
use std::sync::Arc;

use crate::core::cache::{IdempotencyCache, IdempotencyStore, MarkerStore};
use crate::core::dispatcher::{Dispatcher, PassReport};
use crate::core::lifecycle::{Lifecycle, ShutdownReport};
use crate::core::pipeline::Pipeline;
use crate::core::pool::BoundedPool;
use crate::core::publish::Publisher;
use crate::core::scheduler::Scheduler;
use crate::core::settings::Settings;
use crate::error::RepowrightError;
use crate::infra::backend::BuildBackend;
use crate::infra::chroot::ChrootBackend;
use crate::infra::dirs::WorkDirs;
use crate::infra::ephemeral::EphemeralRegistry;
use crate::infra::index::{OutputIndex, RepoAddIndex};
use crate::infra::process::CommandRunner;
use crate::infra::signer::{GpgSigner, NoopSigner, Signer};

/// External collaborators of the engine
#[derive(Clone)]
pub struct Services {
    /// Build environment
    pub backend: Arc<dyn BuildBackend>,
    /// Package signer
    pub signer: Arc<dyn Signer>,
    /// Output index
    pub index: Arc<dyn OutputIndex>,
    /// Idempotency record storage
    pub store: Arc<dyn IdempotencyStore>,
}

impl Services {
    /// Chroot backend, gpg, repo-add and marker files, as configured
    pub fn production(settings: &Settings, ephemeral: &EphemeralRegistry) -> Self {
        let dirs = WorkDirs::new(&settings.working_dir);
        let runner = CommandRunner::new(settings.debug);
        let backend = ChrootBackend::new(
            dirs.clone(),
            &settings.user,
            &settings.group,
            ephemeral.clone(),
            &settings.runtime_dir,
            runner,
        );
        let signer: Arc<dyn Signer> = match &settings.sign_key {
            Some(key) => Arc::new(GpgSigner::new(
                key.clone(),
                &settings.user,
                &settings.group,
                runner,
            )),
            None => Arc::new(NoopSigner),
        };
        Self {
            backend: Arc::new(backend),
            signer,
            index: Arc::new(RepoAddIndex::new(
                &settings.target_db,
                settings.sign_key.clone(),
                &settings.user,
                &settings.group,
                runner,
            )),
            store: Arc::new(MarkerStore::new(dirs)),
        }
    }
}

/// The assembled build orchestration engine
pub struct Engine {
    settings: Arc<Settings>,
    backend: Arc<dyn BuildBackend>,
    cache: IdempotencyCache,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Arc<Lifecycle>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("dispatcher", &self.dispatcher)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Assemble an engine from settings and collaborators
    pub fn new(settings: Arc<Settings>, services: Services, ephemeral: EphemeralRegistry) -> Self {
        let dirs = WorkDirs::new(&settings.working_dir);
        let cache = IdempotencyCache::new(services.store, dirs.clone());
        let publisher = Arc::new(Publisher::new(
            settings.output_dir(),
            services.signer,
            services.index,
        ));
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&services.backend),
            cache.clone(),
            publisher,
            settings.env_files.clone(),
            dirs,
            CommandRunner::new(settings.debug),
        ));
        let dispatcher = Arc::new(Dispatcher::new(BoundedPool::new(settings.workers), pipeline));

        Self {
            backend: services.backend,
            cache,
            dispatcher,
            lifecycle: Arc::new(Lifecycle::new(ephemeral)),
            settings,
        }
    }

    /// Engine with the production collaborators
    pub fn production(settings: Arc<Settings>) -> Self {
        let ephemeral = EphemeralRegistry::new();
        let services = Services::production(&settings, &ephemeral);
        Self::new(settings, services, ephemeral)
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn cache(&self) -> &IdempotencyCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Create working directories and build environments
    pub async fn setup(&self) -> Result<(), RepowrightError> {
        WorkDirs::new(&self.settings.working_dir).ensure()?;
        self.backend.setup(self.settings.registry.targets()).await
    }

    /// Run a single pass now, over all targets or only the named ones
    pub async fn run_once(&self, names: &[String]) -> Result<PassReport, RepowrightError> {
        let targets = if names.is_empty() {
            self.settings.registry.dispatch_order()
        } else {
            let (selected, unknown) = self.settings.registry.select(names);
            if let Some(name) = unknown.into_iter().next() {
                return Err(RepowrightError::UnknownTarget { name });
            }
            selected
        };
        let stop = self.lifecycle.stop_token();
        Ok(self.dispatcher.dispatch(&targets, &stop).await)
    }

    /// Schedule passes until `shutdown` resolves, then drain
    pub async fn run_until<F>(&self, shutdown: F, skip_initial_build: bool) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        let initial_pass = !(skip_initial_build || self.settings.skip_initial_build);
        let scheduler = Scheduler::new(
            self.settings.schedule,
            initial_pass,
            Arc::clone(&self.dispatcher),
            Arc::new(self.settings.registry.clone()),
        );
        let stop = self.lifecycle.stop_token();
        let tracker = self.lifecycle.tracker().clone();
        self.lifecycle.tracker().spawn(async move {
            scheduler.run(stop, &tracker).await;
        });

        shutdown.await;
        self.lifecycle.drain().await
    }
}
