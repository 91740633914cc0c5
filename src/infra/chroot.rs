//! Clean chroot build backend
//!
//! Each target owns a chroot under `building/<name>/chroot/root`, created with
//! `mkarchroot` and used by `makechrootpkg -c`. Proxied builds run under
//! proxychains with a generated config in the runtime directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::config::defaults::LOG_FILE_MKARCHROOT;
use crate::core::target::{RecipeLocator, Target};
use crate::error::{BackendError, FetchError, RepowrightError};
use crate::infra::backend::{scan_artifacts, Artifact, BuildBackend};
use crate::infra::dirs::WorkDirs;
use crate::infra::ephemeral::EphemeralRegistry;
use crate::infra::fetch::RecipeFetcher;
use crate::infra::log_sink::LogSink;
use crate::infra::process::{CommandRunner, BIN_SUDO};

pub const BIN_MKARCHROOT: &str = "mkarchroot";
pub const BIN_ARCH_NSPAWN: &str = "arch-nspawn";
pub const BIN_MAKECHROOTPKG: &str = "makechrootpkg";
pub const BIN_PACMAN: &str = "pacman";
pub const BIN_PROXYCHAINS: &str = "proxychains";

/// Proxy variables exported to proxied builds
const PROXY_ENV_VARS: [&str; 6] = [
    "ALL_PROXY",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "all_proxy",
    "http_proxy",
    "https_proxy",
];

/// Backend driving the devtools chroot scripts
#[derive(Debug, Clone)]
pub struct ChrootBackend {
    dirs: WorkDirs,
    user: String,
    group: String,
    fetcher: RecipeFetcher,
    ephemeral: EphemeralRegistry,
    runtime_dir: PathBuf,
    runner: CommandRunner,
}

impl ChrootBackend {
    /// Create a backend building as `user:group`
    pub fn new(
        dirs: WorkDirs,
        user: impl Into<String>,
        group: impl Into<String>,
        ephemeral: EphemeralRegistry,
        runtime_dir: impl Into<PathBuf>,
        runner: CommandRunner,
    ) -> Self {
        Self {
            dirs,
            user: user.into(),
            group: group.into(),
            fetcher: RecipeFetcher::new(),
            ephemeral,
            runtime_dir: runtime_dir.into(),
            runner,
        }
    }

    /// Replace the recipe fetcher
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: RecipeFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Create the chroot of every target that does not have one yet
    pub async fn initialize(&self, targets: &[Arc<Target>]) -> Result<(), RepowrightError> {
        tracing::info!("init working dirs...");
        self.dirs.ensure()?;
        for target in targets {
            self.dirs.ensure_target(&target.name)?;
            let root = self.dirs.chroot_root(&target.name);
            if root.is_dir() {
                continue;
            }
            tracing::info!("creating chroot for {}", target.name);
            let log = LogSink::new(
                self.dirs
                    .target_logs_dir(&target.name)
                    .join(LOG_FILE_MKARCHROOT),
            );
            let cmd = CommandRunner::sudo(
                &self.user,
                &self.group,
                BIN_MKARCHROOT,
                [root.as_os_str(), "base-devel".as_ref()],
            );
            self.runner
                .run(cmd, &log)
                .await
                .map_err(|source| RepowrightError::Environment {
                    target: target.name.clone(),
                    source,
                })?;
        }
        tracing::info!("all working dirs inited");
        Ok(())
    }

    /// Path of the proxychains config for `target`
    pub fn proxy_conf_path(&self, target: &Target) -> PathBuf {
        self.runtime_dir
            .join(format!("repowright.{}.proxy.conf", target.name))
    }

    /// Build the makechrootpkg invocation, wrapped for `proxy_conf` if given
    pub fn build_command(&self, target: &Target, proxy_conf: Option<&Path>) -> Command {
        let mut cmd = match proxy_conf {
            Some(conf) => {
                let mut cmd = Command::new(BIN_PROXYCHAINS);
                cmd.arg("-q").arg("-f").arg(conf).arg(BIN_SUDO);
                cmd
            }
            None => Command::new(BIN_SUDO),
        };
        cmd.args(["-u", &self.user, "-g", &self.group]);
        if let Some(proxy) = &target.proxy {
            cmd.arg(format!("--preserve-env={}", PROXY_ENV_VARS.join(",")));
            for var in PROXY_ENV_VARS {
                cmd.env(var, proxy);
            }
        }
        cmd.args([BIN_MAKECHROOTPKG, "-c", "-r"])
            .arg(self.dirs.chroot_dir(&target.name))
            .current_dir(self.dirs.target_build_dir(&target.name));
        cmd
    }
}

#[async_trait]
impl BuildBackend for ChrootBackend {
    async fn setup(&self, targets: &[Arc<Target>]) -> Result<(), RepowrightError> {
        self.initialize(targets).await
    }

    async fn fetch_recipe(
        &self,
        locator: &RecipeLocator,
        proxy: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        self.fetcher.fetch(locator, proxy).await
    }

    fn environment_root(&self, target: &Target) -> PathBuf {
        self.dirs.chroot_root(&target.name)
    }

    async fn sync_environment(&self, target: &Target, log: &LogSink) -> Result<(), BackendError> {
        let root = self.dirs.chroot_root(&target.name);
        let cmd = CommandRunner::sudo(
            &self.user,
            &self.group,
            BIN_ARCH_NSPAWN,
            [
                root.as_os_str(),
                BIN_PACMAN.as_ref(),
                "-Syu".as_ref(),
                "--noconfirm".as_ref(),
            ],
        );
        Ok(self.runner.run(cmd, log).await?)
    }

    async fn run_build(&self, target: &Target, log: &LogSink) -> Result<(), BackendError> {
        let proxy_conf = match &target.proxy {
            Some(proxy) => {
                let path = self.proxy_conf_path(target);
                let content = format!("[ProxyList]\n{}\n", proxychains_line(proxy)?);
                self.ephemeral.write(&path, content.as_bytes())?;
                Some(path)
            }
            None => None,
        };
        let cmd = self.build_command(target, proxy_conf.as_deref());
        Ok(self.runner.run(cmd, log).await?)
    }

    async fn list_artifacts(&self, target: &Target) -> Result<Vec<Artifact>, BackendError> {
        let dir = self.dirs.target_build_dir(&target.name);
        let artifacts = scan_artifacts(&dir)?;
        tracing::debug!("{} artifacts found for {}", artifacts.len(), target.name);
        Ok(artifacts)
    }
}

/// Translate a proxy URL into a proxychains `[ProxyList]` entry
pub fn proxychains_line(proxy: &str) -> Result<String, BackendError> {
    let invalid = |reason: &str| BackendError::Proxy {
        proxy: proxy.to_string(),
        reason: reason.to_string(),
    };
    let url = reqwest::Url::parse(proxy).map_err(|e| invalid(&e.to_string()))?;
    let kind = match url.scheme() {
        "http" | "https" => "http",
        "socks4" => "socks4",
        "socks5" | "socks5h" => "socks5",
        _ => return Err(invalid("unsupported scheme")),
    };
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port"))?;

    let mut line = format!("{kind} {host} {port}");
    if !url.username().is_empty() {
        line.push(' ');
        line.push_str(url.username());
        if let Some(password) = url.password() {
            line.push(' ');
            line.push_str(password);
        }
    }
    Ok(line)
}
