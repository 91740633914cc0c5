//! Package signing

use async_trait::async_trait;
use std::path::Path;

use crate::core::settings::SignKey;
use crate::error::CommandError;
use crate::infra::log_sink::LogSink;
use crate::infra::process::CommandRunner;

/// gpg binary
pub const BIN_GPG: &str = "gpg";

/// Produces detached signatures next to artifacts
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `artifact`, leaving `<artifact>.sig` beside it
    async fn sign(&self, artifact: &Path, log: &LogSink) -> Result<(), CommandError>;

    /// Check if packages are signed at all
    fn is_enabled(&self) -> bool;
}

/// Signer used when no key is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

#[async_trait]
impl Signer for NoopSigner {
    async fn sign(&self, _artifact: &Path, _log: &LogSink) -> Result<(), CommandError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Signs with gpg as the build user, using that user's keyring
#[derive(Debug, Clone)]
pub struct GpgSigner {
    key: SignKey,
    user: String,
    group: String,
    runner: CommandRunner,
}

impl GpgSigner {
    /// Create a signer for `key` running as `user:group`
    pub fn new(
        key: SignKey,
        user: impl Into<String>,
        group: impl Into<String>,
        runner: CommandRunner,
    ) -> Self {
        Self {
            key,
            user: user.into(),
            group: group.into(),
            runner,
        }
    }

    /// Build the gpg invocation for `artifact`
    pub fn command(&self, artifact: &Path) -> std::process::Command {
        let mut cmd = CommandRunner::sudo(
            &self.user,
            &self.group,
            BIN_GPG,
            ["--sign", "--detach-sign", "--yes"],
        );
        if let SignKey::Named(key) = &self.key {
            cmd.args(["--default-key", key]);
        }
        cmd.arg(artifact);
        cmd
    }
}

#[async_trait]
impl Signer for GpgSigner {
    async fn sign(&self, artifact: &Path, log: &LogSink) -> Result<(), CommandError> {
        tracing::debug!("signing {}", artifact.display());
        self.runner.run(self.command(artifact), log).await
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
