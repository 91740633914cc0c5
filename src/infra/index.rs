//! Repository database updates

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::core::settings::SignKey;
use crate::error::CommandError;
use crate::infra::log_sink::LogSink;
use crate::infra::process::CommandRunner;

/// repo-add binary
pub const BIN_REPO_ADD: &str = "repo-add";

/// Shared index of published packages
///
/// Callers serialize `upsert`; implementations do not lock.
#[async_trait]
pub trait OutputIndex: Send + Sync {
    /// Add `artifact` to the index, replacing older versions of the package
    async fn upsert(&self, artifact: &Path, log: &LogSink) -> Result<(), CommandError>;
}

/// Index maintained by `repo-add`, run as the build user
#[derive(Debug, Clone)]
pub struct RepoAddIndex {
    db: PathBuf,
    key: Option<SignKey>,
    user: String,
    group: String,
    runner: CommandRunner,
}

impl RepoAddIndex {
    /// Index at `db` updated as `user:group`, signed with `key` when given
    pub fn new(
        db: impl Into<PathBuf>,
        key: Option<SignKey>,
        user: impl Into<String>,
        group: impl Into<String>,
        runner: CommandRunner,
    ) -> Self {
        Self {
            db: db.into(),
            key,
            user: user.into(),
            group: group.into(),
            runner,
        }
    }

    /// Database path
    pub fn db(&self) -> &Path {
        &self.db
    }

    /// Build the repo-add invocation for `artifact`
    pub fn command(&self, artifact: &Path) -> std::process::Command {
        let mut cmd = CommandRunner::sudo(&self.user, &self.group, BIN_REPO_ADD, ["--remove"]);
        match &self.key {
            Some(SignKey::Default) => {
                cmd.args(["--verify", "--sign"]);
            }
            Some(SignKey::Named(key)) => {
                cmd.args(["--verify", "--sign", "--key", key]);
            }
            None => {}
        }
        cmd.arg(&self.db).arg(artifact);
        cmd
    }
}

#[async_trait]
impl OutputIndex for RepoAddIndex {
    async fn upsert(&self, artifact: &Path, log: &LogSink) -> Result<(), CommandError> {
        tracing::debug!("adding {} to {}", artifact.display(), self.db.display());
        self.runner.run(self.command(artifact), log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::process::describe;

    #[test]
    fn test_unsigned_command() {
        let index = RepoAddIndex::new(
            "/srv/x.db.tar.gz",
            None,
            "builder",
            "builder",
            CommandRunner::default(),
        );
        assert_eq!(
            describe(&index.command(Path::new("/srv/a.pkg.tar.zst"))),
            "sudo -u builder -g builder repo-add --remove /srv/x.db.tar.gz /srv/a.pkg.tar.zst"
        );
    }

    #[test]
    fn test_signed_commands() {
        let index = RepoAddIndex::new(
            "x.db.tar.gz",
            Some(SignKey::Default),
            "builder",
            "builder",
            CommandRunner::default(),
        );
        assert_eq!(
            describe(&index.command(Path::new("a.pkg.tar.zst"))),
            "sudo -u builder -g builder repo-add --remove --verify --sign x.db.tar.gz a.pkg.tar.zst"
        );

        let index = RepoAddIndex::new(
            "x.db.tar.gz",
            Some(SignKey::Named("K1".into())),
            "builder",
            "builder",
            CommandRunner::default(),
        );
        assert_eq!(
            describe(&index.command(Path::new("a.pkg.tar.zst"))),
            "sudo -u builder -g builder repo-add --remove --verify --sign --key K1 x.db.tar.gz a.pkg.tar.zst"
        );
    }
}
