//! Artifact publishing
//!
//! Signs built packages, moves them into the output directory and adds them
//! to the output index. Index updates are serialized across all pipelines.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::target::Target;
use crate::error::PublishError;
use crate::infra::backend::Artifact;
use crate::infra::index::OutputIndex;
use crate::infra::log_sink::LogSink;
use crate::infra::signer::Signer;

/// Publishes artifacts into the shared output store
pub struct Publisher {
    output_dir: PathBuf,
    signer: Arc<dyn Signer>,
    index: Arc<dyn OutputIndex>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("output_dir", &self.output_dir)
            .field("signing", &self.signer.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Publish into `output_dir` using `signer` and `index`
    pub fn new(
        output_dir: impl Into<PathBuf>,
        signer: Arc<dyn Signer>,
        index: Arc<dyn OutputIndex>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            signer,
            index,
            lock: Mutex::new(()),
        }
    }

    /// Output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Publish the packages among `artifacts`
    ///
    /// Returns the published package paths in the output directory.
    pub async fn publish(
        &self,
        target: &Target,
        artifacts: &[Artifact],
        log: &LogSink,
    ) -> Result<Vec<PathBuf>, PublishError> {
        let packages: Vec<&Path> = artifacts
            .iter()
            .filter(|a| !a.is_signature)
            .map(|a| a.path.as_path())
            .collect();
        if packages.is_empty() {
            return Err(PublishError::NoArtifacts {
                target: target.name.clone(),
            });
        }

        let signing = self.signer.is_enabled();
        if signing {
            for package in &packages {
                log.note(&format!("signing {}", package.display()));
                self.signer
                    .sign(package, log)
                    .await
                    .map_err(|source| PublishError::Sign {
                        path: package.to_path_buf(),
                        source,
                    })?;
            }
        }

        let _guard = self.lock.lock().await;
        tracing::debug!("{} holds the index lock", target.name);

        let mut published = Vec::with_capacity(packages.len());
        for package in &packages {
            published.push(self.move_into_output(package).await?);
            if signing {
                self.move_into_output(&signature_path(package)).await?;
            }
        }
        for package in &published {
            log.note(&format!("adding {} to the index", package.display()));
            self.index
                .upsert(package, log)
                .await
                .map_err(|source| PublishError::Index {
                    path: package.clone(),
                    source,
                })?;
        }
        Ok(published)
    }

    async fn move_into_output(&self, from: &Path) -> Result<PathBuf, PublishError> {
        let to = match from.file_name() {
            Some(name) => self.output_dir.join(name),
            None => {
                return Err(PublishError::Copy {
                    from: from.to_path_buf(),
                    to: self.output_dir.clone(),
                    error: "not a file".to_string(),
                })
            }
        };
        let copy_error = |e: std::io::Error| PublishError::Copy {
            from: from.to_path_buf(),
            to: to.clone(),
            error: e.to_string(),
        };
        tokio::fs::copy(from, &to).await.map_err(copy_error)?;
        tokio::fs::remove_file(from).await.map_err(copy_error)?;
        Ok(to)
    }
}

/// Detached signature path of `package`
pub fn signature_path(package: &Path) -> PathBuf {
    let mut name = package.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}
