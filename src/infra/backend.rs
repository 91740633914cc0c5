//! Build backend abstraction
//!
//! The pipeline talks to the build environment only through [`BuildBackend`],
//! so tests can drive it with a scripted fake while production uses the
//! chroot tools.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::defaults::{PACKAGE_SUFFIX, SIGNATURE_SUFFIX};
use crate::core::target::{RecipeLocator, Target};
use crate::error::{BackendError, FetchError, RepowrightError};
use crate::infra::log_sink::LogSink;

/// A file produced by a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Location in the build directory
    pub path: PathBuf,
    /// Detached signature rather than a package
    pub is_signature: bool,
}

impl Artifact {
    /// Classify `path` by its suffix; `None` for unrelated files
    pub fn classify(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(SIGNATURE_SUFFIX) {
            Some(Self {
                path: path.to_path_buf(),
                is_signature: true,
            })
        } else if name.ends_with(PACKAGE_SUFFIX) {
            Some(Self {
                path: path.to_path_buf(),
                is_signature: false,
            })
        } else {
            None
        }
    }

    /// File name of the artifact
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }
}

/// Environment in which a target's recipe is fetched and built
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// One-time setup of the environments of `targets`, before any pass
    async fn setup(&self, _targets: &[Arc<Target>]) -> Result<(), RepowrightError> {
        Ok(())
    }

    /// Obtain the current recipe snapshot
    async fn fetch_recipe(
        &self,
        locator: &RecipeLocator,
        proxy: Option<&str>,
    ) -> Result<Vec<u8>, FetchError>;

    /// Root directory that environment config files are reconciled into
    fn environment_root(&self, target: &Target) -> PathBuf;

    /// Bring the environment's system up to date
    async fn sync_environment(&self, target: &Target, log: &LogSink) -> Result<(), BackendError>;

    /// Run the build tool for `target`
    async fn run_build(&self, target: &Target, log: &LogSink) -> Result<(), BackendError>;

    /// Packages and signatures left in the build directory
    async fn list_artifacts(&self, target: &Target) -> Result<Vec<Artifact>, BackendError>;
}

/// Artifacts directly inside `dir`, sorted by path
pub fn scan_artifacts(dir: &Path) -> Result<Vec<Artifact>, BackendError> {
    let to_error = |e: std::io::Error| BackendError::Io {
        path: dir.to_path_buf(),
        error: e.to_string(),
    };
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(to_error)? {
        let entry = entry.map_err(to_error)?;
        if !entry.file_type().map_err(to_error)?.is_file() {
            continue;
        }
        if let Some(artifact) = Artifact::classify(&entry.path()) {
            artifacts.push(artifact);
        }
    }
    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify() {
        let pkg = Artifact::classify(Path::new("/b/yay-12.0-1-x86_64.pkg.tar.zst")).unwrap();
        assert!(!pkg.is_signature);
        let sig = Artifact::classify(Path::new("/b/yay-12.0-1-x86_64.pkg.tar.zst.sig")).unwrap();
        assert!(sig.is_signature);
        assert!(Artifact::classify(Path::new("/b/PKGBUILD")).is_none());
        assert!(Artifact::classify(Path::new("/b/yay.tar.gz")).is_none());
    }

    #[test]
    fn test_scan_skips_directories_and_other_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b-1-1-any.pkg.tar.zst"), b"").unwrap();
        std::fs::write(temp.path().join("a-1-1-any.pkg.tar.zst"), b"").unwrap();
        std::fs::write(temp.path().join("PKGBUILD"), b"").unwrap();
        std::fs::create_dir(temp.path().join("c.pkg.tar.zst")).unwrap();

        let names: Vec<_> = scan_artifacts(temp.path())
            .unwrap()
            .into_iter()
            .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a-1-1-any.pkg.tar.zst", "b-1-1-any.pkg.tar.zst"]);
    }
}
