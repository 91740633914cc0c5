//! Working directory layout
//!
//! Everything repowright persists lives under one working directory:
//!
//! ```text
//! <dir>/
//!   building/<name>/PKGBUILD          applied recipe
//!   building/<name>/chroot/root/      clean chroot
//!   logs/<name>/<unix-seconds>.log    one log per run
//!   markers/<name>.done               success marker
//! ```

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::defaults::{
    DIR_BUILDING, DIR_CHROOT, DIR_LOGS, DIR_MARKERS, DIR_ROOT, MARKER_EXTENSION, RECIPE_FILE,
};
use crate::error::FilesystemError;
use crate::infra::filesystem::create_dir_all;

/// Paths under the working directory
#[derive(Debug, Clone)]
pub struct WorkDirs {
    root: PathBuf,
}

impl WorkDirs {
    /// Create a layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Working directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parent of all target build directories
    pub fn building_dir(&self) -> PathBuf {
        self.root.join(DIR_BUILDING)
    }

    /// Parent of all target log directories
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(DIR_LOGS)
    }

    /// Directory holding success markers
    pub fn markers_dir(&self) -> PathBuf {
        self.root.join(DIR_MARKERS)
    }

    /// Build directory of a target
    pub fn target_build_dir(&self, name: &str) -> PathBuf {
        self.building_dir().join(name)
    }

    /// Log directory of a target
    pub fn target_logs_dir(&self, name: &str) -> PathBuf {
        self.logs_dir().join(name)
    }

    /// Chroot directory passed to `makechrootpkg -r`
    pub fn chroot_dir(&self, name: &str) -> PathBuf {
        self.target_build_dir(name).join(DIR_CHROOT)
    }

    /// Root copy of the chroot
    pub fn chroot_root(&self, name: &str) -> PathBuf {
        self.chroot_dir(name).join(DIR_ROOT)
    }

    /// Applied recipe of a target
    pub fn recipe_path(&self, name: &str) -> PathBuf {
        self.target_build_dir(name).join(RECIPE_FILE)
    }

    /// Success marker of a target
    pub fn marker_path(&self, name: &str) -> PathBuf {
        self.markers_dir()
            .join(format!("{name}.{MARKER_EXTENSION}"))
    }

    /// Fresh log path for a run of `name`, named by the current time
    pub fn new_log_path(&self, name: &str) -> PathBuf {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.target_logs_dir(name).join(format!("{secs}.log"))
    }

    /// Create the shared directories
    pub fn ensure(&self) -> Result<(), FilesystemError> {
        create_dir_all(&self.root)?;
        create_dir_all(&self.building_dir())?;
        create_dir_all(&self.logs_dir())?;
        create_dir_all(&self.markers_dir())
    }

    /// Create the directories owned by one target
    pub fn ensure_target(&self, name: &str) -> Result<(), FilesystemError> {
        create_dir_all(&self.target_build_dir(name))?;
        create_dir_all(&self.target_logs_dir(name))?;
        create_dir_all(&self.chroot_dir(name))
    }
}
