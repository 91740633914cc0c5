//! Idempotency cache
//!
//! Decides whether a target can be skipped. A target is skipped only when a
//! success record exists whose content hash matches the current recipe
//! snapshot; anything else (no record, changed hash, unreadable marker)
//! forces a rebuild.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::CacheError;
use crate::infra::dirs::WorkDirs;
use crate::infra::fetch::compute_checksum;
use crate::infra::filesystem::{content_is, write_bytes};

/// Last known outcome of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Last pipeline reached `Done`
    Success,
    /// Marker present but unreadable
    Unknown,
}

/// Per-target idempotency record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// SHA-256 of the recipe that was built
    pub content_hash: Option<String>,
    /// Outcome of that build
    pub outcome: Outcome,
    /// Unix seconds of the record, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<u64>,
}

impl IdempotencyRecord {
    /// Success record for `snapshot`
    pub fn success(snapshot: &[u8]) -> Self {
        Self {
            content_hash: Some(compute_checksum(snapshot)),
            outcome: Outcome::Success,
            recorded_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs()),
        }
    }

    /// Record standing in for an unreadable marker
    pub fn unknown() -> Self {
        Self {
            content_hash: None,
            outcome: Outcome::Unknown,
            recorded_at: None,
        }
    }

    /// Check if this record allows skipping a build of `hash`
    pub fn matches(&self, hash: &str) -> bool {
        self.outcome == Outcome::Success && self.content_hash.as_deref() == Some(hash)
    }
}

/// Storage for idempotency records
pub trait IdempotencyStore: Send + Sync {
    /// Record of `name`, if any
    fn load(&self, name: &str) -> Result<Option<IdempotencyRecord>, CacheError>;

    /// Create or overwrite the record of `name`
    fn store(&self, name: &str, record: &IdempotencyRecord) -> Result<(), CacheError>;

    /// Delete the record of `name`; returns whether one existed
    fn remove(&self, name: &str) -> Result<bool, CacheError>;
}

/// One JSON marker file per target under `markers/`
#[derive(Debug, Clone)]
pub struct MarkerStore {
    dirs: WorkDirs,
}

impl MarkerStore {
    /// Store markers in the layout of `dirs`
    pub fn new(dirs: WorkDirs) -> Self {
        Self { dirs }
    }

    fn io_error(path: PathBuf, e: &std::io::Error) -> CacheError {
        CacheError::Io {
            path,
            error: e.to_string(),
        }
    }
}

impl IdempotencyStore for MarkerStore {
    fn load(&self, name: &str) -> Result<Option<IdempotencyRecord>, CacheError> {
        let path = self.dirs.marker_path(name);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(path, &e)),
        };
        match serde_json::from_slice(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!("marker {} is unreadable: {e}", path.display());
                Ok(Some(IdempotencyRecord::unknown()))
            }
        }
    }

    fn store(&self, name: &str, record: &IdempotencyRecord) -> Result<(), CacheError> {
        let path = self.dirs.marker_path(name);
        let dir = self.dirs.markers_dir();
        std::fs::create_dir_all(&dir).map_err(|e| Self::io_error(dir, &e))?;
        let content = serde_json::to_vec_pretty(record).map_err(|e| CacheError::Io {
            path: path.clone(),
            error: e.to_string(),
        })?;
        // Readers never see a partial marker
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content).map_err(|e| Self::io_error(tmp.clone(), &e))?;
        std::fs::rename(&tmp, &path).map_err(|e| Self::io_error(path, &e))
    }

    fn remove(&self, name: &str) -> Result<bool, CacheError> {
        let path = self.dirs.marker_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(path, &e)),
        }
    }
}

/// In-process record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Option<IdempotencyRecord>, CacheError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(name).cloned())
    }

    fn store(&self, name: &str, record: &IdempotencyRecord) -> Result<(), CacheError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(name.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool, CacheError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(name).is_some())
    }
}

/// Applied recipes plus idempotency records
#[derive(Clone)]
pub struct IdempotencyCache {
    store: Arc<dyn IdempotencyStore>,
    dirs: WorkDirs,
}

impl std::fmt::Debug for IdempotencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyCache")
            .field("dirs", &self.dirs)
            .finish_non_exhaustive()
    }
}

impl IdempotencyCache {
    /// Create a cache over `store`, applying recipes into `dirs`
    pub fn new(store: Arc<dyn IdempotencyStore>, dirs: WorkDirs) -> Self {
        Self { store, dirs }
    }

    /// Write `snapshot` as the applied recipe of `name` if it differs
    ///
    /// Returns `true` when the recipe was written.
    pub fn apply_snapshot(&self, name: &str, snapshot: &[u8]) -> Result<bool, CacheError> {
        let path = self.dirs.recipe_path(name);
        if path.is_dir() {
            return Err(CacheError::RecipeIsDirectory { path });
        }
        if content_is(&path, snapshot)? {
            return Ok(false);
        }
        write_bytes(&path, snapshot)?;
        tracing::debug!("applied new recipe for {name}");
        Ok(true)
    }

    /// Check if `name` can be skipped for `snapshot`
    pub fn should_skip(&self, name: &str, snapshot: &[u8]) -> Result<bool, CacheError> {
        let hash = compute_checksum(snapshot);
        Ok(self
            .store
            .load(name)?
            .is_some_and(|record| record.matches(&hash)))
    }

    /// Check if `name` has any success record
    pub fn has_success(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self
            .store
            .load(name)?
            .is_some_and(|record| record.outcome == Outcome::Success))
    }

    /// Record a successful build of `snapshot`
    pub fn record_success(&self, name: &str, snapshot: &[u8]) -> Result<(), CacheError> {
        self.store.store(name, &IdempotencyRecord::success(snapshot))
    }

    /// Drop the record of `name`, forcing its next build
    pub fn forget(&self, name: &str) -> Result<bool, CacheError> {
        self.store.remove(name)
    }

    /// Current record of `name`
    pub fn inspect(&self, name: &str) -> Result<Option<IdempotencyRecord>, CacheError> {
        self.store.load(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilesystemError;
    use crate::test_utils::generators::recipe;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn marker_cache(temp: &TempDir) -> IdempotencyCache {
        let dirs = WorkDirs::new(temp.path());
        IdempotencyCache::new(Arc::new(MarkerStore::new(dirs.clone())), dirs)
    }

    #[test]
    fn test_apply_snapshot_only_writes_changes() {
        let temp = TempDir::new().unwrap();
        let cache = marker_cache(&temp);

        assert!(cache.apply_snapshot("yay", b"pkgver=1").unwrap());
        assert!(!cache.apply_snapshot("yay", b"pkgver=1").unwrap());
        assert!(cache.apply_snapshot("yay", b"pkgver=2").unwrap());
        assert_eq!(
            std::fs::read(temp.path().join("building/yay/PKGBUILD")).unwrap(),
            b"pkgver=2"
        );
    }

    #[test]
    fn test_apply_snapshot_rejects_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("building/yay/PKGBUILD")).unwrap();
        let result = marker_cache(&temp).apply_snapshot("yay", b"x");
        assert!(matches!(result, Err(CacheError::RecipeIsDirectory { .. })));
    }

    #[test]
    fn test_apply_snapshot_reports_unwritable_build_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("building")).unwrap();
        std::fs::write(temp.path().join("building/yay"), b"file in the way").unwrap();

        let result = marker_cache(&temp).apply_snapshot("yay", b"x");
        assert!(matches!(
            result,
            Err(CacheError::Filesystem(FilesystemError::ReadFile { .. }))
        ));
    }

    #[test]
    fn test_should_skip_requires_matching_success() {
        let temp = TempDir::new().unwrap();
        let cache = marker_cache(&temp);

        assert!(!cache.should_skip("yay", b"v1").unwrap());
        cache.record_success("yay", b"v1").unwrap();
        assert!(cache.should_skip("yay", b"v1").unwrap());
        assert!(!cache.should_skip("yay", b"v2").unwrap());
        assert!(cache.has_success("yay").unwrap());
    }

    #[test]
    fn test_unreadable_marker_is_unknown() {
        let temp = TempDir::new().unwrap();
        let cache = marker_cache(&temp);
        std::fs::create_dir_all(temp.path().join("markers")).unwrap();
        std::fs::write(temp.path().join("markers/yay.done"), b"not json").unwrap();

        let record = cache.inspect("yay").unwrap().unwrap();
        assert_eq!(record.outcome, Outcome::Unknown);
        assert!(!cache.should_skip("yay", b"not json").unwrap());
        assert!(!cache.has_success("yay").unwrap());
    }

    #[test]
    fn test_forget() {
        let temp = TempDir::new().unwrap();
        let cache = marker_cache(&temp);
        cache.record_success("yay", b"v1").unwrap();

        assert!(cache.forget("yay").unwrap());
        assert!(!cache.forget("yay").unwrap());
        assert!(!cache.should_skip("yay", b"v1").unwrap());
    }

    #[test]
    fn test_memory_store() {
        let temp = TempDir::new().unwrap();
        let cache = IdempotencyCache::new(Arc::new(MemoryStore::new()), WorkDirs::new(temp.path()));
        cache.record_success("paru", b"v1").unwrap();
        assert!(cache.should_skip("paru", b"v1").unwrap());
        assert!(!temp.path().join("markers/paru.done").exists());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_any_change_forces_rebuild(old in recipe(), new in recipe()) {
            let temp = TempDir::new().unwrap();
            let cache = marker_cache(&temp);
            cache.apply_snapshot("yay", &old).unwrap();
            cache.record_success("yay", &old).unwrap();

            let changed = cache.apply_snapshot("yay", &new).unwrap();
            prop_assert_eq!(changed, old != new);
            prop_assert_eq!(cache.should_skip("yay", &new).unwrap(), old == new);
        }
    }
}
