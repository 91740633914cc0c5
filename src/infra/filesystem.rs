//! Filesystem operations
//!
//! Handles file and directory operations.

use std::path::Path;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read a file, returning `None` if it does not exist
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, FilesystemError> {
    match std::fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Write bytes to a file, creating parent directories
pub fn write_bytes(path: &Path, content: &[u8]) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Check if `path` holds exactly `content`
pub fn content_is(path: &Path, content: &[u8]) -> Result<bool, FilesystemError> {
    Ok(read_optional(path)?.is_some_and(|existing| existing == content))
}

/// Copy `source` over `dest` unless both already hold the same bytes
///
/// Returns `true` when `dest` was written.
pub fn reconcile_file(dest: &Path, source: &Path) -> Result<bool, FilesystemError> {
    let wanted = std::fs::read(source).map_err(|e| FilesystemError::ReadFile {
        path: source.to_path_buf(),
        error: e.to_string(),
    })?;
    if content_is(dest, &wanted)? {
        return Ok(false);
    }
    write_bytes(dest, &wanted)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_optional_missing() {
        let temp = TempDir::new().unwrap();
        assert!(read_optional(&temp.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_content_is() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        assert!(!content_is(&path, b"x").unwrap());
        std::fs::write(&path, b"x").unwrap();
        assert!(content_is(&path, b"x").unwrap());
        assert!(!content_is(&path, b"y").unwrap());
    }

    #[test]
    fn test_reconcile_only_writes_on_mismatch() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("makepkg.conf");
        let dest = temp.path().join("root/etc/makepkg.conf");
        std::fs::write(&source, "PKGEXT='.pkg.tar.zst'\n").unwrap();

        assert!(reconcile_file(&dest, &source).unwrap());
        assert!(!reconcile_file(&dest, &source).unwrap());

        std::fs::write(&dest, "tampered").unwrap();
        assert!(reconcile_file(&dest, &source).unwrap());
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "PKGEXT='.pkg.tar.zst'\n"
        );
    }

    #[test]
    fn test_reconcile_missing_source_is_error() {
        let temp = TempDir::new().unwrap();
        let result = reconcile_file(&temp.path().join("dest"), &temp.path().join("missing"));
        assert!(matches!(result, Err(FilesystemError::ReadFile { .. })));
    }
}
