//! Scoped temporary resources
//!
//! A [`ResourceSet`] is the ownership set of one in-flight request. The
//! session registry keeps a clone so that closing a session can purge files
//! of requests that never got to release them. [`ScopedTempFile`] deletes its
//! file exactly once, on `release()` or on drop, whichever comes first.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempPath;

/// Temporary files currently owned by one request
#[derive(Clone, Default)]
pub struct ResourceSet {
    paths: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, path: &Path) {
        self.paths.lock().insert(path.to_path_buf());
    }

    pub(crate) fn deregister(&self, path: &Path) {
        self.paths.lock().remove(path);
    }

    /// Number of files still owned
    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every file still owned and forget them
    ///
    /// Missing files are not an error. Returns how many files were removed.
    pub fn purge(&self) -> usize {
        let paths: Vec<PathBuf> = std::mem::take(&mut *self.paths.lock()).into_iter().collect();
        let mut removed = 0;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to purge temp file");
                }
            }
        }
        removed
    }
}

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.paths.lock().iter()).finish()
    }
}

/// A fetched document on disk, deleted when released or dropped
///
/// No file handle is kept open; readers reopen the path as needed.
pub struct ScopedTempFile {
    path: Option<TempPath>,
    location: PathBuf,
    resources: ResourceSet,
}

impl ScopedTempFile {
    pub(crate) fn new(path: TempPath, resources: &ResourceSet) -> Self {
        let location = path.to_path_buf();
        resources.register(&location);
        Self {
            path: Some(path),
            location,
            resources: resources.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.location
    }

    /// Whether the file has already been released
    pub fn is_released(&self) -> bool {
        self.path.is_none()
    }

    /// Delete the file now. Calling this more than once is a no-op.
    pub fn release(&mut self) -> std::io::Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        self.resources.deregister(&self.location);
        match path.close() {
            Ok(()) => Ok(()),
            // A session purge may have removed it first
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(path = %self.location.display(), error = %e, "Failed to delete temp file");
        }
    }
}

impl std::fmt::Debug for ScopedTempFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedTempFile")
            .field("path", &self.location)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scoped(dir: &TempDir, resources: &ResourceSet) -> ScopedTempFile {
        let file = tempfile::Builder::new()
            .prefix("pdfx-test-")
            .tempfile_in(dir.path())
            .unwrap();
        ScopedTempFile::new(file.into_temp_path(), resources)
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let resources = ResourceSet::new();
        let mut temp = scoped(&dir, &resources);
        let path = temp.path().to_path_buf();

        assert!(path.exists());
        assert_eq!(resources.len(), 1);

        temp.release().unwrap();
        temp.release().unwrap();

        assert!(!path.exists());
        assert!(resources.is_empty());
        assert!(temp.is_released());
    }

    #[test]
    fn test_drop_deletes_file() {
        let dir = TempDir::new().unwrap();
        let resources = ResourceSet::new();
        let path = {
            let temp = scoped(&dir, &resources);
            temp.path().to_path_buf()
        };

        assert!(!path.exists());
        assert!(resources.is_empty());
    }

    #[test]
    fn test_purge_then_release() {
        let dir = TempDir::new().unwrap();
        let resources = ResourceSet::new();
        let mut temp = scoped(&dir, &resources);
        let path = temp.path().to_path_buf();

        assert_eq!(resources.purge(), 1);
        assert!(!path.exists());

        // The owner still releases cleanly after a purge
        temp.release().unwrap();
        assert_eq!(resources.purge(), 0);
    }
}
