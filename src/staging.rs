//! Temp-file staging for uploaded blobs.
//!
//! Side helper for consumers that receive file payloads (composite binary
//! items, typically) and want them on disk: each blob lands in a staging
//! directory under a random file id with the original extension preserved,
//! so downstream tooling can open it by path while keeping the original
//! filename association. Not used by the routing core.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the staging helper.
#[derive(Debug, Error)]
pub enum StagingError {
    /// Filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// No staged file under that id.
    #[error("unknown file id: {0}")]
    UnknownId(String),
}

/// Opaque handle to one staged file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(String);

impl FileId {
    fn generate() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stages (original filename, bytes) pairs as temporary files.
///
/// With [`BlobStaging::new`] the staging directory itself is temporary and
/// vanishes when the helper is dropped; [`BlobStaging::with_dir`] stages
/// into a caller-owned directory and removes only the staged files.
pub struct BlobStaging {
    dir: PathBuf,
    /// Keeps the auto-created directory alive (and deleted on drop).
    _temp: Option<TempDir>,
    files: Mutex<HashMap<FileId, (PathBuf, String)>>,
}

impl BlobStaging {
    /// Stage into a fresh temporary directory.
    pub fn new() -> Result<Self, StagingError> {
        let temp = TempDir::new()?;
        Ok(Self {
            dir: temp.path().to_path_buf(),
            _temp: Some(temp),
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Stage into `dir`, creating it if needed.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, _temp: None, files: Mutex::new(HashMap::new()) })
    }

    /// The staging directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one blob to the staging directory.
    ///
    /// The file is named by a random id, keeping `original_filename`'s
    /// extension so type-sniffing consumers still work.
    pub fn stage(&self, original_filename: &str, bytes: &[u8]) -> Result<FileId, StagingError> {
        let id = FileId::generate();
        let mut staged_name = id.to_string();
        if let Some(ext) = Path::new(original_filename).extension() {
            staged_name.push('.');
            staged_name.push_str(&ext.to_string_lossy());
        }
        let path = self.dir.join(staged_name);
        fs::write(&path, bytes)?;

        debug!(id = %id, path = %path.display(), original = original_filename, "staged blob");
        lock(&self.files).insert(id.clone(), (path, original_filename.to_owned()));
        Ok(id)
    }

    /// Stage a batch of (original filename, bytes) pairs, returning the
    /// (staged path, original filename) tuple per blob, in input order.
    pub fn stage_all(
        &self,
        items: &[(String, Vec<u8>)],
    ) -> Result<Vec<(PathBuf, String)>, StagingError> {
        let mut staged = Vec::with_capacity(items.len());
        for (original, bytes) in items {
            let id = self.stage(original, bytes)?;
            staged.push(self.file_info(&id)?);
        }
        Ok(staged)
    }

    /// Look up the (staged path, original filename) of one blob.
    pub fn file_info(&self, id: &FileId) -> Result<(PathBuf, String), StagingError> {
        lock(&self.files)
            .get(id)
            .cloned()
            .ok_or_else(|| StagingError::UnknownId(id.to_string()))
    }

    /// (staged path, original filename) for every staged blob.
    pub fn all_file_info(&self) -> Vec<(PathBuf, String)> {
        lock(&self.files).values().cloned().collect()
    }

    /// Number of staged blobs.
    pub fn len(&self) -> usize {
        lock(&self.files).len()
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unlink one staged file. Returns false when the id is unknown or the
    /// unlink fails.
    pub fn remove(&self, id: &FileId) -> bool {
        let mut files = lock(&self.files);
        let Some((path, _)) = files.get(id) else {
            return false;
        };
        if fs::remove_file(path).is_err() {
            return false;
        }
        files.remove(id);
        true
    }

    /// Unlink every staged file.
    pub fn cleanup(&self) {
        let mut files = lock(&self.files);
        for (id, (path, _)) in files.drain() {
            if let Err(e) = fs::remove_file(&path) {
                debug!(id = %id, error = %e, "staged file already gone");
            }
        }
    }
}

impl Drop for BlobStaging {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for BlobStaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStaging")
            .field("dir", &self.dir)
            .field("files", &self.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_preserves_extension() {
        let staging = BlobStaging::new().unwrap();
        let id = staging.stage("report.pdf", b"pdf bytes").unwrap();

        let (path, original) = staging.file_info(&id).unwrap();
        assert_eq!(original, "report.pdf");
        assert_eq!(path.extension().unwrap(), "pdf");
        assert!(path.starts_with(staging.dir()));
        assert_eq!(fs::read(&path).unwrap(), b"pdf bytes");
    }

    #[test]
    fn test_stage_without_extension() {
        let staging = BlobStaging::new().unwrap();
        let id = staging.stage("README", b"plain").unwrap();
        let (path, _) = staging.file_info(&id).unwrap();
        assert!(path.extension().is_none());
    }

    #[test]
    fn test_stage_all_keeps_order() {
        let staging = BlobStaging::new().unwrap();
        let items = vec![
            ("a.txt".to_owned(), b"one".to_vec()),
            ("b.png".to_owned(), b"two".to_vec()),
        ];
        let staged = staging.stage_all(&items).unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0].1, "a.txt");
        assert_eq!(staged[1].1, "b.png");
        assert_eq!(staging.all_file_info().len(), 2);
    }

    #[test]
    fn test_remove() {
        let staging = BlobStaging::new().unwrap();
        let id = staging.stage("x.bin", b"x").unwrap();
        let (path, _) = staging.file_info(&id).unwrap();

        assert!(staging.remove(&id));
        assert!(!path.exists());
        assert!(!staging.remove(&id));
        assert!(matches!(staging.file_info(&id), Err(StagingError::UnknownId(_))));
    }

    #[test]
    fn test_cleanup_unlinks_everything() {
        let staging = BlobStaging::with_dir(std::env::temp_dir().join("hag-staging-test")).unwrap();
        let a = staging.stage("a.txt", b"a").unwrap();
        let b = staging.stage("b.txt", b"b").unwrap();
        let path_a = staging.file_info(&a).unwrap().0;
        let path_b = staging.file_info(&b).unwrap().0;

        staging.cleanup();
        assert!(staging.is_empty());
        assert!(!path_a.exists());
        assert!(!path_b.exists());
    }

    #[test]
    fn test_temp_dir_vanishes_on_drop() {
        let dir;
        {
            let staging = BlobStaging::new().unwrap();
            dir = staging.dir().to_path_buf();
            staging.stage("x.txt", b"x").unwrap();
            assert!(dir.exists());
        }
        assert!(!dir.exists());
    }
}
