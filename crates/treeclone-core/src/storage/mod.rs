//! Local destination: existence checks, directory creation and atomic writes.
//!
//! A fetched body is written to `<final>.part`, synced, then renamed onto the
//! final path so a partially written file is never visible under its real name.

mod writer;

pub use writer::StorageWriter;

use std::io;
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `a/b.json` → `a/b.json.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Filesystem operations the clone engine needs. Failures surface as store errors.
pub trait LocalStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<(), StoreError>;
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), StoreError>;
}

/// [`LocalStore`] on the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl LocalStore for FsStore {
    fn exists(&self, path: &Path) -> bool {
        // Only NotFound counts as absent.
        match std::fs::symlink_metadata(path) {
            Ok(_) => true,
            Err(e) => e.kind() != io::ErrorKind::NotFound,
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), StoreError> {
        std::fs::create_dir_all(path).map_err(|source| StoreError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let write = || -> io::Result<()> {
            let mut writer = StorageWriter::create(path)?;
            writer.write_all(data)?;
            writer.finalize(path)
        };
        write().map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("file.json"));
        assert_eq!(p.to_string_lossy(), "file.json.part");
        let p2 = temp_path(Path::new("/tmp/a/b.geojson"));
        assert_eq!(p2.to_string_lossy(), "/tmp/a/b.geojson.part");
    }

    #[test]
    fn write_file_replaces_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let store = FsStore;
        assert!(!store.exists(&path));

        store.write_file(&path, b"first").unwrap();
        store.write_file(&path, b"second").unwrap();

        assert!(store.exists(&path));
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn create_dir_all_is_recursive_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        FsStore.create_dir_all(&nested).unwrap();
        FsStore.create_dir_all(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn write_into_missing_dir_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing/out.json");
        let err = FsStore.write_file(&path, b"x").unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn dropped_writer_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aborted.json");
        {
            let mut w = StorageWriter::create(&path).unwrap();
            w.write_all(b"partial").unwrap();
            assert!(w.temp_path().exists());
        }
        assert!(!temp_path(&path).exists());
        assert!(!path.exists());
    }
}
