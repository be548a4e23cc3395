//! Temp-file writer: write the whole body to `<final>.part`, sync, then rename.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::temp_path;

/// Open temp file for one entry. Dropping it without `finalize` removes the temp file.
pub struct StorageWriter {
    file: Option<File>,
    temp_path: PathBuf,
}

impl StorageWriter {
    /// Create the temp file next to `final_path`. Overwrites a stale temp file if one exists.
    pub fn create(final_path: &Path) -> io::Result<Self> {
        let temp_path = temp_path(final_path);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        Ok(Self {
            file: Some(file),
            temp_path,
        })
    }

    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.write_all(data),
            None => Err(io::Error::new(io::ErrorKind::Other, "writer already finalized")),
        }
    }

    /// Path to the current temp file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Sync and atomically rename the temp file onto `final_path`. Consumes the writer.
    pub fn finalize(mut self, final_path: &Path) -> io::Result<()> {
        let file = self.file.take();
        let synced = file.as_ref().map_or(Ok(()), File::sync_all);
        // Closed before rename on some platforms.
        drop(file);
        let result = synced.and_then(|()| std::fs::rename(&self.temp_path, final_path));
        if result.is_err() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
        result
    }
}

impl Drop for StorageWriter {
    fn drop(&mut self) {
        // Still holding the file means finalize never ran.
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
