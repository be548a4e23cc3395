//! Manifest entry: the unit of work derived from one row.

use super::ManifestRow;

/// Required column holding the path relative to the source and destination roots.
pub const PATH_COLUMN: &str = "path";
/// Optional column with a precomputed fingerprint of the remote content.
pub const FILE_HASH_COLUMN: &str = "file_hash";

/// One resource to mirror. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub rel_path: String,
    pub file_hash: Option<String>,
}

impl Entry {
    pub fn new(rel_path: impl Into<String>, file_hash: Option<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            file_hash,
        }
    }

    /// Build an entry from a row. Returns None when the row has no usable `path`.
    pub fn from_row(row: &ManifestRow) -> Option<Entry> {
        let rel_path = row.get(PATH_COLUMN)?.trim();
        if rel_path.is_empty() {
            return None;
        }
        let file_hash = row
            .get(FILE_HASH_COLUMN)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        Some(Entry::new(rel_path, file_hash))
    }
}
