//! Manifest reading: a CSV file with a header line, one row per remote resource.
//!
//! Rows are produced lazily and the reader cannot be restarted. Only the
//! `path` column is required; `file_hash` (when present and non-empty) is the
//! remote fingerprint to compare against the origin's ETag.

mod entry;

pub use entry::{Entry, FILE_HASH_COLUMN, PATH_COLUMN};

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Error reading the manifest. Always fatal for the job that owns the reader.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot open manifest {}: {source}", .path.display())]
    Open { path: PathBuf, source: csv::Error },
    #[error("manifest has no header row or an unreadable one: {0}")]
    Header(csv::Error),
    #[error("malformed manifest row{}: {source}", line_suffix(.line))]
    Row { line: Option<u64>, source: csv::Error },
}

fn line_suffix(line: &Option<u64>) -> String {
    line.map(|l| format!(" at line {}", l)).unwrap_or_default()
}

/// One manifest row: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestRow(HashMap<String, String>);

impl ManifestRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ManifestRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ManifestRow(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Lazy row reader over a CSV source.
pub struct ManifestReader<R: io::Read> {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<R>,
}

impl ManifestReader<File> {
    /// Open a manifest file. Fails if the file is missing or has no readable header.
    pub fn open(path: &Path) -> Result<Self, ManifestError> {
        let reader = builder()
            .from_path(path)
            .map_err(|source| ManifestError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_csv(reader)
    }
}

impl<R: io::Read> ManifestReader<R> {
    /// Read a manifest from any byte source (tests, stdin).
    pub fn from_reader(rdr: R) -> Result<Self, ManifestError> {
        Self::from_csv(builder().from_reader(rdr))
    }

    fn from_csv(mut reader: csv::Reader<R>) -> Result<Self, ManifestError> {
        let headers = reader
            .headers()
            .map_err(ManifestError::Header)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        Ok(Self {
            headers,
            records: reader.into_records(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: io::Read> Iterator for ManifestReader<R> {
    type Item = Result<ManifestRow, ManifestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(r) => r,
            Err(source) => {
                let line = source.position().map(|p| p.line());
                return Some(Err(ManifestError::Row { line, source }));
            }
        };
        let row = self
            .headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        Some(Ok(row))
    }
}

fn builder() -> csv::ReaderBuilder {
    let mut b = csv::ReaderBuilder::new();
    // Short rows are tolerated; missing trailing columns just mean no value.
    b.has_headers(true).flexible(true).trim(csv::Trim::All);
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &str) -> Vec<ManifestRow> {
        ManifestReader::from_reader(data.as_bytes())
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn reads_rows_keyed_by_header() {
        let r = rows("id,path,file_hash\n1,a/b.json,abc\n2,c/d.json,\n");
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].get("path"), Some("a/b.json"));
        assert_eq!(r[0].get("file_hash"), Some("abc"));
        assert_eq!(r[1].get("file_hash"), Some(""));
        assert_eq!(r[1].get("id"), Some("2"));
    }

    #[test]
    fn short_rows_are_tolerated() {
        let r = rows("path,file_hash,lastmod\nx.json\n");
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].get("path"), Some("x.json"));
        assert_eq!(r[0].get("file_hash"), None);
    }

    #[test]
    fn quoted_fields() {
        let r = rows("path,name\n\"a/with, comma.json\",\"x\"\n");
        assert_eq!(r[0].get("path"), Some("a/with, comma.json"));
    }

    #[test]
    fn headers_are_exposed() {
        let reader = ManifestReader::from_reader("path,file_hash\n".as_bytes()).unwrap();
        assert_eq!(reader.headers(), &["path".to_string(), "file_hash".to_string()]);
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManifestReader::open(&dir.path().join("missing.csv"))
            .err()
            .expect("should fail");
        assert!(matches!(err, ManifestError::Open { .. }));
    }

    #[test]
    fn invalid_utf8_row_is_an_error() {
        let mut data = b"path\n".to_vec();
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
        let mut reader = ManifestReader::from_reader(&data[..]).unwrap();
        assert!(matches!(reader.next(), Some(Err(ManifestError::Row { .. }))));
    }
}
