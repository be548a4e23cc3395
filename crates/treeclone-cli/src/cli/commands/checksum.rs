//! Checksum command: fingerprint a local file.

use anyhow::Result;
use std::path::Path;
use treeclone_core::checksum::{Fingerprinter, HashAlgorithm};

/// Print the digest the change detector would compute for `path`.
pub fn run_checksum(path: &Path, algorithm: HashAlgorithm) -> Result<()> {
    let digest = algorithm.fingerprint(path)?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
