//! Content fingerprints: hex SHA-256 of a file's bytes.
//!
//! An absent file fingerprints to the empty string, a sentinel no real
//! digest can collide with. A [`Fingerprinter`] memoizes results so each
//! path is read at most once per reconciliation pass; planning and
//! execution then agree on the same digest even if the file changes
//! underneath them.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Fingerprint of a file that does not exist.
pub const ABSENT: &str = "";

/// Hash the full content of `path`, or return [`ABSENT`] if it does not exist.
///
/// I/O errors other than "not found" are returned.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ABSENT.to_string()),
        Err(e) => return Err(e),
    };
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Per-pass memo of file fingerprints.
#[derive(Debug, Default)]
pub struct Fingerprinter {
    cache: HashMap<PathBuf, String>,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint `path`, reading it only on first request.
    pub fn fingerprint(&mut self, path: &Path) -> io::Result<&str> {
        if !self.cache.contains_key(path) {
            let digest = file_sha256(path)?;
            self.cache.insert(path.to_path_buf(), digest);
        }
        Ok(self.cache[path].as_str())
    }
}
