//! Content-addressed staging of fragments that a tool can only read from disk.
//!
//! Files are named by the SHA-256 of their contents, so repeated renders of
//! the same header or footer reuse one file instead of piling up copies.

use std::env;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
}

impl Default for Staging {
    fn default() -> Self {
        Self::new(env::temp_dir().join("pdf-relay"))
    }
}

impl Staging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `contents` as `<sha256>.<extension>` and return its path.
    ///
    /// An existing file with the same name is reused untouched.
    pub fn stage(&self, contents: &[u8], extension: &str) -> Result<PathBuf> {
        let digest = hex::encode(Sha256::digest(contents));
        let path = self.dir.join(format!("{digest}.{extension}"));
        if path.is_file() {
            log::debug!("reusing staged {}", path.display());
            return Ok(path);
        }

        write_atomic(&self.dir, &path, contents)?;
        log::debug!("staged {} ({} bytes)", path.display(), contents.len());
        Ok(path)
    }
}

/// Write `contents` to `path` through a uniquely named temp file in `dir`,
/// so readers never see a partial file and concurrent writers never collide.
pub(crate) fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.flush()?;
    match file.persist(path) {
        Ok(_) => Ok(()),
        // Another writer got there first with the same contents.
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err.error.into()),
    }
}
