//! Staging-file and staging-directory lifecycle.
//!
//! Downloads land in uniquely named files under the staging directory.
//! Creation uses `create_new` so a name collision fails instead of
//! clobbering another job's bytes, with a bounded retry on a fresh random
//! name. Both the per-job file and the directory itself are RAII guards:
//! the file disappears when its job resolves (or is discarded on any
//! error path), the directory disappears when the run ends.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Characters used for random staging file names.
const RAND_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a staging file name.
const NAME_LEN: usize = 12;

/// Maximum attempts to find an unused staging file name before giving up.
const MAX_CREATE_ATTEMPTS: u32 = 100;

/// Builds a random alphanumeric staging file name.
fn random_name() -> String {
    let mut random_bytes = [0u8; NAME_LEN];
    getrandom::fill(&mut random_bytes).expect("getrandom failed");

    random_bytes
        .iter()
        .map(|&b| RAND_CHARS[(b as usize) % RAND_CHARS.len()] as char)
        .collect()
}

/// Creates a new, empty, uniquely named file under `dir`.
///
/// Returns the open handle together with a guard that removes the file
/// when dropped.
pub(crate) fn create_staging_file(dir: &Path) -> io::Result<(File, StagingFile)> {
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let path = dir.join(random_name());

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, StagingFile { path })),
            Err(ref err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("failed to create staging file after {MAX_CREATE_ATTEMPTS} attempts in {}", dir.display()),
    ))
}

/// Owns one staged download on disk and removes it on drop.
///
/// Every path through the pipeline drops the guard exactly once: after a
/// job resolves, when a verification failure discards the item, or when
/// the queue rejects a job because the consumer is gone.
#[derive(Debug)]
pub(crate) struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        // Best effort: the directory guard sweeps up anything left behind.
        let _ = fs::remove_file(&self.path);
    }
}

/// Owns the staging directory for one run and removes it recursively on
/// drop, error paths included.
#[derive(Debug)]
pub(crate) struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Creates the directory (and any missing parents).
    pub(crate) fn create(path: &Path) -> io::Result<Self> {
        fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_owned(),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
