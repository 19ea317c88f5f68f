#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Per-run append-only logs of object migration outcomes.
//!
//! Each run opens a fresh pair of UTF-8 text logs sharing one wall-clock
//! prefix: `{timestamp}Transferred.log` lists successfully migrated object
//! names, one per line, and `{timestamp}Failed.log` lists failures as
//! `name$reason`. Producer and consumer threads append concurrently; every
//! record is handed to the file as a single whole-line write followed by a
//! flush under the writer's mutex, so lines never interleave and a record
//! survives the process dying right after the append returns.
//!
//! Together with the checkpoint journal, these logs are the durable record
//! a run leaves behind: the journal says where listing resumes, the
//! manifests say which objects reached a terminal state.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

const TRANSFERRED_SUFFIX: &str = "Transferred.log";
const FAILED_SUFFIX: &str = "Failed.log";
const FAILURE_DELIMITER: char = '$';

/// Timestamp prefix shared by the two log files of one run.
const MANIFEST_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]-[hour]-[minute]-[second]");

/// Reason token recorded for an object that did not transfer.
///
/// The rendered tokens are part of the persisted manifest format and are
/// never reworded (including the historical `MissMatch` spelling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Downloading from the source store failed.
    DownloadFailed,
    /// Downloaded bytes did not match the digest embedded in the key.
    DownloadContentMissMatch,
    /// Uploading to the destination store failed.
    UploadFailed,
    /// Destination reported a stored checksum that differs from the staged
    /// content's digest.
    UploadContentMissMatch,
    /// Destination object already exists; skipped without overwriting.
    DestAlreadyExist,
}

impl FailureKind {
    /// The exact token written to the failed log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DownloadFailed => "DownloadFailed",
            Self::DownloadContentMissMatch => "DownloadContentMissMatch",
            Self::UploadFailed => "UploadFailed",
            Self::UploadContentMissMatch => "UploadContentMissMatch",
            Self::DestAlreadyExist => "DestAlreadyExist",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced while creating or appending to the outcome logs.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Creating or appending to a log file failed.
    #[error("manifest I/O error at {}: {source}", path.display())]
    Io {
        /// Log file path.
        path: PathBuf,
        /// The failed operation's error.
        #[source]
        source: io::Error,
    },

    /// The shared timestamp prefix could not be rendered.
    #[error("manifest timestamp could not be formatted: {0}")]
    Timestamp(#[from] time::error::Format),
}

struct LogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogFile {
    fn create(path: PathBuf) -> Result<Self, ManifestError> {
        let file = File::create(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn append_line(&self, line: &str) -> Result<(), ManifestError> {
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');

        let mut file = self.file.lock().expect("manifest writer lock poisoned");
        file.write_all(record.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ManifestError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// The pair of outcome logs for one migration run.
///
/// Appends take `&self`; the producer and consumer share one `Manifest`.
pub struct Manifest {
    transferred: LogFile,
    failed: LogFile,
}

impl Manifest {
    /// Creates both logs in `dir`, named with a shared timestamp prefix.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Io`] when either file cannot be created.
    pub fn create(dir: &Path) -> Result<Self, ManifestError> {
        let timestamp = OffsetDateTime::from(SystemTime::now()).format(MANIFEST_TIMESTAMP_FORMAT)?;
        Ok(Self {
            transferred: LogFile::create(dir.join(format!("{timestamp}{TRANSFERRED_SUFFIX}")))?,
            failed: LogFile::create(dir.join(format!("{timestamp}{FAILED_SUFFIX}")))?,
        })
    }

    /// Records a successfully migrated object.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Io`] when the append fails.
    pub fn record_transferred(&self, name: &str) -> Result<(), ManifestError> {
        self.transferred.append_line(name)
    }

    /// Records a terminally failed (or skipped) object with its reason token.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Io`] when the append fails.
    pub fn record_failed(&self, name: &str, kind: FailureKind) -> Result<(), ManifestError> {
        self.failed
            .append_line(&format!("{name}{FAILURE_DELIMITER}{kind}"))
    }

    /// Path of the success log.
    #[must_use]
    pub fn transferred_path(&self) -> &Path {
        &self.transferred.path
    }

    /// Path of the failure log.
    #[must_use]
    pub fn failed_path(&self) -> &Path {
        &self.failed.path
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn creates_log_pair_with_shared_prefix() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::create(dir.path()).unwrap();

        let transferred = manifest.transferred_path().file_name().unwrap().to_str().unwrap();
        let failed = manifest.failed_path().file_name().unwrap().to_str().unwrap();

        let prefix = transferred.strip_suffix(TRANSFERRED_SUFFIX).unwrap();
        assert_eq!(failed.strip_suffix(FAILED_SUFFIX).unwrap(), prefix);
        // yyyy-mm-dd-hh-mm-ss
        assert_eq!(prefix.len(), 19);
        assert!(manifest.transferred_path().exists());
        assert!(manifest.failed_path().exists());
    }

    #[test]
    fn records_are_written_one_per_line() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::create(dir.path()).unwrap();

        manifest.record_transferred("photos/cat.jpg").unwrap();
        manifest
            .record_failed("photos/dog.jpg", FailureKind::DownloadContentMissMatch)
            .unwrap();
        manifest.record_transferred("notes.txt").unwrap();
        manifest
            .record_failed("archive.tar", FailureKind::DestAlreadyExist)
            .unwrap();

        let transferred = fs::read_to_string(manifest.transferred_path()).unwrap();
        assert_eq!(transferred, "photos/cat.jpg\nnotes.txt\n");

        let failed = fs::read_to_string(manifest.failed_path()).unwrap();
        assert_eq!(
            failed,
            "photos/dog.jpg$DownloadContentMissMatch\narchive.tar$DestAlreadyExist\n"
        );
    }

    #[test]
    fn reason_tokens_match_the_persisted_format() {
        assert_eq!(FailureKind::DownloadFailed.as_str(), "DownloadFailed");
        assert_eq!(
            FailureKind::DownloadContentMissMatch.as_str(),
            "DownloadContentMissMatch"
        );
        assert_eq!(FailureKind::UploadFailed.as_str(), "UploadFailed");
        assert_eq!(
            FailureKind::UploadContentMissMatch.as_str(),
            "UploadContentMissMatch"
        );
        assert_eq!(FailureKind::DestAlreadyExist.as_str(), "DestAlreadyExist");
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::create(dir.path()).unwrap();

        thread::scope(|scope| {
            for worker in 0..8 {
                let manifest = &manifest;
                scope.spawn(move || {
                    for i in 0..50 {
                        manifest
                            .record_transferred(&format!("worker-{worker}/object-{i:03}"))
                            .unwrap();
                    }
                });
            }
        });

        let contents = fs::read_to_string(manifest.transferred_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 8 * 50);
        for worker in 0..8 {
            for i in 0..50 {
                let expected = format!("worker-{worker}/object-{i:03}");
                assert_eq!(
                    lines.iter().filter(|line| **line == expected).count(),
                    1,
                    "missing or torn record for {expected}"
                );
            }
        }
    }
}
