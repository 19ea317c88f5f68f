//! Fatal error taxonomy for a migration run.
//!
//! Per-object failures never appear here: they resolve into manifest
//! records and the pipeline keeps going. Everything in [`EngineError`]
//! terminates the run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Fatal, run-terminating failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration failed validation before any I/O happened.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The checkpoint journal could not be opened or committed.
    ///
    /// A commit failure aborts the producer: continuing without a durable
    /// marker would silently lose resumability.
    #[error(transparent)]
    Journal(#[from] journal::JournalError),

    /// A manifest log could not be created or appended to.
    #[error(transparent)]
    Manifest(#[from] manifest::ManifestError),

    /// A listing page could not be fetched from the source.
    ///
    /// Unlike a single object's download, a failed listing leaves the
    /// producer with no way to make progress.
    #[error("listing source objects: {source}")]
    Listing {
        /// Underlying store failure.
        source: store::StoreError,
    },

    /// The staging directory could not be created.
    #[error("creating staging directory {}: {source}", path.display())]
    StagingDir {
        /// Directory the run tried to create.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// A pipeline worker thread could not be spawned.
    #[error("spawning {worker} thread: {source}")]
    WorkerSpawn {
        /// Which worker failed to start.
        worker: &'static str,
        /// Underlying spawn failure.
        source: io::Error,
    },

    /// A pipeline worker thread panicked.
    #[error("{worker} thread panicked")]
    WorkerPanicked {
        /// Which worker died.
        worker: &'static str,
    },
}
