#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Resumable blob-migration pipeline.
//!
//! A run moves objects from a [`store::SourceStore`] to a
//! [`store::DestinationStore`] through two long-lived workers joined by a
//! bounded queue:
//!
//! ```text
//!             commit marker, list page, download + verify
//!  ┌──────────┐        ┌───────────────┐        ┌──────────┐
//!  │ producer │ ─────▶ │ bounded queue │ ─────▶ │ consumer │
//!  └──────────┘  jobs  └───────────────┘  jobs  └──────────┘
//!       │                                            │
//!       │ journal commits                            │ uploads + checksum
//!       ▼                                            ▼
//!  Marker.bin                            destination + manifest logs
//! ```
//!
//! The producer checkpoints its listing marker to the journal before each
//! page fetch, so an interrupted run resumes from the last committed
//! page. Each downloaded object is verified against the digest embedded
//! in its key before it becomes a job; the consumer verifies the
//! destination's checksum after each upload. Every considered object ends
//! up as exactly one line in the per-run manifest logs.
//!
//! Per-object failures are recorded and skipped. Only configuration,
//! journal, manifest, listing, and worker-lifecycle failures end the run,
//! as [`EngineError`].

mod config;
mod consumer;
mod coordinator;
mod error;
mod job;
mod producer;
mod queue;
mod run;
mod staging;

pub use config::{
    ConfigError, DEFAULT_JOURNAL_FILE, DEFAULT_MANIFEST_DIR, DEFAULT_MAX_ITEMS,
    DEFAULT_PAGE_SIZE, DEFAULT_QUEUE_CAPACITY, DEFAULT_STAGING_DIR, RunConfig,
};
pub use error::EngineError;
pub use run::{MigrationRun, RunSummary};
