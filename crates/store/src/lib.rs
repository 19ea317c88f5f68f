#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Source and destination blob-store interfaces.
//!
//! The migration engine is written against two narrow traits:
//! [`SourceStore`] pages through an ordered listing and opens object streams,
//! [`DestinationStore`] answers existence checks and accepts uploads. Vendor
//! SDK clients, authentication, and transport retries all live behind these
//! seams; this crate ships [`local`] filesystem implementations so the
//! pipeline runs and tests end to end without network credentials.
//!
//! Listing is marker-based: each page carries an opaque continuation token,
//! the empty string starts from the beginning, and an absent `next_marker`
//! means the listing is complete.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::SystemTime;

use thiserror::Error;

pub mod local;

pub use local::{LocalDestinationStore, LocalSourceStore};

/// One listed object: its key plus the metadata the listing reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// `/`-separated object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last-modified time, when the store reports one.
    pub last_modified: Option<SystemTime>,
}

/// One page of a marker-based listing.
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// Items in listing order.
    pub items: Vec<ObjectSummary>,
    /// Token resuming after this page; `None` when the listing is complete.
    pub next_marker: Option<String>,
}

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem or transport I/O failed.
    #[error("store I/O error at {}: {source}", path.display())]
    Io {
        /// Path the failed operation touched.
        path: PathBuf,
        /// The failed operation's error.
        #[source]
        source: io::Error,
    },

    /// Requested object does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// The missing object's key.
        key: String,
    },

    /// Key cannot be mapped to a storable location.
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// What made it unusable.
        reason: &'static str,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_key(key: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason,
        }
    }
}

/// Paged, ordered view of the objects to migrate.
pub trait SourceStore {
    /// Fetches up to `page_size` items starting after `marker` (empty marker
    /// starts from the beginning), honoring an optional key-prefix filter.
    fn list_page(
        &self,
        marker: &str,
        page_size: usize,
        prefix: Option<&str>,
    ) -> Result<ListingPage, StoreError>;

    /// Opens the object's content for streaming reads.
    fn open_object(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError>;
}

/// Write side of the migration: container management, existence checks, and
/// uploads.
pub trait DestinationStore {
    /// Creates the destination container when it does not exist yet.
    fn ensure_container(&mut self) -> Result<(), StoreError>;

    /// Whether an object is already stored under `name`.
    fn object_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Stores `reader`'s bytes under `name` and returns the checksum the
    /// store recorded for them (MD5, standard padded base64).
    fn put_object(&mut self, name: &str, reader: &mut dyn Read) -> Result<String, StoreError>;
}
