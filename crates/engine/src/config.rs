//! Run configuration and its validation.

use std::path::PathBuf;

use thiserror::Error;

/// Default number of source objects requested per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 8;
/// Default capacity of the bounded job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
/// Default cap on the number of objects considered across the whole run.
pub const DEFAULT_MAX_ITEMS: u64 = 10;
/// Default file name of the checkpoint journal.
pub const DEFAULT_JOURNAL_FILE: &str = "Marker.bin";
/// Default directory that receives the per-run manifest logs.
pub const DEFAULT_MANIFEST_DIR: &str = ".";
/// Default directory for staged downloads, removed when the run ends.
pub const DEFAULT_STAGING_DIR: &str = "TempFolder";

/// Rejected configuration value.
///
/// All variants are fatal and reported before any file or store I/O
/// happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The listing page size was zero.
    #[error("page size must be at least 1")]
    PageSize,
    /// The job queue capacity was zero.
    #[error("queue capacity must be at least 1")]
    QueueCapacity,
    /// The run-wide item cap was zero.
    #[error("item cap must be at least 1")]
    MaxItems,
}

/// Tunable parameters of a migration run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Objects requested per listing page.
    pub page_size: usize,
    /// Bounded queue capacity between producer and consumer.
    pub queue_capacity: usize,
    /// Maximum number of listed objects considered across the run.
    pub max_items: u64,
    /// Optional key prefix filter applied while listing the source.
    pub key_prefix: Option<String>,
    /// Path of the checkpoint journal file.
    pub journal_path: PathBuf,
    /// Directory that receives the two per-run manifest logs.
    pub manifest_dir: PathBuf,
    /// Directory for staged downloads, created at run start and removed
    /// recursively at run end.
    pub staging_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_items: DEFAULT_MAX_ITEMS,
            key_prefix: None,
            journal_path: PathBuf::from(DEFAULT_JOURNAL_FILE),
            manifest_dir: PathBuf::from(DEFAULT_MANIFEST_DIR),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
        }
    }
}

impl RunConfig {
    /// Checks the numeric bounds, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::PageSize);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        if self.max_items == 0 {
            return Err(ConfigError::MaxItems);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(RunConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let mut config = RunConfig::default();
        config.page_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::PageSize));

        let mut config = RunConfig::default();
        config.queue_capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::QueueCapacity));

        let mut config = RunConfig::default();
        config.max_items = 0;
        assert_eq!(config.validate(), Err(ConfigError::MaxItems));
    }
}
