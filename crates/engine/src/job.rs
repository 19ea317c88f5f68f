//! The unit of work handed from the producer to the consumer.

use crate::staging::StagingFile;

/// One staged object waiting for upload.
///
/// The job owns its staging file: when the job is dropped, resolved or
/// not, the staged bytes are removed from disk.
#[derive(Debug)]
pub(crate) struct TransferJob {
    /// Destination object name (the full source key).
    pub(crate) name: String,
    /// Guard over the staged download on local disk.
    pub(crate) staging: StagingFile,
    /// Base64 MD5 of the staged bytes, compared against the checksum the
    /// destination reports after upload.
    pub(crate) content_md5: String,
}
