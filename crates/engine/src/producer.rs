//! Listing side of the pipeline: pages the source, stages downloads,
//! verifies them, and feeds the job queue.
//!
//! The loop is commit-then-list: the marker used to fetch a page is
//! committed to the journal before that page's items are touched, so the
//! journal always holds the marker a resumed run needs for its next page
//! fetch. The trade-off is deliberate: a crash mid-page skips that
//! page's unprocessed remainder on resume.
//!
//! Download and verification failures are per-object: they become
//! manifest records and the listing keeps going. Only journal, manifest,
//! and listing failures abort the producer.

use std::io;

use checksums::{DigestPair, DualHasher, copy_and_hash};
use journal::Journal;
use manifest::{FailureKind, Manifest};
use store::{ObjectSummary, SourceStore};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::coordinator::Coordinator;
use crate::error::EngineError;
use crate::job::TransferJob;
use crate::queue::JobSender;
use crate::staging::{StagingFile, create_staging_file};

/// What the producer accomplished, for the run summary.
#[derive(Debug, Default)]
pub(crate) struct ProducerOutcome {
    /// Objects listed, each after its download attempt.
    pub(crate) listed: u64,
    /// Bytes staged to local disk, failed verifications included.
    pub(crate) bytes_downloaded: u64,
    /// Objects that failed to download or verify.
    pub(crate) download_failures: u64,
}

/// Runs the listing loop, then closes the queue and retires the
/// coordinator's listing unit on every exit path.
pub(crate) fn run(
    source: &dyn SourceStore,
    journal: &mut Journal,
    manifest: &Manifest,
    sender: JobSender<TransferJob>,
    coordinator: &Coordinator,
    config: &RunConfig,
) -> Result<ProducerOutcome, EngineError> {
    let outcome = list_and_stage(source, journal, manifest, &sender, config);
    sender.close();
    coordinator.done();
    outcome
}

fn list_and_stage(
    source: &dyn SourceStore,
    journal: &mut Journal,
    manifest: &Manifest,
    sender: &JobSender<TransferJob>,
    config: &RunConfig,
) -> Result<ProducerOutcome, EngineError> {
    let mut outcome = ProducerOutcome::default();
    let mut marker = journal.marker().to_owned();
    if !marker.is_empty() {
        info!(marker = %marker, "resuming listing from committed marker");
    }

    loop {
        // The journal must name this page's fetch marker before any of
        // its items are processed.
        journal.commit(&marker)?;

        let page = source
            .list_page(&marker, config.page_size, config.key_prefix.as_deref())
            .map_err(|source| EngineError::Listing { source })?;
        debug!(
            marker = %marker,
            items = page.items.len(),
            "fetched listing page"
        );

        for item in page.items {
            debug!(
                key = %item.key,
                size = item.size,
                modified = ?item.last_modified,
                "listed object"
            );
            let job = stage_object(source, manifest, config, &item, &mut outcome)?;

            // Every listed object counts against the cap once its
            // download attempt is over, so the object that crosses the
            // cap has already been staged and is discarded here.
            outcome.listed += 1;
            if outcome.listed > config.max_items {
                info!(cap = config.max_items, "item cap reached, listing stopped");
                return Ok(outcome);
            }

            if let Some(job) = job {
                let name = job.name.clone();
                if sender.send(job).is_err() {
                    warn!(key = %name, "job queue closed, listing stopped");
                    return Ok(outcome);
                }
            }
        }

        match page.next_marker {
            Some(next) => marker = next,
            None => {
                info!(listed = outcome.listed, "listing exhausted");
                return Ok(outcome);
            }
        }
    }
}

/// Downloads and verifies one listed object.
///
/// Returns `Ok(None)` when the object failed and was recorded; the
/// staging file (if one was created) is already gone by then.
fn stage_object(
    source: &dyn SourceStore,
    manifest: &Manifest,
    config: &RunConfig,
    item: &ObjectSummary,
    outcome: &mut ProducerOutcome,
) -> Result<Option<TransferJob>, EngineError> {
    let (staging, digests, bytes) = match download_object(source, config, item) {
        Ok(staged) => staged,
        Err(err) => {
            outcome.download_failures += 1;
            warn!(key = %item.key, error = %err, "download failed");
            manifest.record_failed(&item.key, FailureKind::DownloadFailed)?;
            return Ok(None);
        }
    };
    outcome.bytes_downloaded += bytes;

    let expected = expected_sha256(&item.key);
    if digests.sha256_hex != expected {
        outcome.download_failures += 1;
        warn!(
            key = %item.key,
            computed = %digests.sha256_hex,
            "downloaded content does not match the digest in the key"
        );
        manifest.record_failed(&item.key, FailureKind::DownloadContentMissMatch)?;
        return Ok(None);
    }

    debug!(key = %item.key, bytes, "object staged and verified");
    Ok(Some(TransferJob {
        name: item.key.clone(),
        staging,
        content_md5: digests.content_md5,
    }))
}

/// Streams one object into a fresh staging file, hashing as it copies.
fn download_object(
    source: &dyn SourceStore,
    config: &RunConfig,
    item: &ObjectSummary,
) -> io::Result<(StagingFile, DigestPair, u64)> {
    let mut reader = source.open_object(&item.key).map_err(io::Error::other)?;
    let (mut file, staging) = create_staging_file(&config.staging_dir)?;

    let mut hasher = DualHasher::new();
    let bytes = copy_and_hash(&mut reader, &mut file, &mut hasher)?;
    Ok((staging, hasher.finalize(), bytes))
}

/// The digest an object's content must hash to: the final `/`-separated
/// segment of its key, or the whole key when it has no `/`.
fn expected_sha256(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}
