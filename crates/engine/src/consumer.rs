//! Upload side of the pipeline: drains the job queue and resolves each
//! staged object against the destination.
//!
//! Every dequeued job ends in exactly one manifest record, and its
//! staging file is gone by the time the next job is taken. One job's
//! failure never stops the loop; only a manifest append failure does,
//! since an unrecorded outcome would be silently lost.

use std::fs::File;
use std::io;

use manifest::{FailureKind, Manifest};
use store::DestinationStore;
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::error::EngineError;
use crate::job::TransferJob;
use crate::queue::JobReceiver;

/// What the consumer accomplished, for the run summary.
#[derive(Debug, Default)]
pub(crate) struct ConsumerOutcome {
    /// Objects uploaded and checksum-verified at the destination.
    pub(crate) transferred: u64,
    /// Jobs resolved with a failure record, the already-exists skip
    /// included.
    pub(crate) failures: u64,
}

/// Runs the dequeue loop until the queue reports end-of-stream.
///
/// Each job is bracketed by `coordinator.add(1)` before its upload and
/// `done()` at resolution, so the run-level wait cannot finish while a
/// dequeued job is still in flight.
pub(crate) fn run(
    dest: &mut dyn DestinationStore,
    manifest: &Manifest,
    receiver: JobReceiver<TransferJob>,
    coordinator: &Coordinator,
) -> Result<ConsumerOutcome, EngineError> {
    let mut outcome = ConsumerOutcome::default();
    let mut container_ready = false;

    while let Some(job) = receiver.take() {
        coordinator.add(1);
        let resolved = resolve_job(dest, manifest, &job, &mut container_ready, &mut outcome);
        coordinator.done();
        resolved?;
        // The job drops here, removing its staging file.
    }

    debug!(
        transferred = outcome.transferred,
        failures = outcome.failures,
        "job queue drained"
    );
    Ok(outcome)
}

/// Resolves one job into exactly one manifest record.
fn resolve_job(
    dest: &mut dyn DestinationStore,
    manifest: &Manifest,
    job: &TransferJob,
    container_ready: &mut bool,
    outcome: &mut ConsumerOutcome,
) -> Result<(), EngineError> {
    info!(name = %job.name, "transfer started");

    // The container is ensured once, on the first job that needs it; a
    // failed attempt is retried by the next job.
    if !*container_ready {
        if let Err(err) = dest.ensure_container() {
            outcome.failures += 1;
            warn!(name = %job.name, error = %err, "destination container unavailable");
            manifest.record_failed(&job.name, FailureKind::UploadFailed)?;
            return Ok(());
        }
        *container_ready = true;
    }

    match dest.object_exists(&job.name) {
        Ok(true) => {
            outcome.failures += 1;
            info!(name = %job.name, "destination object already exists, skipped");
            manifest.record_failed(&job.name, FailureKind::DestAlreadyExist)?;
            return Ok(());
        }
        Ok(false) => {}
        Err(err) => {
            outcome.failures += 1;
            warn!(name = %job.name, error = %err, "destination existence check failed");
            manifest.record_failed(&job.name, FailureKind::UploadFailed)?;
            return Ok(());
        }
    }

    let remote_checksum = match upload_staged(dest, job) {
        Ok(checksum) => checksum,
        Err(err) => {
            outcome.failures += 1;
            warn!(name = %job.name, error = %err, "upload failed");
            manifest.record_failed(&job.name, FailureKind::UploadFailed)?;
            return Ok(());
        }
    };

    if remote_checksum != job.content_md5 {
        outcome.failures += 1;
        warn!(
            name = %job.name,
            staged = %job.content_md5,
            remote = %remote_checksum,
            "destination checksum does not match the staged content"
        );
        manifest.record_failed(&job.name, FailureKind::UploadContentMissMatch)?;
        return Ok(());
    }

    outcome.transferred += 1;
    info!(name = %job.name, checksum = %remote_checksum, "transfer succeeded");
    manifest.record_transferred(&job.name)?;
    Ok(())
}

/// Streams the staged file into the destination store.
fn upload_staged(dest: &mut dyn DestinationStore, job: &TransferJob) -> io::Result<String> {
    let mut staged = File::open(job.staging.path())?;
    dest.put_object(&job.name, &mut staged)
        .map_err(io::Error::other)
}
