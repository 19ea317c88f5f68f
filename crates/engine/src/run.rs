//! Run orchestration: wires the journal, manifest, stores, queue, and
//! coordinator together, drives the two workers, and settles the final
//! summary.

use std::thread;
use std::time::{Duration, Instant};

use journal::Journal;
use manifest::Manifest;
use store::{DestinationStore, SourceStore};
use tracing::info;

use crate::config::RunConfig;
use crate::consumer;
use crate::coordinator::Coordinator;
use crate::error::EngineError;
use crate::producer;
use crate::queue;
use crate::staging::StagingDir;

/// Aggregate outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Objects uploaded and checksum-verified at the destination.
    pub transferred: u64,
    /// Objects resolved with a failure record, the already-exists skip
    /// included.
    pub failed: u64,
    /// Bytes staged from the source, failed verifications included.
    pub bytes_downloaded: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// One configured migration, ready to execute.
///
/// The run owns its collaborators; nothing is ambient. Construct it with
/// the source and destination store implementations and call
/// [`execute`](MigrationRun::execute) once.
pub struct MigrationRun {
    config: RunConfig,
    source: Box<dyn SourceStore + Send>,
    dest: Box<dyn DestinationStore + Send>,
}

impl MigrationRun {
    /// Builds a run over the given stores.
    pub fn new(
        config: RunConfig,
        source: Box<dyn SourceStore + Send>,
        dest: Box<dyn DestinationStore + Send>,
    ) -> Self {
        Self {
            config,
            source,
            dest,
        }
    }

    /// Executes the migration to completion.
    ///
    /// Startup order: validate the configuration, open the journal,
    /// create the manifest logs, create the staging directory. Only then
    /// do the producer and consumer threads start. The call returns once
    /// both workers have finished and the coordinator confirms that no
    /// dequeued job is still unresolved. The staging directory is
    /// removed on every exit path.
    pub fn execute(self) -> Result<RunSummary, EngineError> {
        let MigrationRun {
            config,
            source,
            mut dest,
        } = self;

        config.validate()?;
        let started = Instant::now();
        info!(
            journal = %config.journal_path.display(),
            staging = %config.staging_dir.display(),
            cap = config.max_items,
            "migration run starting"
        );

        let mut journal = Journal::open(&config.journal_path)?;
        let manifest = Manifest::create(&config.manifest_dir)?;
        let _staging = StagingDir::create(&config.staging_dir).map_err(|source| {
            EngineError::StagingDir {
                path: config.staging_dir.clone(),
                source,
            }
        })?;

        let coordinator = Coordinator::new(1);
        let (sender, receiver) = queue::bounded(config.queue_capacity);

        // Each worker owns its exclusive state (the producer takes the
        // source and the journal, the consumer takes the destination);
        // the manifest, coordinator, and config are shared by reference.
        let (producer_joined, consumer_joined) = thread::scope(|scope| {
            let manifest = &manifest;
            let coordinator = &coordinator;
            let config = &config;

            let producer = thread::Builder::new()
                .name("producer".into())
                .spawn_scoped(scope, move || {
                    producer::run(
                        source.as_ref(),
                        &mut journal,
                        manifest,
                        sender,
                        coordinator,
                        config,
                    )
                })
                .map_err(|source| EngineError::WorkerSpawn {
                    worker: "producer",
                    source,
                })?;

            let consumer = thread::Builder::new()
                .name("consumer".into())
                .spawn_scoped(scope, move || {
                    consumer::run(dest.as_mut(), manifest, receiver, coordinator)
                })
                .map_err(|source| EngineError::WorkerSpawn {
                    worker: "consumer",
                    source,
                })?;

            Ok::<_, EngineError>((producer.join(), consumer.join()))
        })?;

        // A panicked worker may have left the counter above zero, so the
        // panic check has to come before the wait.
        let producer_outcome = producer_joined.map_err(|_| EngineError::WorkerPanicked {
            worker: "producer",
        })??;
        let consumer_outcome = consumer_joined.map_err(|_| EngineError::WorkerPanicked {
            worker: "consumer",
        })??;

        coordinator.wait();
        debug_assert_eq!(coordinator.outstanding(), 0);

        let summary = RunSummary {
            transferred: consumer_outcome.transferred,
            failed: producer_outcome.download_failures + consumer_outcome.failures,
            bytes_downloaded: producer_outcome.bytes_downloaded,
            elapsed: started.elapsed(),
        };
        info!(
            transferred = summary.transferred,
            failed = summary.failed,
            bytes = summary.bytes_downloaded,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "migration run complete"
        );
        Ok(summary)
    }
}
