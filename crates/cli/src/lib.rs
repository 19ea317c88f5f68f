#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Command-line frontend for the migration pipeline.
//!
//! Parses the flag surface, wires up the local store implementations,
//! initializes logging, and maps the engine's outcome onto process exit
//! codes:
//!
//! | code | meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | run completed (per-object failures included) |
//! | 1    | usage or configuration error              |
//! | 2    | checkpoint journal could not be opened    |
//! | 3    | runtime failure ended the run             |
//!
//! Per-object failures never change the exit code; they are recorded in
//! the manifest logs and the summary line.

mod args;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use engine::{EngineError, MigrationRun, RunSummary};
use store::{LocalDestinationStore, LocalSourceStore};

use args::{ParsedArgs, parse_args};

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_JOURNAL: i32 = 2;
const EXIT_RUNTIME: i32 = 3;

/// Maximum exit code representable by a Unix process.
const MAX_EXIT_CODE: i32 = u8::MAX as i32;

/// Runs the frontend using the provided argument iterator and output
/// handles, returning the process exit code the caller should use.
///
/// The summary goes to `stdout`; parse errors and fatal run errors go to
/// `stderr`. Log events go to the process's standard error stream via
/// `tracing`, filtered by `-v` count or the `RUST_LOG` environment
/// variable.
pub fn run_with<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let parsed = match parse_args(arguments) {
        Ok(parsed) => parsed,
        Err(error) => {
            use clap::error::ErrorKind;
            return match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    let _ = write!(stdout, "{error}");
                    EXIT_OK
                }
                _ => {
                    let _ = write!(stderr, "{error}");
                    EXIT_USAGE
                }
            };
        }
    };

    init_tracing(parsed.verbosity);

    let ParsedArgs {
        source,
        dest,
        container,
        config,
        ..
    } = parsed;
    let source = LocalSourceStore::new(source);
    let dest = LocalDestinationStore::new(dest, container);

    match MigrationRun::new(config, Box::new(source), Box::new(dest)).execute() {
        Ok(summary) => {
            report_summary(&summary, stdout);
            let _ = stdout.flush();
            EXIT_OK
        }
        Err(error) => {
            let _ = writeln!(stderr, "oc-migrate: {error}");
            let _ = stderr.flush();
            exit_code_for(&error)
        }
    }
}

/// Converts a status integer into a process [`ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> ExitCode {
    let clamped = status.clamp(0, MAX_EXIT_CODE);
    ExitCode::from(clamped as u8)
}

fn report_summary<W: Write>(summary: &RunSummary, stdout: &mut W) {
    let _ = writeln!(
        stdout,
        "transferred {} object(s), {} failed, {} bytes downloaded in {:.2?}",
        summary.transferred, summary.failed, summary.bytes_downloaded, summary.elapsed
    );
}

fn exit_code_for(error: &EngineError) -> i32 {
    match error {
        EngineError::Config(_) => EXIT_USAGE,
        EngineError::Journal(_) => EXIT_JOURNAL,
        EngineError::Manifest(_)
        | EngineError::Listing { .. }
        | EngineError::StagingDir { .. }
        | EngineError::WorkerSpawn { .. }
        | EngineError::WorkerPanicked { .. } => EXIT_RUNTIME,
    }
}

/// Installs the global subscriber once; later calls are no-ops.
///
/// `RUST_LOG` wins when set, otherwise the `-v` count picks the level.
fn init_tracing(verbosity: u8) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_directive = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::process::ExitCode;

    use checksums::{DualHasher, StreamHasher as _};

    use super::{exit_code_from, run_with};

    #[test]
    fn help_prints_to_stdout_and_succeeds() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_with(["oc-migrate", "--help"], &mut stdout, &mut stderr);

        assert_eq!(code, 0);
        assert!(!stdout.is_empty());
        assert!(stderr.is_empty());
    }

    #[test]
    fn missing_required_flags_fail_with_usage_code() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_with(["oc-migrate"], &mut stdout, &mut stderr);

        assert_eq!(code, 1);
        assert!(stdout.is_empty());
        assert!(!stderr.is_empty());
    }

    #[test]
    fn zero_page_size_is_a_configuration_error() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("source");
        let dest = root.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_with(
            [
                "oc-migrate".to_owned(),
                "--source".to_owned(),
                source.display().to_string(),
                "--dest".to_owned(),
                dest.display().to_string(),
                "--container".to_owned(),
                "files".to_owned(),
                "--page-size".to_owned(),
                "0".to_owned(),
                "--journal".to_owned(),
                root.path().join("Marker.bin").display().to_string(),
            ],
            &mut stdout,
            &mut stderr,
        );

        assert_eq!(code, 1);
        let message = String::from_utf8(stderr).unwrap();
        assert!(message.contains("page size"), "stderr was: {message}");
    }

    #[test]
    fn migrates_a_hashed_object_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("source");
        let dest = root.path().join("dest");
        let manifest_dir = root.path().join("logs");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::create_dir_all(&manifest_dir).unwrap();

        let payload = b"frontend round trip";
        let mut hasher = DualHasher::new();
        hasher.update(payload);
        let digest = hasher.finalize().sha256_hex;
        fs::write(source.join(&digest), payload).unwrap();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_with(
            [
                "oc-migrate".to_owned(),
                "--source".to_owned(),
                source.display().to_string(),
                "--dest".to_owned(),
                dest.display().to_string(),
                "--container".to_owned(),
                "files".to_owned(),
                "--journal".to_owned(),
                root.path().join("Marker.bin").display().to_string(),
                "--manifest-dir".to_owned(),
                manifest_dir.display().to_string(),
                "--staging-dir".to_owned(),
                root.path().join("staging").display().to_string(),
            ],
            &mut stdout,
            &mut stderr,
        );

        assert_eq!(code, 0, "stderr: {}", String::from_utf8_lossy(&stderr));
        let summary = String::from_utf8(stdout).unwrap();
        assert!(
            summary.starts_with("transferred 1 object(s), 0 failed"),
            "summary was: {summary}"
        );
        assert_eq!(fs::read(dest.join("files").join(&digest)).unwrap(), payload);
        assert!(!root.path().join("staging").exists());
    }

    #[test]
    fn exit_codes_clamp_to_a_byte() {
        fn rendered(status: i32) -> String {
            format!("{:?}", exit_code_from(status))
        }

        assert_eq!(rendered(0), format!("{:?}", ExitCode::SUCCESS));
        assert_eq!(rendered(1000), rendered(255));
        assert_eq!(rendered(-7), rendered(0));
        assert_ne!(rendered(2), rendered(3));
    }
}
