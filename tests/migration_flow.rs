//! Whole-binary migration flows over local directory stores: a complete
//! run, resumption from the journal, and the item cap.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use checksums::{DualHasher, StreamHasher as _};
use journal::Journal;

struct Fixture {
    root: tempfile::TempDir,
    source: PathBuf,
    dest: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("source");
        let dest = root.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        Self { root, source, dest }
    }

    /// Writes each payload under its own SHA-256 hex digest and returns
    /// the sorted key list, which is also the listing order.
    fn write_hashed_objects(&self, payloads: &[&[u8]]) -> Vec<String> {
        let mut keys = Vec::new();
        for payload in payloads {
            let mut hasher = DualHasher::new();
            hasher.update(payload);
            let name = hasher.finalize().sha256_hex;
            fs::write(self.source.join(&name), payload).unwrap();
            keys.push(name);
        }
        keys.sort();
        keys
    }

    fn journal_path(&self) -> PathBuf {
        self.root.path().join("Marker.bin")
    }

    /// Runs the binary with this fixture's stores plus `extra` flags,
    /// giving the run its own manifest directory named by `label`.
    fn migrate(&self, label: &str, extra: &[&str]) -> std::process::Output {
        let manifest_dir = self.root.path().join(format!("manifest-{label}"));
        fs::create_dir_all(&manifest_dir).unwrap();

        let mut args: Vec<OsString> = Vec::new();
        for (flag, value) in [
            ("--source", self.source.as_os_str()),
            ("--dest", self.dest.as_os_str()),
            ("--journal", self.journal_path().as_os_str()),
            ("--manifest-dir", manifest_dir.as_os_str()),
            ("--staging-dir", self.root.path().join("staging").as_os_str()),
        ] {
            args.push(flag.into());
            args.push(value.to_owned());
        }
        args.push("--container".into());
        args.push("files".into());
        args.extend(extra.iter().copied().map(OsString::from));

        Command::new(env!("CARGO_BIN_EXE_oc-migrate"))
            .args(args)
            .output()
            .expect("failed to run oc-migrate")
    }

    fn manifest_log(&self, label: &str, suffix: &str) -> String {
        let dir = self.root.path().join(format!("manifest-{label}"));
        let path = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(suffix))
            })
            .unwrap_or_else(|| panic!("no {suffix} log in {}", dir.display()));
        fs::read_to_string(path).unwrap()
    }

    fn stored(&self, key: &str) -> PathBuf {
        self.dest.join("files").join(key)
    }
}

fn stdout_line(output: &std::process::Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("stdout is UTF-8")
}

#[test]
fn migrates_everything_and_records_the_outcome() {
    let fixture = Fixture::new();
    let payloads: [&[u8]; 5] = [b"alpha", b"bravo", b"charlie", b"delta", b"echo"];
    let keys = fixture.write_hashed_objects(&payloads);

    let output = fixture.migrate("only", &[]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout_line(&output).starts_with("transferred 5 object(s), 0 failed"));

    for key in &keys {
        assert!(fixture.stored(key).exists(), "missing destination object {key}");
    }

    let transferred = fixture.manifest_log("only", "Transferred.log");
    assert_eq!(transferred.lines().count(), 5);
    for key in &keys {
        assert!(transferred.contains(key));
    }
    assert!(fixture.manifest_log("only", "Failed.log").is_empty());

    assert!(fixture.journal_path().exists());
    assert!(!fixture.root.path().join("staging").exists());
}

#[test]
fn capped_run_resumes_where_the_journal_left_off() {
    let fixture = Fixture::new();
    let payloads: [&[u8]; 6] = [b"p0", b"p1", b"p2", b"p3", b"p4", b"p5"];
    let keys = fixture.write_hashed_objects(&payloads);

    // First run: two-item pages, stop after three considered objects.
    let output = fixture.migrate("first", &["--page-size", "2", "--max-items", "3"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout_line(&output).starts_with("transferred 3 object(s), 0 failed"));

    for key in keys.iter().take(3) {
        assert!(fixture.stored(key).exists());
    }
    assert!(!fixture.stored(&keys[4]).exists());

    // The journal holds the second page's fetch marker, committed before
    // that page was processed.
    let journal = Journal::open(&fixture.journal_path()).unwrap();
    assert_eq!(journal.marker(), keys[1]);
    drop(journal);

    // Second run: relists from the committed marker. One object from the
    // relisted page is already present and is skipped, the rest transfer.
    let output = fixture.migrate("second", &["--page-size", "2"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout_line(&output).starts_with("transferred 3 object(s), 1 failed"));

    for key in &keys {
        assert!(fixture.stored(key).exists());
    }
    let failed = fixture.manifest_log("second", "Failed.log");
    assert_eq!(failed.lines().count(), 1);
    assert!(failed.trim_end().ends_with("$DestAlreadyExist"));
}

#[test]
fn rerun_of_a_finished_migration_transfers_nothing() {
    let fixture = Fixture::new();
    let keys = fixture.write_hashed_objects(&[b"one", b"two", b"three", b"four"]);

    let output = fixture.migrate("first", &["--page-size", "2"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout_line(&output).starts_with("transferred 4 object(s)"));

    let before: Vec<Vec<u8>> = keys
        .iter()
        .map(|key| fs::read(fixture.stored(key)).unwrap())
        .collect();

    let output = fixture.migrate("second", &["--page-size", "2"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout_line(&output).starts_with("transferred 0 object(s)"));

    // Existing destination objects were not overwritten.
    for (key, expected) in keys.iter().zip(&before) {
        assert_eq!(&fs::read(fixture.stored(key)).unwrap(), expected);
    }
    let failed = fixture.manifest_log("second", "Failed.log");
    assert!(failed.lines().all(|line| line.ends_with("$DestAlreadyExist")));
}

#[test]
fn corrupted_source_object_is_reported_not_transferred() {
    let fixture = Fixture::new();
    fixture.write_hashed_objects(&[b"intact payload"]);

    // A name that does not match the content's digest.
    let bogus = "0".repeat(64);
    fs::write(fixture.source.join(&bogus), b"tampered").unwrap();

    let output = fixture.migrate("only", &[]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout_line(&output).starts_with("transferred 1 object(s), 1 failed"));

    assert!(!fixture.stored(&bogus).exists());
    let failed = fixture.manifest_log("only", "Failed.log");
    assert_eq!(
        failed.trim_end(),
        format!("{bogus}$DownloadContentMissMatch")
    );
}

fn prefix_key(payload: &[u8], dir: &str) -> (String, String) {
    let mut hasher = DualHasher::new();
    hasher.update(payload);
    let digest = hasher.finalize().sha256_hex;
    (format!("{dir}/{digest}"), digest)
}

#[test]
fn prefix_restricts_the_migrated_keys() {
    let fixture = Fixture::new();
    let (kept_key, kept_name) = prefix_key(b"kept", "keep");
    let (skipped_key, skipped_name) = prefix_key(b"skipped", "skip");

    fs::create_dir_all(fixture.source.join("keep")).unwrap();
    fs::create_dir_all(fixture.source.join("skip")).unwrap();
    fs::write(fixture.source.join("keep").join(&kept_name), b"kept").unwrap();
    fs::write(fixture.source.join("skip").join(&skipped_name), b"skipped").unwrap();

    let output = fixture.migrate("only", &["--prefix", "keep/"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout_line(&output).starts_with("transferred 1 object(s), 0 failed"));

    assert!(fixture.stored(&kept_key).exists());
    assert!(!fixture.stored(&skipped_key).exists());
}
