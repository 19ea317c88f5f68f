//! Argument parsing for the migration frontend.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};
use engine::{
    DEFAULT_JOURNAL_FILE, DEFAULT_MANIFEST_DIR, DEFAULT_MAX_ITEMS, DEFAULT_PAGE_SIZE,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_STAGING_DIR, RunConfig,
};

/// Everything the frontend needs to start a run.
#[derive(Debug)]
pub(crate) struct ParsedArgs {
    pub(crate) source: PathBuf,
    pub(crate) dest: PathBuf,
    pub(crate) container: String,
    pub(crate) verbosity: u8,
    pub(crate) config: RunConfig,
}

/// Builds the `clap` command used for parsing.
fn clap_command() -> Command {
    Command::new("oc-migrate")
        .version(env!("CARGO_PKG_VERSION"))
        .about(
            "Migrates objects from a source blob store into a destination \
             container, resuming from a durable checkpoint and verifying \
             content at both ends.",
        )
        .arg(
            Arg::new("source")
                .long("source")
                .value_name("DIR")
                .help("Root directory of the source store.")
                .num_args(1)
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dest")
                .long("dest")
                .value_name("DIR")
                .help("Root directory of the destination store.")
                .num_args(1)
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("container")
                .long("container")
                .value_name("NAME")
                .help("Destination container that receives the objects.")
                .num_args(1)
                .required(true)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .value_name("PREFIX")
                .help("Only migrate source keys starting with PREFIX.")
                .num_args(1)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("page-size")
                .long("page-size")
                .value_name("N")
                .help("Number of objects requested per listing page.")
                .num_args(1)
                .default_value(DEFAULT_PAGE_SIZE.to_string())
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("queue-capacity")
                .long("queue-capacity")
                .value_name("N")
                .help("Number of staged jobs buffered between download and upload.")
                .num_args(1)
                .default_value(DEFAULT_QUEUE_CAPACITY.to_string())
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("max-items")
                .long("max-items")
                .value_name("N")
                .help("Stop after considering N listed objects.")
                .num_args(1)
                .default_value(DEFAULT_MAX_ITEMS.to_string())
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("journal")
                .long("journal")
                .value_name("FILE")
                .help("Checkpoint journal file; reused to resume an interrupted run.")
                .num_args(1)
                .default_value(DEFAULT_JOURNAL_FILE)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("manifest-dir")
                .long("manifest-dir")
                .value_name("DIR")
                .help("Directory that receives the per-run outcome logs.")
                .num_args(1)
                .default_value(DEFAULT_MANIFEST_DIR)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("staging-dir")
                .long("staging-dir")
                .value_name("DIR")
                .help("Scratch directory for downloads; removed when the run ends.")
                .num_args(1)
                .default_value(DEFAULT_STAGING_DIR)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Raise the log level; repeat for more detail.")
                .action(ArgAction::Count),
        )
}

/// Parses the argument list into typed values.
pub(crate) fn parse_args<I, S>(arguments: I) -> Result<ParsedArgs, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let mut matches = clap_command().try_get_matches_from(arguments)?;
    Ok(from_matches(&mut matches))
}

fn from_matches(matches: &mut ArgMatches) -> ParsedArgs {
    let config = RunConfig {
        page_size: matches
            .remove_one::<usize>("page-size")
            .expect("defaulted by clap"),
        queue_capacity: matches
            .remove_one::<usize>("queue-capacity")
            .expect("defaulted by clap"),
        max_items: matches
            .remove_one::<u64>("max-items")
            .expect("defaulted by clap"),
        key_prefix: matches.remove_one::<String>("prefix"),
        journal_path: matches
            .remove_one::<PathBuf>("journal")
            .expect("defaulted by clap"),
        manifest_dir: matches
            .remove_one::<PathBuf>("manifest-dir")
            .expect("defaulted by clap"),
        staging_dir: matches
            .remove_one::<PathBuf>("staging-dir")
            .expect("defaulted by clap"),
    };
    ParsedArgs {
        source: matches
            .remove_one::<PathBuf>("source")
            .expect("required by clap"),
        dest: matches
            .remove_one::<PathBuf>("dest")
            .expect("required by clap"),
        container: matches
            .remove_one::<String>("container")
            .expect("required by clap"),
        verbosity: matches.get_count("verbose"),
        config,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::parse_args;

    const REQUIRED: [&str; 7] = [
        "oc-migrate",
        "--source",
        "src-root",
        "--dest",
        "dest-root",
        "--container",
        "files",
    ];

    #[test]
    fn required_flags_with_defaults() {
        let parsed = parse_args(REQUIRED).unwrap();

        assert_eq!(parsed.source, Path::new("src-root"));
        assert_eq!(parsed.dest, Path::new("dest-root"));
        assert_eq!(parsed.container, "files");
        assert_eq!(parsed.verbosity, 0);

        assert_eq!(parsed.config.page_size, 8);
        assert_eq!(parsed.config.queue_capacity, 4);
        assert_eq!(parsed.config.max_items, 10);
        assert_eq!(parsed.config.key_prefix, None);
        assert_eq!(parsed.config.journal_path, Path::new("Marker.bin"));
        assert_eq!(parsed.config.manifest_dir, Path::new("."));
        assert_eq!(parsed.config.staging_dir, Path::new("TempFolder"));
    }

    #[test]
    fn every_flag_overrides_its_default() {
        let mut args: Vec<&str> = REQUIRED.to_vec();
        args.extend([
            "--prefix",
            "photos/",
            "--page-size",
            "32",
            "--queue-capacity",
            "9",
            "--max-items",
            "1000",
            "--journal",
            "state/progress.bin",
            "--manifest-dir",
            "logs",
            "--staging-dir",
            "scratch",
            "-vv",
        ]);
        let parsed = parse_args(args).unwrap();

        assert_eq!(parsed.config.key_prefix.as_deref(), Some("photos/"));
        assert_eq!(parsed.config.page_size, 32);
        assert_eq!(parsed.config.queue_capacity, 9);
        assert_eq!(parsed.config.max_items, 1000);
        assert_eq!(parsed.config.journal_path, Path::new("state/progress.bin"));
        assert_eq!(parsed.config.manifest_dir, Path::new("logs"));
        assert_eq!(parsed.config.staging_dir, Path::new("scratch"));
        assert_eq!(parsed.verbosity, 2);
    }

    #[test]
    fn missing_required_flag_is_a_parse_error() {
        let result = parse_args(["oc-migrate", "--source", "only"]);
        assert!(result.is_err());
    }

    #[test]
    fn non_numeric_page_size_is_a_parse_error() {
        let mut args: Vec<&str> = REQUIRED.to_vec();
        args.extend(["--page-size", "many"]);
        assert!(parse_args(args).is_err());
    }
}
