// tests/cli_args.rs
//
// Command-line parsing.

use std::path::PathBuf;

use clap::Parser;
use stepgraph::cli::CliArgs;

#[test]
fn pipeline_path_defaults_to_pipeline_toml() {
    let args = CliArgs::try_parse_from(["stepgraph"]).unwrap();
    assert_eq!(args.pipeline, PathBuf::from("Pipeline.toml"));
    assert!(args.workdir.is_none());
    assert!(args.set.is_empty());
}

#[test]
fn explicit_pipeline_path_and_overrides_are_kept() {
    let args = CliArgs::try_parse_from([
        "stepgraph",
        "--pipeline",
        "demos/preprocess_micrographs.toml",
        "--set",
        "threshold=7",
        "-j",
        "3",
    ])
    .unwrap();
    assert_eq!(args.pipeline, PathBuf::from("demos/preprocess_micrographs.toml"));
    assert_eq!(args.overrides().collect::<Vec<_>>(), vec![("threshold", "7")]);
    assert_eq!(args.jobs, Some(3));
}

#[test]
fn malformed_assignments_are_rejected() {
    assert!(CliArgs::try_parse_from(["stepgraph", "--set", "threshold"]).is_err());
    assert!(CliArgs::try_parse_from(["stepgraph", "--set", "=7"]).is_err());
    assert!(CliArgs::try_parse_from(["stepgraph", "-j", "0"]).is_err());
}
