// tests/config_validation.rs

mod common;

use std::path::{Path, PathBuf};

use stepgraph::config::{PipelineFile, RawPipelineFile, load_and_validate};
use stepgraph::dag::{Operation, Run};
use stepgraph::errors::{GraphError, StepgraphError};

use crate::common::{PipelineBuilder, StepBuilder};

const PREPROCESS: &str = r#"
[pipeline]
name = "preprocess_micrographs"
working_dir = "runs/run_001"
jobs = 4

[params]
crop = 100
down = 2
do_ctf = true

[[step]]
id = "mkdirs"
kind = "mkdir"
paths = ["extra", "tmp"]

[[step]]
id = "downsample"
run = "xmipp_transform_downsample"
args = ["-i", "{item}.mrc", "-o", "extra/{item}_down.spi", "--step", "{down}"]
each = ["mic01", "mic02"]
after = ["mkdirs"]
outputs = ["extra/{item}_down.spi"]

[[step]]
id = "ctf"
run = "xmipp_ctf_estimate_from_micrograph"
args = ["--micrograph", "extra/{item}_down.spi", "--root", "{workdir}/extra/{item}"]
each = ["mic01", "mic02"]
after = ["downsample[{item}]"]
when = "do_ctf"

[[step]]
id = "summary"
run = "summarize"
after = ["downsample", "ctf"]
"#;

fn parse(text: &str) -> RawPipelineFile {
    toml::from_str(text).expect("valid TOML")
}

fn validate(raw: RawPipelineFile) -> Result<PipelineFile, StepgraphError> {
    PipelineFile::try_from(raw)
}

fn declare(text: &str) -> Run {
    let cfg = validate(parse(text)).expect("valid pipeline");
    Run::from_config(&cfg, Path::new("/data/run")).expect("declarable pipeline")
}

fn ids(run: &Run) -> Vec<&str> {
    run.graph.steps().iter().map(|s| s.id.as_str()).collect()
}

fn prerequisites<'a>(run: &'a Run, id: &str) -> Vec<&'a str> {
    run.graph
        .dependencies_of(id)
        .iter()
        .map(String::as_str)
        .collect()
}

#[test]
fn fan_out_expands_to_items_and_barrier() {
    let run = declare(PREPROCESS);

    assert_eq!(
        ids(&run),
        vec![
            "mkdirs",
            "downsample[mic01]",
            "downsample[mic02]",
            "downsample",
            "ctf[mic01]",
            "ctf[mic02]",
            "ctf",
            "summary",
        ]
    );
    assert!(run.graph.get("downsample").unwrap().is_barrier());
    assert_eq!(
        prerequisites(&run, "downsample"),
        vec!["downsample[mic01]", "downsample[mic02]"]
    );
    assert_eq!(prerequisites(&run, "downsample[mic02]"), vec!["mkdirs"]);
    assert_eq!(prerequisites(&run, "ctf[mic02]"), vec!["downsample[mic02]"]);
    assert_eq!(prerequisites(&run, "summary"), vec!["downsample", "ctf"]);
}

#[test]
fn placeholders_are_resolved_at_declaration() {
    let run = declare(PREPROCESS);

    let down = run.graph.get("downsample[mic01]").unwrap();
    assert_eq!(
        down.operation,
        Operation::command(
            "xmipp_transform_downsample",
            ["-i", "mic01.mrc", "-o", "extra/mic01_down.spi", "--step", "2"]
        )
    );
    assert_eq!(down.outputs, vec![PathBuf::from("extra/mic01_down.spi")]);

    let ctf = run.graph.get("ctf[mic02]").unwrap();
    assert!(ctf.args().contains(&"/data/run/extra/mic02".to_string()));

    let mkdirs = run.graph.get("mkdirs").unwrap();
    assert_eq!(
        mkdirs.operation,
        Operation::MakeDirs {
            paths: vec!["extra".into(), "tmp".into()]
        }
    );
}

#[test]
fn parameters_form_the_snapshot_in_file_order() {
    let run = declare(PREPROCESS);
    let snapshot: Vec<(&str, &str)> = run.parameters.iter().collect();
    assert_eq!(
        snapshot,
        vec![("crop", "100"), ("down", "2"), ("do_ctf", "true")]
    );
}

#[test]
fn overrides_change_parameters_and_fingerprints() {
    let base = declare(PREPROCESS);

    let mut raw = parse(PREPROCESS);
    raw.apply_overrides([("down", "4"), ("label", "night shift")]);
    let cfg = validate(raw).unwrap();
    let run = Run::from_config(&cfg, Path::new("/data/run")).unwrap();

    assert_eq!(run.parameters.get("down"), Some("4"));
    assert_eq!(run.parameters.get("label"), Some("night shift"));
    assert_ne!(
        base.graph.get("downsample[mic01]").unwrap().fingerprint,
        run.graph.get("downsample[mic01]").unwrap().fingerprint
    );
    assert_eq!(
        base.graph.get("mkdirs").unwrap().fingerprint,
        run.graph.get("mkdirs").unwrap().fingerprint
    );
}

#[test]
fn disabled_steps_hand_their_prerequisites_to_dependents() {
    let mut raw = parse(PREPROCESS);
    raw.apply_overrides([("do_ctf", "false")]);
    let cfg = validate(raw).unwrap();
    let run = Run::from_config(&cfg, Path::new("/data/run")).unwrap();

    assert!(!run.graph.contains("ctf"));
    assert!(!run.graph.contains("ctf[mic01]"));
    assert_eq!(
        prerequisites(&run, "summary"),
        vec!["downsample", "downsample[mic01]", "downsample[mic02]"]
    );
}

const CHAINED: &str = r#"
[params]
do_ctf = false
do_sort = false

[[step]]
id = "down"
run = "downsample"

[[step]]
id = "ctf"
run = "estimate"
after = ["down"]
when = "do_ctf"

[[step]]
id = "sort"
run = "sort"
after = ["ctf"]
when = "do_sort"

[[step]]
id = "report"
run = "report"
after = ["sort"]
"#;

#[test]
fn chains_through_disabled_steps_keep_their_order() {
    let run = declare(CHAINED);

    assert_eq!(ids(&run), vec!["down", "report"]);
    assert_eq!(prerequisites(&run, "report"), vec!["down"]);
}

#[test]
fn disabled_fan_out_items_are_replaced_per_item() {
    let cfg = PipelineBuilder::new()
        .param("do_ctf", false)
        .step(StepBuilder::command("down", "downsample").each(&["a", "b"]))
        .step(
            StepBuilder::command("ctf", "estimate")
                .each(&["a", "b"])
                .after("down[{item}]")
                .when("do_ctf"),
        )
        .step(
            StepBuilder::command("pick", "pick")
                .each(&["a", "b"])
                .after("ctf[{item}]"),
        )
        .build();
    let run = Run::from_config(&cfg, Path::new("/w")).unwrap();

    assert_eq!(prerequisites(&run, "pick[a]"), vec!["down[a]"]);
    assert_eq!(prerequisites(&run, "pick[b]"), vec!["down[b]"]);
}

#[test]
fn disabled_steps_in_sequential_pipelines_are_bridged() {
    let cfg = PipelineBuilder::new()
        .sequential()
        .param("extra", false)
        .step(StepBuilder::command("a", "first"))
        .step(StepBuilder::command("b", "second").when("extra"))
        .step(StepBuilder::command("c", "third"))
        .step(StepBuilder::command("d", "fourth").after("b"))
        .build();
    let run = Run::from_config(&cfg, Path::new("/w")).unwrap();

    assert_eq!(prerequisites(&run, "c"), vec!["a"]);
    assert_eq!(prerequisites(&run, "d"), vec!["a"]);
}

#[test]
fn sequential_pipelines_chain_steps_without_after() {
    let cfg = PipelineBuilder::new()
        .sequential()
        .step(StepBuilder::command("a", "first"))
        .step(StepBuilder::command("b", "second"))
        .step(StepBuilder::command("c", "third").no_after())
        .step(StepBuilder::command("d", "fourth").after("a"))
        .build();
    let run = Run::from_config(&cfg, Path::new("/w")).unwrap();

    assert!(prerequisites(&run, "a").is_empty());
    assert_eq!(prerequisites(&run, "b"), vec!["a"]);
    assert!(prerequisites(&run, "c").is_empty());
    assert_eq!(prerequisites(&run, "d"), vec!["a"]);
}

#[test]
fn parallel_pipelines_do_not_chain() {
    let cfg = PipelineBuilder::new()
        .step(StepBuilder::command("a", "first"))
        .step(StepBuilder::command("b", "second"))
        .build();
    let run = Run::from_config(&cfg, Path::new("/w")).unwrap();
    assert!(prerequisites(&run, "b").is_empty());
}

#[test]
fn internal_operations_are_declared() {
    let cfg = PipelineBuilder::new()
        .param("name", "img")
        .step(StepBuilder::copy("copy", "{name}.xmd", "extra/{name}.xmd"))
        .step(StepBuilder::symlink("link", "{name}.mrc", "extra/{name}.mrc").after("copy"))
        .step(StepBuilder::barrier("level", &["copy", "link"]))
        .build();
    let run = Run::from_config(&cfg, Path::new("/w")).unwrap();

    assert_eq!(
        run.graph.get("copy").unwrap().operation,
        Operation::Copy {
            from: "img.xmd".into(),
            to: "extra/img.xmd".into()
        }
    );
    assert_eq!(
        run.graph.get("link").unwrap().operation,
        Operation::Symlink {
            target: "img.mrc".into(),
            link: "extra/img.mrc".into()
        }
    );
    assert!(run.graph.get("level").unwrap().is_barrier());
}

fn expect_config_error(raw: RawPipelineFile, needle: &str) {
    match validate(raw) {
        Err(StepgraphError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}")
        }
        other => panic!("expected config error containing {needle:?}, got {other:?}"),
    }
}

fn expect_graph_error(raw: RawPipelineFile) -> GraphError {
    match validate(raw) {
        Err(StepgraphError::Graph(err)) => err,
        other => panic!("expected graph error, got {other:?}"),
    }
}

#[test]
fn empty_pipeline_is_rejected() {
    expect_config_error(PipelineBuilder::new().raw(), "at least one");
}

#[test]
fn zero_jobs_is_rejected() {
    let raw = PipelineBuilder::new()
        .jobs(0)
        .step(StepBuilder::command("a", "x"))
        .raw();
    expect_config_error(raw, "jobs");
}

#[test]
fn duplicate_ids_are_rejected() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x"))
        .step(StepBuilder::command("a", "y"))
        .raw();
    assert_eq!(expect_graph_error(raw), GraphError::DuplicateStep("a".into()));
}

#[test]
fn bracketed_ids_are_rejected() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a[1]", "x"))
        .raw();
    expect_config_error(raw, "must not contain");
}

#[test]
fn unknown_prerequisites_are_rejected() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x").after("ghost"))
        .raw();
    assert_eq!(
        expect_graph_error(raw),
        GraphError::UnknownPrerequisite {
            step: "a".into(),
            prerequisite: "ghost".into()
        }
    );
}

#[test]
fn self_references_are_rejected() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x").after("a"))
        .raw();
    assert_eq!(
        expect_graph_error(raw),
        GraphError::SelfReference { step: "a".into() }
    );
}

#[test]
fn forward_references_are_rejected() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x").after("b"))
        .step(StepBuilder::command("b", "y"))
        .raw();
    assert_eq!(
        expect_graph_error(raw),
        GraphError::ForwardReference {
            step: "a".into(),
            prerequisite: "b".into()
        }
    );
}

#[test]
fn cycles_are_rejected() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x").after("c"))
        .step(StepBuilder::command("b", "y").after("a"))
        .step(StepBuilder::command("c", "z").after("b"))
        .raw();
    assert!(matches!(expect_graph_error(raw), GraphError::Cycle(_)));
}

#[test]
fn unknown_placeholders_are_rejected() {
    let raw = PipelineBuilder::new()
        .param("crop", 100)
        .step(StepBuilder::command("a", "x").args(&["--crop", "{crop}", "{missing}"]))
        .raw();
    expect_config_error(raw, "{missing}");
}

#[test]
fn item_placeholder_requires_fan_out() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x").arg("{item}"))
        .raw();
    expect_config_error(raw, "{item}");
}

#[test]
fn unknown_when_parameter_is_rejected() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x").when("do_it"))
        .raw();
    expect_config_error(raw, "do_it");
}

#[test]
fn barriers_need_prerequisites() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x"))
        .step(StepBuilder::barrier("level", &[]))
        .raw();
    expect_config_error(raw, "must list");
}

#[test]
fn item_references_need_a_fan_out_target() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::command("a", "x"))
        .step(StepBuilder::command("b", "y").each(&["1"]).after("a[{item}]"))
        .raw();
    expect_config_error(raw, "has no `each`");
}

#[test]
fn missing_kind_fields_are_rejected() {
    let raw = PipelineBuilder::new()
        .step(StepBuilder::mkdir("dirs", &[]))
        .raw();
    expect_config_error(raw, "no `paths`");

    let raw = PipelineBuilder::new()
        .step(StepBuilder::mkdir("dirs", &["x"]).arg("-p"))
        .raw();
    expect_config_error(raw, "not a command step");
}

#[test]
fn mistyped_fields_fail_to_parse() {
    let err = toml::from_str::<RawPipelineFile>("[[step]]\nid = 3\n").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn demo_pipelines_validate() {
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let mut seen = 0;
    for entry in std::fs::read_dir(&demos).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let cfg = load_and_validate(&path)
            .unwrap_or_else(|e| panic!("{} does not validate: {e}", path.display()));
        let run = Run::from_config(&cfg, Path::new("/tmp/demo")).unwrap();
        assert!(!run.graph.is_empty());
        seen += 1;
    }
    assert!(seen >= 2);
}
