use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use csweave_classpath::fixture::{ClassFileBuilder, MethodBuilder};
use csweave_classpath::{AccessFlags, Annotation, ElementValue};
use tempfile::{tempdir, TempDir};

const BASE: &str = "datadog.trace.agent.tooling.csi.CallSite";

fn marker(name: &str) -> Annotation {
    Annotation::new(format!("{BASE}${name}"))
}

fn cli_path() -> Option<PathBuf> {
    std::env::var_os("CARGO_BIN_EXE_csweave").map(Into::into)
}

/// An advice root with a target class and one advice class whose `afterRun`
/// binds `Return` when `valid`, `This` only otherwise.
fn advice_root(valid: bool) -> TempDir {
    let dir = tempdir().expect("create temp dir");
    let classes = dir.path().join("classes");
    fs::create_dir_all(classes.join("com/acme")).expect("create package dir");

    let target = ClassFileBuilder::new("com.acme.Target")
        .method(
            MethodBuilder::new("run", "(Ljava/lang/String;)Ljava/lang/String;")
                .access(AccessFlags::PUBLIC),
        )
        .build();
    fs::write(classes.join("com/acme/Target.class"), target).expect("write target");

    let descriptor = if valid {
        "(Lcom/acme/Target;Ljava/lang/String;)Ljava/lang/String;"
    } else {
        "(Lcom/acme/Target;)Ljava/lang/String;"
    };
    let mut method = MethodBuilder::new("afterRun", descriptor)
        .access(AccessFlags::PUBLIC | AccessFlags::STATIC)
        .annotation(marker("After").with(
            "value",
            ElementValue::String(
                "java.lang.String com.acme.Target.run(java.lang.String)".into(),
            ),
        ))
        .parameter_annotation(0, marker("This"));
    if valid {
        method = method.parameter_annotation(1, marker("Return"));
    }
    let advice = ClassFileBuilder::new("com.acme.TargetAdvice")
        .annotation(Annotation::new(BASE))
        .method(method)
        .build();
    fs::write(classes.join("com/acme/TargetAdvice.class"), advice).expect("write advice");
    dir
}

fn run(cli: &Path, dir: &TempDir, args: &[&str]) -> Output {
    Command::new(cli)
        .current_dir(dir.path())
        .args(args)
        .arg("--root")
        .arg(dir.path().join("classes"))
        .arg("--java-home")
        .arg(dir.path())
        .output()
        .expect("invoke csweave")
}

#[test]
fn compile_writes_plans_and_succeeds() {
    let Some(cli) = cli_path() else {
        eprintln!("Skipping compile test: CLI binary unavailable");
        return;
    };
    let dir = advice_root(true);
    let plans = dir.path().join("plans.json");

    let output = run(
        &cli,
        &dir,
        &["compile", "--output", plans.to_str().expect("utf-8 path")],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "compile failed:\n{stdout}");
    assert!(stdout.contains("compiled com.acme.TargetAdvice: 1 plan(s)"), "{stdout}");

    let written = fs::read_to_string(&plans).expect("plans written");
    let groups: serde_json::Value = serde_json::from_str(&written).expect("valid JSON");
    assert_eq!(groups[0]["class"], "com.acme.TargetAdvice");
    assert_eq!(groups[0]["plans"][0]["kind"], "after");
    assert_eq!(groups[0]["plans"][0]["pointcut"]["name"], "run");
}

#[test]
fn failed_compile_leaves_no_plan_file() {
    let Some(cli) = cli_path() else {
        eprintln!("Skipping failed compile test: CLI binary unavailable");
        return;
    };
    let dir = advice_root(false);
    let plans = dir.path().join("plans.json");

    let output = run(
        &cli,
        &dir,
        &["compile", "--output", plans.to_str().expect("utf-8 path")],
    );
    assert!(!output.status.success());
    assert!(!plans.exists(), "plans written for a failed compilation");
}

#[test]
fn check_reports_errors_with_failing_exit_code() {
    let Some(cli) = cli_path() else {
        eprintln!("Skipping check test: CLI binary unavailable");
        return;
    };
    let dir = advice_root(false);

    let output = run(&cli, &dir, &["check"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success(), "check should fail:\n{stdout}");
    assert!(
        stdout.contains("error[ADVICE_AFTER_LAST_ARG_SHOULD_BE_RETURN]"),
        "expected diagnostic in output, got:\n{stdout}"
    );
    assert!(stdout.contains("com.acme.TargetAdvice#afterRun"), "{stdout}");
}

#[test]
fn check_emits_json_diagnostics() {
    let Some(cli) = cli_path() else {
        eprintln!("Skipping JSON test: CLI binary unavailable");
        return;
    };
    let dir = advice_root(false);

    let output = run(&cli, &dir, &["check", "--format", "json"]);
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(
        report["errors"][0]["code"],
        "ADVICE_AFTER_LAST_ARG_SHOULD_BE_RETURN"
    );
    assert_eq!(report["stats"]["advice_classes"], 1);
}

#[test]
fn explain_prints_help_for_a_code() {
    let Some(cli) = cli_path() else {
        eprintln!("Skipping explain test: CLI binary unavailable");
        return;
    };
    let output = Command::new(&cli)
        .args(["explain", "advice_parameter_this_should_be_first"])
        .output()
        .expect("invoke csweave explain");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("ADVICE_PARAMETER_THIS_SHOULD_BE_FIRST"), "{stdout}");

    let unknown = Command::new(&cli)
        .args(["explain", "NOT_A_CODE"])
        .output()
        .expect("invoke csweave explain");
    assert!(!unknown.status.success());
}
