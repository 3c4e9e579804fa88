//! Command-line tests
//!
//! Builds a scenario file through the CLI, runs it with the dry-run driver
//! and reads the result record back.

use std::path::{Path, PathBuf};
use std::process::Command;

struct TestContext {
    dir: tempfile::TempDir,
}

struct CliOutput {
    stdout: String,
    stderr: String,
    code: Option<i32>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> CliOutput {
        let output = Command::new(env!("CARGO_BIN_EXE_webscenario"))
            .args(args)
            .env("XDG_CONFIG_HOME", self.dir.path().join("config"))
            .env("HOME", self.dir.path())
            .env("NO_COLOR", "1")
            .env("RUST_LOG", "error")
            .output()
            .expect("Failed to run webscenario");

        CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        }
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert_eq!(
            output.code,
            Some(0),
            "webscenario {:?} failed:\nstdout: {}\nstderr: {}",
            args,
            output.stdout,
            output.stderr
        );
        output.stdout
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn test_build_show_and_run_scenario() {
    let ctx = TestContext::new();
    let file = ctx.path("search.wts");
    let results = ctx.path("results");

    ctx.run_ok(&[
        "new",
        arg(&file),
        "--url",
        "https://example.com",
        "--browser",
        "firefox",
    ]);
    let out = ctx.run_ok(&[
        "add",
        arg(&file),
        "type_text",
        "--set",
        "description=Type the query",
        "--set",
        "action.locator.value=#q",
        "--set",
        "action.text=rust",
    ]);
    assert!(out.contains("#1"), "{}", out);
    ctx.run_ok(&["add", arg(&file), "click", "--set", "action.locator.value=#go"]);
    ctx.run_ok(&["set", arg(&file), "2", "description", "Submit"]);

    let shown = ctx.run_ok(&["show", arg(&file)]);
    assert!(shown.contains("search"), "{}", shown);
    assert!(shown.contains("firefox"), "{}", shown);
    assert!(shown.contains("Type the query"), "{}", shown);
    assert!(shown.contains("Submit"), "{}", shown);

    let ran = ctx.run_ok(&["run", arg(&file), "--results-dir", arg(&results)]);
    assert!(ran.contains("Passed"), "{}", ran);

    let run_folder = std::fs::read_dir(&results)
        .unwrap()
        .next()
        .expect("one run folder")
        .unwrap()
        .path();
    let report = ctx.run_ok(&["result", arg(&run_folder.join("result.json"))]);
    assert!(report.contains("Submit"), "{}", report);
    assert!(report.contains("Passed"), "{}", report);
}

#[test]
fn test_invalid_edits_are_reported() {
    let ctx = TestContext::new();
    let file = ctx.path("s.wts");
    ctx.run_ok(&["new", arg(&file)]);
    ctx.run_ok(&["add", arg(&file), "click"]);

    let out = ctx.run(&["add", arg(&file), "click", "--parent", "1"]);
    assert_eq!(out.code, Some(1));
    assert!(out.stderr.contains("cannot hold children"), "{}", out.stderr);
    assert!(out.stderr.contains("was not changed"), "{}", out.stderr);

    let out = ctx.run(&["add", arg(&file), "teleport"]);
    assert_eq!(out.code, Some(1));
    assert!(out.stderr.contains("teleport"), "{}", out.stderr);

    let out = ctx.run(&["remove", arg(&file), "0"]);
    assert_eq!(out.code, Some(1));
    assert!(out.stderr.contains("was not changed"), "{}", out.stderr);

    let shown = ctx.run_ok(&["show", arg(&file)]);
    assert!(!shown.contains("#2"), "{}", shown);
}

#[test]
fn test_nodes_lists_builtin_types() {
    let ctx = TestContext::new();
    let out = ctx.run_ok(&["nodes"]);
    for id in ["folder", "looper", "click", "navigate", "set_variable"] {
        assert!(out.contains(id), "missing {} in {}", id, out);
    }
}
