use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let yaml = format!(
        r#"
run_id: "cli_check"
episodes:
  seed: 7
  count: 2
  steps: 5
hypotheses:
  - name: "up"
    q_table: [[1.0, 0.0]]
  - name: "down"
    q_table: [[0.0, 1.0]]
updaters:
  - name: "bayes"
    kind: "bayesian"
  - name: "sticky"
    kind: "crf"
outputs:
  jsonl: "{out}/{{run_id}}/steps.jsonl"
  summary_md: "{out}/{{run_id}}/summary.md"
  plots_dir: "{out}/{{run_id}}/plots"
metrics:
  baseline: "bayes"
"#,
        out = dir.display()
    );
    let path = dir.join("bench.yaml");
    fs::write(&path, yaml).expect("config written");
    path
}

#[test]
fn validate_only_skips_the_run() {
    let dir = tempdir().expect("temp dir");
    let config = write_config(dir.path());

    Command::cargo_bin("intent-bench")
        .expect("binary built")
        .arg("--config")
        .arg(&config)
        .arg("--validate-only")
        .assert()
        .success()
        .stdout(predicate::str::contains("loaded configuration 'cli_check' with 2 updaters"))
        .stdout(predicate::str::contains("Validation-only mode"));

    assert!(!dir.path().join("cli_check/steps.jsonl").exists());
}

#[test]
fn overrides_apply_before_running() {
    let dir = tempdir().expect("temp dir");
    let config = write_config(dir.path());

    Command::cargo_bin("intent-bench")
        .expect("binary built")
        .args(["--run-id", "override", "--episodes", "3", "--steps", "4"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 episodes × 4 steps × 2 updaters → 24 rows"));

    let rows = fs::read_to_string(dir.path().join("override/steps.jsonl")).expect("jsonl");
    assert_eq!(rows.lines().count(), 24);
    assert!(dir.path().join("override/summary.md").exists());
}

#[test]
fn choose_method_keeps_matching_updaters() {
    let dir = tempdir().expect("temp dir");
    let config = write_config(dir.path());

    Command::cargo_bin("intent-bench")
        .expect("binary built")
        .arg("--config")
        .arg(&config)
        .args(["--choose-method", "--validate-only"])
        .write_stdin("conditional random fields\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Select the inference method"))
        .stdout(predicate::str::contains(
            "Selected inference method: Conditional Random Fields",
        ))
        .stdout(predicate::str::contains("with 1 updater "));
}

#[test]
fn choose_method_fails_when_input_closes() {
    let dir = tempdir().expect("temp dir");
    let config = write_config(dir.path());

    Command::cargo_bin("intent-bench")
        .expect("binary built")
        .arg("--config")
        .arg(&config)
        .arg("--choose-method")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("closed"));
}

#[test]
fn invalid_config_reports_the_field() {
    let dir = tempdir().expect("temp dir");
    let config = write_config(dir.path());
    let broken = fs::read_to_string(&config)
        .expect("config readable")
        .replace("baseline: \"bayes\"", "baseline: \"missing\"");
    fs::write(&config, broken).expect("config rewritten");

    Command::cargo_bin("intent-bench")
        .expect("binary built")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("metrics.baseline"));
}
