//! End-to-end tests for the `obd-triggerctl` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn triggerctl() -> Command {
    let mut cmd = Command::cargo_bin("obd-triggerctl").expect("binary built");
    cmd.env_remove("OBD_TRIGGERS_CONFIG");
    cmd
}

fn demo_scenario() -> String {
    format!("{}/scenarios/rpm-shift.json", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn compile_prints_predicate() {
    triggerctl()
        .args([
            "compile",
            "--thing",
            "car1",
            "--property",
            "RPM",
            "--comparator",
            "gt",
            "--threshold",
            "3000",
            "--message",
            "Shift up",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "FROM '$aws/things/car1/shadow/update/accepted'",
        ))
        .stdout(predicate::str::contains("NOT (state.reported.prevRPM > 3000)"));
}

#[test]
fn compile_rejects_unknown_comparator() {
    triggerctl()
        .args([
            "compile",
            "--thing",
            "car1",
            "--property",
            "RPM",
            "--comparator",
            "ge",
            "--threshold",
            "3000",
            "--message",
            "Shift up",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown comparator 'ge'"));
}

#[test]
fn evaluate_json_reports_firing() {
    triggerctl()
        .args([
            "--format",
            "json",
            "evaluate",
            "--property",
            "RPM",
            "--comparator",
            "gt",
            "--threshold",
            "3000",
            "--previous",
            "2800",
            "--current",
            "3100",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fires\": true"));
}

#[test]
fn run_demo_scenario() {
    triggerctl()
        .args(["--format", "json", "run", &demo_scenario()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"deliveries\": 2"))
        .stdout(predicate::str::contains("rule limit exceeded"));
}

#[test]
fn strict_run_fails_on_failed_step() {
    triggerctl()
        .args(["run", "--strict", &demo_scenario()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 scenario step(s) failed"));
}

#[test]
fn bad_config_file_fails() {
    triggerctl()
        .args(["--config", "does/not/exist.json", "run", &demo_scenario()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}
