use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Reference wiring with the waits shrunk so sim runs finish quickly.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[burette]
dir_pin = 13
step_pin = 19
enable_pin = 12
start_sensor_pin = 16
end_sensor_pin = 7
step_freq_hz = 1000

[valve]
dir_pin = 24
step_pin = 18
enable_pin = 4
start_sensor_pin = 8
end_sensor_pin = 25
step_freq_hz = 75

[calibration]
steps_per_ml = 7704.16
burette_max_ml = 8.14
dose_freq_hz = 500

[sequence]
settle_ms = 1
rinse_cycles = 1

[titration]
max_volume_ml = 2.0
settle_ms = 1
min_step_ml = 0.05
max_step_ml = 0.5

[probe]
poll_period_ms = 10
sample_timeout_ms = 100
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["valve", "vessel"], 0, "valve at vessel", "stdout")]
#[case(&["fill"], 0, "burette filled", "stdout")]
#[case(&["rinse", "--cycles", "2"], 0, "2 cycles", "stdout")]
#[case(&["dose", "--ml", "0.05"], 0, "dosed", "stdout")]
#[case(&["dose", "--ml", "0,05"], 0, "dosed", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["dose"], 2, "required", "stderr")]
#[case(&["dose", "--ml", "abc"], 2, "not a number", "stderr")]
#[case(&["dose", "--ml", "-1"], 2, "Invalid input", "stderr")]
#[case(&["dose", "--ml", "nan"], 2, "Invalid input", "stderr")]
#[case(&["titrate", "--step-ml", "0.6", "--target-ph", "7"], 2, "step volume", "stderr")]
#[case(&["titrate", "--step-ml", "0.1", "--target-ph", "15"], 2, "Invalid input", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("titrator").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => assert.stdout(predicate::str::contains(needle)),
        _ => assert.stderr(predicate::str::contains(needle)),
    };
}

#[test]
fn json_dose_reports_dispensed_volume() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let output = Command::cargo_bin("titrator")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .args(["dose", "--ml", "0.3"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is one JSON object");
    assert_eq!(parsed["command"], "dose");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["requested_ml"].as_f64().unwrap(), 0.3);
    // Steps truncate, so dispensed lands just at or below the request
    let dispensed = parsed["dispensed_ml"].as_f64().unwrap();
    assert!(dispensed > 0.29 && dispensed <= 0.3, "dispensed {dispensed}");
}

#[test]
fn json_self_check_reports_probe_freshness() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let output = Command::cargo_bin("titrator")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("self-check")
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is one JSON object");
    assert_eq!(parsed["ok"], true);
    assert!(parsed["ph"].as_f64().is_some());
    assert!(parsed["probe_stalled_ms"].as_u64().unwrap() < 1_000);
}

#[test]
fn json_error_is_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let output = Command::cargo_bin("titrator")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .args(["dose", "--ml", "-0.5"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stderr).expect("stderr is one JSON object");
    assert_eq!(parsed["reason"], "InvalidInput");
    assert!(parsed["message"].as_str().unwrap().contains("What happened"));
}

#[test]
fn titrate_runs_to_completion_in_sim() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    // The sim probe drifts toward neutral, so a nearby target is reached
    // within a few increments; a capped run still exits 0.
    let output = Command::cargo_bin("titrator")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .args(["titrate", "--step-ml", "0.5", "--target-ph", "5.0"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is one JSON object");
    assert_eq!(parsed["command"], "titrate");
    assert!(parsed["final_ph"].as_f64().unwrap() >= 4.5);
    assert!(parsed["total_volume_ml"].as_f64().unwrap() <= 2.0 + 1e-9);
}

#[test]
fn missing_config_file_falls_back_to_reference_wiring() {
    // No --config and no etc/titrator.toml in the temp cwd: the built-in
    // sample config is used and argument validation still works.
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("titrator").unwrap();
    cmd.current_dir(dir.path())
        .args(["dose", "--ml", "-1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn bad_config_is_rejected_before_motion() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[burette]\ndir_pin = 13\n").unwrap();

    Command::cargo_bin("titrator")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .args(["fill"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}
