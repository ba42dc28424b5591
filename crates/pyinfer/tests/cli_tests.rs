use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn pyinfer() -> Command {
    Command::cargo_bin("pyinfer").unwrap()
}

#[test]
fn test_check_clean_project() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.py"), "x = 1 + 2.5\n").unwrap();
    pyinfer()
        .arg("check")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found"));
}

#[test]
fn test_check_reports_incompatible_operands() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.py"), "x = 1\ny = {x} + x\n").unwrap();
    pyinfer()
        .arg("check")
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("bad:2"))
        .stdout(predicate::str::contains("unsupported operand types for +"));
}

#[test]
fn test_check_json_output() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.py"), "for c in 3:\n    pass\n").unwrap();
    let output = pyinfer()
        .args(["check", "--format", "json"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let diagnostic = &reports[0]["diagnostics"][0];
    assert_eq!(diagnostic["kind"], "not_iterable");
    assert_eq!(diagnostic["line"], 1);
}

#[test]
fn test_types_prints_bindings() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("shapes.py");
    fs::write(&file, "def area(w, h):\n    return w * h\nunit = area(1, 2)\n").unwrap();
    pyinfer()
        .arg("types")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("module shapes"))
        .stdout(predicate::str::contains("area("));
}

#[test]
fn test_config_disables_parameter_inference() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("pyinfer.toml"), "infer_parameters = false\n").unwrap();
    let file = dir.path().join("m.py");
    fs::write(&file, "def f(a):\n    return a + 1\n").unwrap();
    pyinfer()
        .args(["types", "--format", "json"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Any\""));
}

#[test]
fn test_missing_path_is_an_error() {
    pyinfer()
        .args(["check", "/definitely/not/here"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}
