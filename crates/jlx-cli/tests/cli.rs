use assert_cmd::cargo::cargo_bin_cmd;

mod common;

use common::{parse_json, prepare_package};

#[test]
fn help_lists_lifecycle_commands() {
    let assert = cargo_bin_cmd!("jlx").arg("--help").assert().success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 help");
    for command in ["init", "compile", "update", "clean-all", "locate"] {
        assert!(output.contains(command), "help missing {command}: {output}");
    }
}

#[test]
fn missing_project_is_a_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = cargo_bin_cmd!("jlx")
        .current_dir(temp.path())
        .args(["--json", "--root"])
        .arg(temp.path())
        .arg("locate")
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["reason"], "configuration");
}

#[test]
fn missing_override_is_reported_without_searching() {
    let (_temp, root) = prepare_package("jlx-missing-julia");
    let assert = cargo_bin_cmd!("jlx")
        .env_remove("MYPKG_JULIA_PATH")
        .args(["--json", "--no-input", "--root"])
        .arg(&root)
        .args(["locate", "--julia", "/definitely/not/julia"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user-error");
    assert!(payload["message"]
        .as_str()
        .expect("message")
        .starts_with("jlx locate"));
}

#[cfg(unix)]
#[test]
fn locate_reports_explicit_julia() {
    let (temp, root) = prepare_package("jlx-locate");
    let julia = common::fake_julia(&temp.path().join("bin"), "1.9.4");
    let assert = cargo_bin_cmd!("jlx")
        .env("JULIA_DEPOT_PATH", temp.path().join("depot"))
        .args(["--json", "--no-input", "--root"])
        .arg(&root)
        .arg("locate")
        .arg("--julia")
        .arg(&julia)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["runtime"]["version"], "1.9.4");
    assert_eq!(payload["details"]["runtime"]["source"], "explicit-override");
}

#[cfg(unix)]
#[test]
fn env_override_must_satisfy_constraint() {
    let (temp, root) = prepare_package("jlx-constraint");
    let julia = common::fake_julia(&temp.path().join("bin"), "1.5.0");
    let assert = cargo_bin_cmd!("jlx")
        .env("MYPKG_JULIA_PATH", &julia)
        .args(["--json", "--no-input", "--root"])
        .arg(&root)
        .args(["locate", "--version-spec", ">=1.6"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["reason"], "configuration");
}

#[test]
fn quiet_suppresses_success_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (_pkg_temp, root) = prepare_package("jlx-quiet");
    let assert = cargo_bin_cmd!("jlx")
        .env("JULIA_DEPOT_PATH", temp.path().join("depot"))
        .env_remove("VIRTUAL_ENV")
        .env_remove("CONDA_PREFIX")
        .env_remove("MAMBA_PREFIX")
        .args(["-q", "--no-input", "--root"])
        .arg(&root)
        .arg("clean")
        .assert()
        .success();
    assert!(assert.get_output().stdout.is_empty());
}
