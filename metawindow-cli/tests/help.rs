use std::{fs, path::PathBuf};

use assert_cmd::cargo::{self};
use predicates::str::contains;

fn fixture(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("metawindow-cli-{}-{name}", std::process::id()));
    fs::write(&path, contents).unwrap();
    path
}

const CONFIG: &str = r#"[{
    "id": 7,
    "tabs": [{"title": "Users", "insertProc": "usr_ins", "updateProc": "usr_upd", "deleteProc": null}],
    "fields": [[
        {"name": "name", "label": "Name", "required": true},
        {"name": "email", "email": true},
        {"name": "active", "type": "checkbox"}
    ]]
}]"#;

#[test]
fn prints_help() {
    let mut cmd = cargo::cargo_bin_cmd!("metawindow");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("metawindow"))
        .stdout(contains("validate"));
}

#[test]
fn prints_defaults_of_a_window() {
    let config = fixture("defaults.json", CONFIG);
    let mut cmd = cargo::cargo_bin_cmd!("metawindow");
    cmd.arg("defaults")
        .arg(&config)
        .arg("--no-pretty")
        .assert()
        .success()
        .stdout(contains(r#""active":false"#));
}

#[test]
fn invalid_records_fail() {
    let config = fixture("validate.json", CONFIG);
    let record = fixture("record.json", r#"{"name": "", "email": "nope"}"#);
    let mut cmd = cargo::cargo_bin_cmd!("metawindow");
    cmd.arg("validate")
        .arg(&config)
        .arg(&record)
        .assert()
        .failure()
        .stdout(contains("Name is required"))
        .stdout(contains(r#""valid": false"#));
}

#[test]
fn reports_permissions() {
    let config = fixture("permissions.json", CONFIG);
    let mut cmd = cargo::cargo_bin_cmd!("metawindow");
    cmd.arg("permissions")
        .arg(&config)
        .arg("--no-pretty")
        .assert()
        .success()
        .stdout(contains(r#""delete":false"#));
}

#[test]
fn defaults_carry_the_configured_key() {
    let config = fixture("key.json", CONFIG);
    let mut cmd = cargo::cargo_bin_cmd!("metawindow");
    cmd.arg("defaults")
        .arg(&config)
        .arg("--id-field")
        .arg("code")
        .arg("--no-pretty")
        .assert()
        .success()
        .stdout(contains(r#""code":"""#));
}
