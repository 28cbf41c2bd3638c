#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn capsup() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("capsup"))
}

#[test]
fn missing_config_exits_with_one() {
    let temp = tempdir().unwrap();

    capsup()
        .arg("run")
        .arg("--config")
        .arg(temp.path().join("absent.yaml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn invalid_yaml_exits_with_one() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("capsup.yaml");
    fs::write(&config_path, "settings: {interfaces: [eth0\n").unwrap();

    capsup()
        .arg("run")
        .arg("-c")
        .arg(&config_path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid YAML format"));
}

#[test]
fn missing_capture_binary_exits_with_two() {
    let temp = tempdir().unwrap();
    let config_path =
        common::write_config(temp.path(), &temp.path().join("no-tcpdump"), "eth0");

    capsup()
        .arg("run")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Capture binary not found"));

    assert!(!temp.path().join("captures").exists());
}

#[test]
fn uncreatable_output_dir_exits_with_two() {
    let temp = tempdir().unwrap();
    let tool = common::write_capture_tool(temp.path(), common::COOPERATIVE_CAPTURE);
    let config_path = temp.path().join("capsup.yaml");
    fs::write(temp.path().join("blocker"), "file, not a directory").unwrap();
    fs::write(
        &config_path,
        format!(
            "settings:\n  interfaces: eth0\n  output_dir: blocker/captures\n  tcpdump_bin: {}\n",
            tool.display()
        ),
    )
    .unwrap();

    capsup()
        .arg("run")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to create output dir"));
}

#[test]
fn plan_prints_one_command_per_interface() {
    let temp = tempdir().unwrap();
    let tool = temp.path().join("tcpdump");
    let config_path = common::write_config(temp.path(), &tool, "eth0, eth1, wlan0");
    let captures = temp.path().join("captures");

    let assert = capsup()
        .arg("plan")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    for (line, iface) in lines.iter().zip(["eth0", "eth1", "wlan0"]) {
        let expected = format!(
            "{} -i {iface} -s 0 -w {} -C 10 -W 4 -n -U",
            tool.display(),
            captures.join(format!("{iface}.pcap")).display()
        );
        assert_eq!(*line, expected);
    }

    // Planning never touches the filesystem.
    assert!(!captures.exists());
}

#[test]
fn plan_json_lists_output_paths() {
    let temp = tempdir().unwrap();
    let tool = temp.path().join("tcpdump");
    let config_path = common::write_config(temp.path(), &tool, "eth0,wlan0");

    let assert = capsup()
        .arg("plan")
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success();

    let plan: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("plan is valid JSON");
    let entries = plan.as_array().expect("plan is an array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["unit"], "wlan0");
    assert_eq!(
        entries[1]["output_path"],
        temp.path()
            .join("captures/wlan0.pcap")
            .display()
            .to_string()
    );
    assert_eq!(entries[0]["args"][1], "eth0");
}

#[test]
fn unknown_log_level_is_rejected() {
    capsup()
        .arg("--log-level")
        .arg("chatty")
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid log level"));
}
