#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tempfile::tempdir;

const INTERFACES: [&str; 3] = ["eth0", "eth1", "wlan0"];

fn spawn_capsup(config_path: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_capsup"))
        .arg("run")
        .arg("--config")
        .arg(config_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn capsup")
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().expect("try_wait failed") {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("capsup did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn shutdown_on(sig: Signal) {
    let temp = tempdir().unwrap();
    let dir = temp.path();
    let tool = common::write_capture_tool(dir, common::COOPERATIVE_CAPTURE);
    let config_path = common::write_config(dir, &tool, "eth0, eth1, wlan0");
    let output_dir = dir.join("captures");

    let mut child = spawn_capsup(&config_path);
    for iface in INTERFACES {
        common::wait_for_contents(&output_dir.join(format!("{iface}.stderr.log")), "capture");
    }

    signal::kill(Pid::from_raw(child.id() as i32), sig).expect("failed to signal capsup");
    let status = wait_for_exit(&mut child, Duration::from_secs(20));
    assert_eq!(status.code(), Some(0), "capsup exited with {status:?}");

    for iface in INTERFACES {
        let log = fs::read_to_string(output_dir.join(format!("{iface}.stderr.log"))).unwrap();
        assert!(log.contains(&format!("terminated {iface}")), "log: {log}");
        let capture = output_dir.join(format!("{iface}.pcap"));
        assert!(log.contains(&format!("writing {}", capture.display())), "log: {log}");
    }

    let output = child.wait_with_output().expect("collect capsup output");
    let logs = String::from_utf8_lossy(&output.stderr);
    assert!(logs.contains("Received termination signal"), "logs: {logs}");
    assert!(logs.contains("All captures stopped."), "logs: {logs}");
}

#[test]
fn sigterm_stops_all_captures_and_exits_zero() {
    shutdown_on(Signal::SIGTERM);
}

#[test]
fn sigint_takes_the_same_shutdown_path() {
    shutdown_on(Signal::SIGINT);
}

#[test]
fn crashed_capture_is_restarted_by_the_binary() {
    let temp = tempdir().unwrap();
    let dir = temp.path();
    let tool = common::write_capture_tool(dir, common::FLAKY_ETH1_CAPTURE);
    let config_path = common::write_config(dir, &tool, "eth0, eth1, wlan0");
    let eth1_log = dir.join("captures/eth1.stderr.log");

    let mut child = spawn_capsup(&config_path);

    // Default backoff is 2s and polling 1s, so the second run shows up within a few
    // seconds.
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let log = fs::read_to_string(&eth1_log).unwrap_or_default();
        if log.matches("capture eth1").count() >= 2 {
            break;
        }
        assert!(Instant::now() < deadline, "eth1 was not restarted: {log}");
        thread::sleep(Duration::from_millis(100));
    }

    signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).unwrap();
    let status = wait_for_exit(&mut child, Duration::from_secs(20));
    assert_eq!(status.code(), Some(0));

    let output = child.wait_with_output().unwrap();
    let logs = String::from_utf8_lossy(&output.stderr);
    assert!(logs.contains("Capture for 'eth1' exited with code 1"), "logs: {logs}");
    assert!(logs.contains("Restarted capture for 'eth1'"), "logs: {logs}");
}
