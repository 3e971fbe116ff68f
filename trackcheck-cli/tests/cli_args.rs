//! Argument handling of the `trackcheck` binary.

use std::process::Command;

fn trackcheck() -> Command {
    Command::new(env!("CARGO_BIN_EXE_trackcheck"))
}

#[test]
fn test_missing_ip_is_usage_error() {
    let output = trackcheck().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--ip"), "stderr: {stderr}");
}

#[test]
fn test_help_mentions_ip() {
    let output = trackcheck().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--ip <IP>"), "stdout: {stdout}");
}

#[test]
fn test_unreachable_server_exits_nonzero() {
    let host = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let output = trackcheck()
        .arg("--ip")
        .arg(&host)
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(&format!("http://{host}")), "stderr: {stderr}");
}
