//! Exit codes and messages of the natprobe binary

use std::process::Command;

fn natprobe(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_natprobe"))
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn missing_server_prints_help() {
    let out = natprobe(&[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Usage"));
}

#[test]
fn unresolvable_server_exits_with_message() {
    let out = natprobe(&["stun.nowhere.invalid"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("can't resolve address"));
}

#[test]
fn malformed_port_exits_with_message() {
    let out = natprobe(&["--server", "127.0.0.1:99999"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("malformed target"));
}
