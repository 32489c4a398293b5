//! Integration tests driving the `silt` binary over stdin/stdout, the way a
//! scripted client would.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::tempdir;

/// Runs the REPL with the given input script and returns its stdout.
fn run_repl(data_dir: &Path, script: &str) -> String {
    let mut child = Command::new(env!("CARGO_BIN_EXE_silt"))
        .env("SILT_DATA_DIR", data_dir.to_str().unwrap())
        .env("SILT_BUFFER_MB", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn silt");

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        stdin.write_all(script.as_bytes()).expect("write failed");
        stdin.write_all(b"q\n").expect("write failed");
    }

    let output = child.wait_with_output().expect("failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn put_then_get_roundtrip() {
    let dir = tempdir().unwrap();
    let out = run_repl(dir.path(), "p 1 100\ng 1\n");

    assert!(out.contains("Put successful: 1 -> 100"));
    assert!(out.contains("100"));
    assert!(out.contains("bye"));
}

#[test]
fn delete_hides_key() {
    let dir = tempdir().unwrap();
    let out = run_repl(dir.path(), "p 5 50\nd 5\ng 5\ns\n");

    assert!(out.contains("Delete successful"));
    // The stats section still renders after the delete.
    assert!(out.contains("Logical Pairs:"));
}

#[test]
fn range_query_lists_pairs_in_order() {
    let dir = tempdir().unwrap();
    let out = run_repl(dir.path(), "p 3 30\np 1 10\np 2 20\nr 1 3\n");

    assert!(out.contains("1:10 2:20 "));
    assert!(!out.contains("3:30"), "end key is exclusive");
}

#[test]
fn data_survives_process_restart() {
    let dir = tempdir().unwrap();

    let _ = run_repl(dir.path(), "p 7 77\n");
    // The drop-flush persisted the buffer; a second process must see it.
    let out = run_repl(dir.path(), "g 7\n");
    assert!(out.contains("77"));
}

#[test]
fn unknown_commands_report_errors() {
    let dir = tempdir().unwrap();
    let out = run_repl(dir.path(), "z 1 2\np 1\n");

    assert!(out.contains("Error: Unknown command"));
    assert!(out.contains("Error: Command requires exactly 2 arguments"));
}
