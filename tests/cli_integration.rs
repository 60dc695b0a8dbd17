#![cfg(feature = "cli")]

use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_svndelta").to_string()
}

fn run(args: &[&str], paths: &[&Path]) -> Output {
    Command::new(bin())
        .args(args)
        .args(paths)
        .output()
        .unwrap()
}

#[test]
fn cli_encode_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let target = dir.path().join("target.bin");
    let delta = dir.path().join("delta.svndiff");
    let output = dir.path().join("output.bin");

    std::fs::write(&source, b"abcde12345abcde12345").unwrap();
    std::fs::write(&target, b"abcdeXXXXXabcde12345!").unwrap();

    let out = run(&["encode", "--source"], &[&source, &target, &delta]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(&std::fs::read(&delta).unwrap()[..4], b"SVN\0");

    let out = run(&["decode", "--source"], &[&source, &delta, &output]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        std::fs::read(&output).unwrap(),
        std::fs::read(&target).unwrap()
    );
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let target = dir.path().join("target.bin");
    let delta = dir.path().join("delta.svndiff");
    std::fs::write(&source, b"old").unwrap();
    std::fs::write(&target, b"new").unwrap();
    std::fs::write(&delta, b"keep me").unwrap();

    let out = run(&["encode", "--source"], &[&source, &target, &delta]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(std::fs::read(&delta).unwrap(), b"keep me");

    let out = run(&["--force", "encode", "--source"], &[&source, &target, &delta]);
    assert!(out.status.success());
    assert_ne!(std::fs::read(&delta).unwrap(), b"keep me");
}

#[test]
fn cli_compose_and_json_stats() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base");
    let mid = dir.path().join("mid");
    let target = dir.path().join("target");
    let ab = dir.path().join("ab");
    let bc = dir.path().join("bc");
    let ac = dir.path().join("ac");
    let output = dir.path().join("output");

    let base_data = b"one two three four five six seven eight nine ten".repeat(10);
    let mut mid_data = base_data.clone();
    mid_data.extend_from_slice(b" eleven");
    let target_data = [b"zero ".as_slice(), &mid_data[4..]].concat();
    std::fs::write(&base, &base_data).unwrap();
    std::fs::write(&mid, &mid_data).unwrap();
    std::fs::write(&target, &target_data).unwrap();

    assert!(run(&["encode", "--algorithm", "vdelta", "-s"], &[&base, &mid, &ab]).status.success());
    assert!(run(&["encode", "-s"], &[&mid, &target, &bc]).status.success());

    let out = run(&["--json", "compose"], &[&ab, &bc, &ac]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stats: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(stats["command"], "compose");
    assert_eq!(stats["windows"], 1);

    assert!(run(&["decode", "-s"], &[&base, &ac, &output]).status.success());
    assert_eq!(std::fs::read(&output).unwrap(), target_data);
}

#[test]
fn cli_print_lists_windows() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let target = dir.path().join("target");
    let delta = dir.path().join("delta");
    std::fs::write(&source, vec![b'x'; 5000]).unwrap();
    std::fs::write(&target, vec![b'x'; 5000]).unwrap();

    let out = run(&["encode", "--window-size", "2K", "-s"], &[&source, &target, &delta]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let out = run(&["print", "--ops"], &[&delta]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert_eq!(text.matches("window number:").count(), 3);
    assert!(text.contains("source"));
}

#[test]
fn cli_decode_rejects_garbage() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let delta = dir.path().join("delta");
    let output = dir.path().join("output");
    std::fs::write(&source, b"").unwrap();
    std::fs::write(&delta, b"not an svndiff").unwrap();

    let out = run(&["decode", "-s"], &[&source, &delta, &output]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid header"));
}

#[test]
fn cli_config_works() {
    let out = Command::new(bin()).arg("config").output().unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("DEFAULT_WINDOW_SIZE=102400"));
}
