//! wiredump CLI round-trips: encode a small record, run the binary, and
//! check the printed tree.

use std::io::Write;
use std::process::Command;

mod testutil {
    include!("testutil.rs");
}
use testutil::*;

fn wiredump(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_wiredump"));
    cmd.args(args);
    cmd
}

#[test]
fn dumps_scalars_and_nested_records() {
    let mut inner = Vec::new();
    inner.extend(field_varint(1, 42));
    inner.extend(field_delim(2, b"hello"));

    let mut input = Vec::new();
    input.extend(field_varint(1, 150));
    input.extend(field_fixed32(4, 7));
    input.extend(field_delim(3, &inner));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&input).unwrap();

    let out = wiredump(&[file.path().to_str().unwrap()])
        .output()
        .expect("binary runs");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("1: varint 150"), "{text}");
    assert!(text.contains("4: fixed32 7"), "{text}");
    assert!(text.contains("3: record"), "{text}");
    assert!(text.contains("1: varint 42"), "{text}");
    assert!(text.contains("2: \"hello\""), "{text}");
}

#[test]
fn rejects_garbage() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // Wiretype 7 does not exist.
    file.write_all(&[0x0F, 0x01, 0x02]).unwrap();
    let out = wiredump(&[file.path().to_str().unwrap()])
        .output()
        .expect("binary runs");
    assert!(!out.status.success());
}

#[test]
fn reads_stdin_when_no_path_given() {
    use std::process::Stdio;
    let mut child = wiredump(&[])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("binary runs");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&field_varint(5, 9))
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8(out.stdout).unwrap().contains("5: varint 9"));
}
