//! Tests for Seekable
//!
//! These tests verify:
//! - Line-length index tracking on write
//! - O(1) seeking to line starts
//! - Non-destructive read_from and in-place update_line
//! - Restoring from a persisted index vs. rescanning
//! - A persisted index that no longer matches the file is rebuilt, not trusted
//! - Torn-tail handling on reopen
//! - Read-only mode

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;
use tubstore::storage::Seekable;
use tubstore::TubError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lines.txt");
    (temp_dir, path)
}

fn write_lines(path: &PathBuf, lines: &[&str]) -> Vec<u64> {
    let mut seekable = Seekable::open(path, false, None).unwrap();
    for line in lines {
        seekable.writeline(line).unwrap();
    }
    let lengths = seekable.line_lengths().to_vec();
    seekable.close().unwrap();
    lengths
}

fn append_raw(path: &PathBuf, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

// =============================================================================
// Write / Seek Tests
// =============================================================================

#[test]
fn test_offset_tracking() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();

    seekable.writeline("Line 1").unwrap();
    seekable.writeline("Line 2").unwrap();
    assert_eq!(seekable.lines(), 2);
    assert_eq!(seekable.line_lengths(), &[7, 7]);

    seekable.seek_line_start(1).unwrap();
    assert_eq!(seekable.readline().unwrap().as_deref(), Some("Line 1"));
    seekable.seek_line_start(2).unwrap();
    assert_eq!(seekable.readline().unwrap().as_deref(), Some("Line 2"));

    seekable.seek_end_of_file().unwrap();
    seekable.truncate_until_end(1).unwrap();
    seekable.writeline("Line 2 Revised").unwrap();
    seekable.seek_line_start(2).unwrap();
    assert_eq!(seekable.readline().unwrap().as_deref(), Some("Line 2 Revised"));
}

#[test]
fn test_writeline_does_not_double_newline() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();

    seekable.writeline("with newline\n").unwrap();
    seekable.writeline("without").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "with newline\nwithout\n");
    assert_eq!(seekable.lines(), 2);
}

#[test]
fn test_writeline_rejects_embedded_newline() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();

    let result = seekable.writeline("one\ntwo");

    assert!(matches!(result, Err(TubError::Storage(_))));
    assert_eq!(seekable.lines(), 0);
}

#[test]
fn test_readline_at_eof_returns_none() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();
    seekable.writeline("only").unwrap();

    assert_eq!(seekable.readline().unwrap(), None);

    seekable.seek_line_start(1).unwrap();
    assert_eq!(seekable.readline().unwrap().as_deref(), Some("only"));
    assert_eq!(seekable.readline().unwrap(), None);
}

#[test]
fn test_seek_past_last_line_positions_at_end() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();
    seekable.writeline("a").unwrap();
    seekable.writeline("b").unwrap();

    seekable.seek_line_start(10).unwrap();

    assert_eq!(seekable.position().unwrap(), seekable.total_length());
    assert_eq!(seekable.readline().unwrap(), None);
}

// =============================================================================
// read_from / update_line Tests
// =============================================================================

#[test]
fn test_read_from_restores_position() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();
    seekable.writeline("Line 1").unwrap();
    seekable.writeline("Line 2").unwrap();
    seekable.writeline("Line 3").unwrap();

    let before = seekable.position().unwrap();
    let lines = seekable.read_from(2).unwrap();

    assert_eq!(lines, vec!["Line 2", "Line 3"]);
    assert_eq!(seekable.position().unwrap(), before);
}

#[test]
fn test_update_middle_line() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();
    seekable.writeline("Line 1").unwrap();
    seekable.writeline("Line 2").unwrap();
    seekable.writeline("Line 3").unwrap();

    seekable.update_line(2, "replaced").unwrap();

    assert_eq!(seekable.read_from(1).unwrap(), vec!["Line 1", "replaced", "Line 3"]);

    // Appends land after line 3, not over it
    seekable.writeline("Line 4").unwrap();
    assert_eq!(
        seekable.read_from(1).unwrap(),
        vec!["Line 1", "replaced", "Line 3", "Line 4"]
    );
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "Line 1\nreplaced\nLine 3\nLine 4\n"
    );
}

#[test]
fn test_update_first_line_longer() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();
    seekable.writeline("Line 1").unwrap();
    seekable.writeline("Line 2").unwrap();
    seekable.writeline("Line 3").unwrap();

    seekable.update_line(1, "Line 1 is longer").unwrap();

    assert_eq!(
        seekable.read_from(1).unwrap(),
        vec!["Line 1 is longer", "Line 2", "Line 3"]
    );
    assert_eq!(seekable.line_lengths(), &[17, 7, 7]);
}

#[test]
fn test_update_last_line() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();
    seekable.writeline("a").unwrap();
    seekable.writeline("b").unwrap();

    seekable.update_line(2, "z").unwrap();

    assert_eq!(seekable.read_from(1).unwrap(), vec!["a", "z"]);
    assert_eq!(seekable.lines(), 2);
}

#[test]
fn test_truncate_until_end_drops_bytes() {
    let (_temp, path) = setup_temp_file();
    let mut seekable = Seekable::open(&path, false, None).unwrap();
    seekable.writeline("keep").unwrap();
    seekable.writeline("drop").unwrap();

    seekable.truncate_until_end(1).unwrap();

    assert_eq!(seekable.lines(), 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), 5);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_restore_from_index() {
    let (_temp, path) = setup_temp_file();
    let lengths = write_lines(&path, &["Line 1", "Line 2"]);

    let mut seekable = Seekable::open(&path, false, Some(lengths.as_slice())).unwrap();

    assert_eq!(seekable.lines(), 2);
    seekable.seek_line_start(1).unwrap();
    assert_eq!(seekable.readline().unwrap().as_deref(), Some("Line 1"));
    assert_eq!(seekable.readline().unwrap().as_deref(), Some("Line 2"));
}

#[test]
fn test_rescan_rebuilds_same_index() {
    let (_temp, path) = setup_temp_file();
    let lengths = write_lines(&path, &["{\"a\":1}", "{\"b\":22}", "x"]);

    let seekable = Seekable::open(&path, false, None).unwrap();

    assert_eq!(seekable.line_lengths(), lengths.as_slice());
    assert_eq!(seekable.total_length(), lengths.iter().sum::<u64>());
}

#[test]
fn test_reopen_appends_after_existing_lines() {
    let (_temp, path) = setup_temp_file();
    let lengths = write_lines(&path, &["one", "two"]);

    let mut seekable = Seekable::open(&path, false, Some(lengths.as_slice())).unwrap();
    seekable.writeline("three").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
}

#[test]
fn test_trusted_index_truncates_torn_tail() {
    let (_temp, path) = setup_temp_file();
    let lengths = write_lines(&path, &["one", "two"]);
    append_raw(&path, b"{\"partial\":");

    let mut seekable = Seekable::open(&path, false, Some(lengths.as_slice())).unwrap();

    assert_eq!(seekable.lines(), 2);
    assert_eq!(fs::metadata(&path).unwrap().len(), 8);

    seekable.writeline("three").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
}

#[test]
fn test_index_longer_than_file_falls_back_to_rescan() {
    let (_temp, path) = setup_temp_file();
    write_lines(&path, &["one", "two"]);

    let bogus: [u64; 4] = [4, 4, 4, 4];
    let seekable = Seekable::open(&path, false, Some(&bogus[..])).unwrap();

    assert_eq!(seekable.line_lengths(), &[4, 4]);
}

#[test]
fn test_index_with_longer_middle_line_rescans_without_truncating() {
    let (_temp, path) = setup_temp_file();
    let lengths = write_lines(&path, &["one", "two", "three"]);
    fs::write(&path, "one\ntwo grew\nthree\n").unwrap();

    let mut seekable = Seekable::open(&path, false, Some(lengths.as_slice())).unwrap();

    assert_eq!(seekable.line_lengths(), &[4, 9, 6]);
    assert_eq!(fs::metadata(&path).unwrap().len(), 19);
    assert_eq!(seekable.read_from(1).unwrap(), vec!["one", "two grew", "three"]);

    seekable.writeline("four").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo grew\nthree\nfour\n");
}

#[test]
fn test_index_with_longer_middle_line_rescans_read_only() {
    let (_temp, path) = setup_temp_file();
    let lengths = write_lines(&path, &["one", "two", "three"]);
    fs::write(&path, "one\ntwo grew\nthree\n").unwrap();

    let mut seekable = Seekable::open(&path, true, Some(lengths.as_slice())).unwrap();

    assert_eq!(seekable.lines(), 3);
    assert_eq!(seekable.read_from(3).unwrap(), vec!["three"]);
}

#[test]
fn test_index_with_shifted_line_ends_rescans() {
    let (_temp, path) = setup_temp_file();
    let lengths = write_lines(&path, &["one", "two", "three"]);
    // Same total size, different boundaries
    fs::write(&path, "one\ntw\nthree!\n").unwrap();

    let mut seekable = Seekable::open(&path, false, Some(lengths.as_slice())).unwrap();

    assert_eq!(seekable.line_lengths(), &[4, 3, 7]);
    assert_eq!(seekable.read_from(2).unwrap(), vec!["tw", "three!"]);
}

#[test]
fn test_rescan_drops_line_without_newline() {
    let (_temp, path) = setup_temp_file();
    write_lines(&path, &["one"]);
    append_raw(&path, b"tw");

    let seekable = Seekable::open(&path, false, None).unwrap();

    assert_eq!(seekable.lines(), 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "one\n");
}

// =============================================================================
// Read-only Tests
// =============================================================================

#[test]
fn test_read_only_rejects_writes() {
    let (_temp, path) = setup_temp_file();
    write_lines(&path, &["one"]);

    let mut seekable = Seekable::open(&path, true, None).unwrap();

    assert!(matches!(seekable.writeline("two"), Err(TubError::ReadOnly(_))));
    assert!(matches!(seekable.truncate_until_end(0), Err(TubError::ReadOnly(_))));
    seekable.seek_line_start(1).unwrap();
    assert_eq!(seekable.readline().unwrap().as_deref(), Some("one"));
}

#[test]
fn test_read_only_keeps_line_without_newline() {
    let (_temp, path) = setup_temp_file();
    write_lines(&path, &["one"]);
    append_raw(&path, b"tw");

    let mut seekable = Seekable::open(&path, true, None).unwrap();

    assert_eq!(seekable.lines(), 2);
    assert_eq!(seekable.read_from(1).unwrap(), vec!["one", "tw"]);
    assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntw");
}

#[test]
fn test_read_only_missing_file_fails() {
    let (_temp, path) = setup_temp_file();

    let result = Seekable::open(&path, true, None);

    assert!(matches!(result, Err(TubError::Io(_))));
}
