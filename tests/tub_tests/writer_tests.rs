//! Tests for TubWriter
//!
//! These tests verify:
//! - Positional run() against the declared inputs
//! - Arity errors write nothing
//! - Session bookkeeping on shutdown

use std::path::Path;

use image::{Rgb, RgbImage};
use serde_json::json;
use tempfile::TempDir;
use tubstore::storage::MANIFEST_FILENAME;
use tubstore::{FieldType, TubConfig, TubError, TubWriter, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn config(path: &Path) -> TubConfig {
    TubConfig::builder()
        .base_path(path)
        .input("user/angle", FieldType::Float)
        .input("user/throttle", FieldType::Float)
        .input("user/mode", FieldType::Str)
        .build()
        .unwrap()
}

fn setup_temp_writer() -> (TempDir, TubWriter) {
    let temp_dir = TempDir::new().unwrap();
    let writer = TubWriter::open(config(temp_dir.path())).unwrap();
    (temp_dir, writer)
}

fn sample(angle: f64) -> Vec<Value> {
    vec![Value::from(angle), Value::from(0.3), Value::from("user")]
}

// =============================================================================
// Run Tests
// =============================================================================

#[test]
fn test_run_returns_records_written() {
    let (_temp, mut writer) = setup_temp_writer();

    assert_eq!(writer.run(sample(0.1)).unwrap(), 1);
    assert_eq!(writer.run(sample(0.2)).unwrap(), 2);
    assert_eq!(writer.run(sample(0.3)).unwrap(), 3);
}

#[test]
fn test_run_maps_values_by_position() {
    let (_temp, mut writer) = setup_temp_writer();

    writer.run(sample(-0.5)).unwrap();

    let record = writer.iter().next().unwrap().unwrap();
    assert_eq!(record.get("user/angle"), Some(&Value::Float(-0.5)));
    assert_eq!(record.get("user/throttle"), Some(&Value::Float(0.3)));
    assert_eq!(record.get("user/mode"), Some(&Value::Str("user".to_string())));
}

#[test]
fn test_run_accepts_homogeneous_args() {
    let temp_dir = TempDir::new().unwrap();
    let config = TubConfig::builder()
        .base_path(temp_dir.path())
        .input("a", FieldType::Int)
        .input("b", FieldType::Int)
        .build()
        .unwrap();
    let mut writer = TubWriter::open(config).unwrap();

    writer.run([1i64, 2]).unwrap();

    let record = writer.iter().next().unwrap().unwrap();
    assert_eq!(record.get("b"), Some(&Value::Int(2)));
}

#[test]
fn test_run_arity_mismatch_writes_nothing() {
    let (_temp, mut writer) = setup_temp_writer();

    let result = writer.run(vec![Value::from(0.1), Value::from(0.2)]);

    assert!(matches!(
        result,
        Err(TubError::ArityMismatch { expected: 3, found: 2 })
    ));
    assert_eq!(writer.tub().current_index(), 0);
}

#[test]
fn test_run_with_missing_reading() {
    let (_temp, mut writer) = setup_temp_writer();

    writer
        .run(vec![Value::from(0.1), Value::from(None::<f64>), Value::from("local")])
        .unwrap();

    let record = writer.iter().next().unwrap().unwrap();
    assert_eq!(record.get("user/throttle"), None);
    assert_eq!(record.values.len(), 2);
}

#[test]
fn test_run_with_image() {
    let temp_dir = TempDir::new().unwrap();
    let config = TubConfig::builder()
        .base_path(temp_dir.path())
        .input("cam/image_array", FieldType::ImageArray)
        .input("user/angle", FieldType::Float)
        .build()
        .unwrap();
    let mut writer = TubWriter::open(config).unwrap();
    let image = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));

    writer.run(vec![Value::from(image), Value::from(0.0)]).unwrap();

    assert!(temp_dir.path().join("images").join("0_cam_image_array.jpg").exists());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_shutdown_records_session() {
    let temp_dir = TempDir::new().unwrap();
    let mut writer = TubWriter::open(config(temp_dir.path())).unwrap();
    let session = writer.tub().manifest().session_id().to_string();
    writer.run(sample(0.1)).unwrap();

    writer.shutdown().unwrap();

    let manifest = std::fs::read_to_string(temp_dir.path().join(MANIFEST_FILENAME)).unwrap();
    let line: serde_json::Value = serde_json::from_str(manifest.lines().nth(3).unwrap()).unwrap();
    assert_eq!(line["sessions"]["last_full_id"], json!(session));
}

#[test]
fn test_tub_mut_allows_tombstones() {
    let (_temp, mut writer) = setup_temp_writer();
    for i in 0..4u32 {
        writer.run(sample(f64::from(i) * 0.1)).unwrap();
    }

    writer.tub_mut().delete_last_n_records(2).unwrap();

    assert_eq!(writer.tub().len(), 2);
    assert_eq!(writer.iter().count(), 2);
    writer.close().unwrap();
}
