//! Error types for tubstore
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::FieldType;

/// Result type alias using TubError
pub type Result<T> = std::result::Result<T, TubError>;

/// Unified error type for tubstore operations
#[derive(Debug, Error)]
pub enum TubError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Datastore at {0} is read-only")]
    ReadOnly(PathBuf),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    // -------------------------------------------------------------------------
    // Manifest / Storage Errors
    // -------------------------------------------------------------------------
    #[error("No datastore at {0} and no schema (inputs/types) was supplied")]
    MissingSchema(PathBuf),

    #[error("Manifest corruption detected: {0}")]
    CorruptManifest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record {0} not found")]
    RecordNotFound(u64),

    #[error("Index {index} is outside the written range [0, {current_index})")]
    IndexOutOfRange { index: u64, current_index: u64 },

    // -------------------------------------------------------------------------
    // Record Contract Errors
    // -------------------------------------------------------------------------
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Field '{field}' is declared as {expected} but got {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: &'static str,
    },

    #[error("Field '{0}' holds a NaN or infinite float")]
    NonFiniteFloat(String),

    #[error("Expected {expected} inputs but received {found}")]
    ArityMismatch { expected: usize, found: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
