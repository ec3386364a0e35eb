//! # tubstore
//!
//! Persistent record store ("tub") for a camera-equipped RC vehicle:
//! - Append-only, schema-typed records (scalars inline, images as JPEG)
//! - Bounded catalog segments with O(1) reopen via sidecar line indexes
//! - Tombstone deletion without rewriting history
//! - Crash-consistent manifest with O(1) resume after restart
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Vehicle Loop                             │
//! │              (TubWriter::run per iteration)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Tub                                   │
//! │        (typed encode/decode, images/ JPEG files)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Manifest                                │
//! │   (schema, catalog list, write cursor, tombstones)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────────┐
//!   │   Catalog   │          │ CatalogMetadata │
//!   │ (JSON lines)│          │    (sidecar)    │
//!   └──────┬──────┘          └────────┬────────┘
//!          │                          │
//!          ▼                          ▼
//!   ┌─────────────────────────────────────────┐
//!   │                Seekable                 │
//!   │      (line-length index, O(1) seek)     │
//!   └─────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod schema;

pub mod storage;
pub mod tub;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{TubError, Result};
pub use config::TubConfig;
pub use schema::{FieldType, Schema};
pub use storage::{Manifest, Record};
pub use tub::{Tub, TubRecord, TubWriter, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tubstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
