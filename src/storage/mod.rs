//! Storage Module
//!
//! Append-only, crash-consistent record storage.
//!
//! ## Responsibilities
//! - Line-addressed files with an O(1) seek index (`Seekable`)
//! - Bounded JSON-record segments with a sidecar index (`Catalog`)
//! - Top-level manifest: schema, catalog list, write cursor, tombstones
//! - Lazy, tombstone-aware iteration across catalogs
//! - Compaction of tombstoned records (future)
//!
//! ## On-disk Layout
//! ```text
//! {base_path}/
//!   ├── manifest.json                  5 JSON lines (see manifest.rs)
//!   ├── catalog_0.catalog              one JSON record per line
//!   ├── catalog_0.catalog_manifest     {created_at, line_lengths, path, start_index}
//!   ├── catalog_1.catalog
//!   ├── catalog_1.catalog_manifest
//!   └── images/                        JPEG payloads referenced by records
//! ```

mod catalog;
mod iterator;
mod manifest;
mod seekable;

pub use catalog::{Catalog, CatalogMetadata, CATALOG_MANIFEST_EXTENSION, LOST_RECORD_LINE};
pub use iterator::ManifestIterator;
pub use manifest::{Manifest, ManifestMetadata, Sessions, MANIFEST_FILENAME};
pub use seekable::Seekable;

/// One persisted record: a JSON object with sorted keys
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Wall-clock time in fractional seconds since the epoch
pub(crate) fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
