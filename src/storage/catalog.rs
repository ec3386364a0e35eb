//! Catalog segments
//!
//! A catalog is one bounded, append-only file of JSON records
//! (`catalog_<N>.catalog`) plus a single-line sidecar
//! (`catalog_<N>.catalog_manifest`) holding the line-length index, so the
//! segment can be reopened without scanning its contents.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TubError};
use crate::storage::{now_secs, Record, Seekable};

/// Extension of the sidecar written next to each catalog
pub const CATALOG_MANIFEST_EXTENSION: &str = "catalog_manifest";

/// Line standing in for a record lost before it reached the catalog.
/// It is not JSON, so readers skip it like any other malformed line.
pub const LOST_RECORD_LINE: &str = "#lost";

/// Sidecar contents; fields are declared in sorted key order
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogMetadataContents {
    created_at: f64,
    line_lengths: Vec<u64>,
    path: String,
    start_index: u64,
}

/// Durable index for one catalog
///
/// NOTE: the whole `line_lengths` array is re-serialized on every write, so
/// the sidecar rewrite grows linearly with the segment. Catalogs are bounded
/// by `max_len`, which keeps this acceptable; an incremental format would be
/// the place to optimize.
#[derive(Debug)]
pub struct CatalogMetadata {
    manifest_path: PathBuf,
    /// `None` only for a read-only catalog whose sidecar is missing
    seekable: Option<Seekable>,
    contents: CatalogMetadataContents,
}

impl CatalogMetadata {
    /// Load the sidecar of `catalog_path`, or create it with `start_index`
    pub fn open(catalog_path: &Path, read_only: bool, start_index: u64) -> Result<Self> {
        let manifest_path = Self::sidecar_path(catalog_path);

        let mut seekable = if read_only && !manifest_path.exists() {
            None
        } else {
            Some(Seekable::open(&manifest_path, read_only, None)?)
        };

        let existing = match seekable.as_mut() {
            Some(seekable) if seekable.has_content() => Self::read_contents(seekable)?,
            _ => None,
        };

        let has_contents = existing.is_some();
        let contents = existing.unwrap_or_else(|| CatalogMetadataContents {
            created_at: now_secs(),
            line_lengths: Vec::new(),
            path: manifest_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            start_index,
        });

        let mut metadata = Self {
            manifest_path,
            seekable,
            contents,
        };

        if !has_contents && !read_only {
            metadata.update()?;
        }

        Ok(metadata)
    }

    fn read_contents(seekable: &mut Seekable) -> Result<Option<CatalogMetadataContents>> {
        seekable.seek_line_start(1)?;
        let line = match seekable.readline()? {
            Some(line) if !line.is_empty() => line,
            _ => return Ok(None),
        };

        match serde_json::from_str(&line) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) => {
                warn!(
                    path = %seekable.path().display(),
                    error = %e,
                    "Unparsable catalog sidecar; the catalog will be rescanned"
                );
                Ok(None)
            }
        }
    }

    /// `catalog_3.catalog` → `catalog_3.catalog_manifest`
    pub fn sidecar_path(catalog_path: &Path) -> PathBuf {
        catalog_path.with_extension(CATALOG_MANIFEST_EXTENSION)
    }

    pub fn update_line_lengths(&mut self, line_lengths: &[u64]) -> Result<()> {
        self.contents.line_lengths.clear();
        self.contents.line_lengths.extend_from_slice(line_lengths);
        self.update()
    }

    pub fn line_lengths(&self) -> &[u64] {
        &self.contents.line_lengths
    }

    pub fn start_index(&self) -> u64 {
        self.contents.start_index
    }

    pub fn created_at(&self) -> f64 {
        self.contents.created_at
    }

    pub fn path(&self) -> &Path {
        &self.manifest_path
    }

    /// Rewrite the single metadata line
    fn update(&mut self) -> Result<()> {
        let seekable = self
            .seekable
            .as_mut()
            .ok_or_else(|| TubError::ReadOnly(self.manifest_path.clone()))?;
        let line = serde_json::to_string(&self.contents)?;
        seekable.truncate_until_end(0)?;
        seekable.writeline(&line)
    }

    pub fn close(self) -> Result<()> {
        match self.seekable {
            Some(seekable) => seekable.close(),
            None => Ok(()),
        }
    }
}

/// One append-only segment of JSON records
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    metadata: CatalogMetadata,
    seekable: Seekable,
    read_only: bool,
}

impl Catalog {
    /// Open or create a catalog
    ///
    /// `start_index` is only used when no sidecar exists yet.
    pub fn open(path: &Path, read_only: bool, start_index: u64) -> Result<Self> {
        let metadata = CatalogMetadata::open(path, read_only, start_index)?;
        let seekable = Seekable::open(path, read_only, Some(metadata.line_lengths()))?;

        let mut catalog = Self {
            path: path.to_path_buf(),
            metadata,
            seekable,
            read_only,
        };

        if !read_only && catalog.metadata.line_lengths() != catalog.seekable.line_lengths() {
            debug!(
                path = %catalog.path.display(),
                lines = catalog.seekable.lines(),
                "Persisting rebuilt catalog index"
            );
            catalog.sync_metadata()?;
        }

        Ok(catalog)
    }

    /// Append one record as a single sorted-key JSON line, then persist the
    /// updated line index to the sidecar
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        if self.read_only {
            return Err(TubError::ReadOnly(self.path.clone()));
        }

        let contents = serde_json::to_string(record)?;
        self.seekable.writeline(&contents)?;
        self.sync_metadata()
    }

    /// Append `count` placeholder lines for records that never made it to disk
    pub fn pad_lost(&mut self, count: usize) -> Result<()> {
        if self.read_only {
            return Err(TubError::ReadOnly(self.path.clone()));
        }

        for _ in 0..count {
            self.seekable.writeline(LOST_RECORD_LINE)?;
        }
        self.sync_metadata()
    }

    /// Drop every record after the first `len`
    pub fn truncate(&mut self, len: usize) -> Result<()> {
        self.seekable.truncate_until_end(len)?;
        self.sync_metadata()
    }

    fn sync_metadata(&mut self) -> Result<()> {
        self.metadata.update_line_lengths(self.seekable.line_lengths())
    }

    /// Position the reader at the first record
    pub fn rewind(&mut self) -> Result<()> {
        self.seekable.seek_line_start(1)
    }

    /// Raw contents of the next line, `None` at end of catalog
    pub fn next_line(&mut self) -> Result<Option<String>> {
        self.seekable.readline()
    }

    /// Raw contents of line `offset` (0-based within this catalog)
    pub fn read_line(&mut self, offset: u64) -> Result<Option<String>> {
        let offset = usize::try_from(offset)
            .map_err(|_| TubError::Storage(format!("line offset {} too large", offset)))?;
        if offset >= self.seekable.lines() {
            return Ok(None);
        }
        self.seekable.seek_line_start(offset + 1)?;
        let line = self.seekable.readline()?;
        self.seekable.seek_end_of_file()?;
        Ok(line)
    }

    /// Number of physical lines (tombstoned records included)
    pub fn len(&self) -> usize {
        self.seekable.lines()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start_index(&self) -> u64 {
        self.metadata.start_index()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &CatalogMetadata {
        &self.metadata
    }

    pub fn close(self) -> Result<()> {
        self.metadata.close()?;
        self.seekable.close()
    }
}
