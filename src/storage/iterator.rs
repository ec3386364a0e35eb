//! Manifest Iterator
//!
//! Sequential, tombstone-aware iteration over every catalog of a manifest.

use tracing::warn;

use crate::error::Result;
use crate::storage::{Catalog, Manifest, Record};

/// Lazy forward-only cursor across catalogs
///
/// Catalogs are opened read-only, one at a time, in `catalog_paths` order.
/// A line that fails to decode (for example a record torn by a crash) is
/// logged and skipped; iteration continues with the next line.
pub struct ManifestIterator<'a> {
    manifest: &'a Manifest,
    /// Position in `catalog_paths` of the catalog being read
    catalog_position: usize,
    current_catalog: Option<Catalog>,
    /// Global index of the next line
    current_index: u64,
}

impl<'a> ManifestIterator<'a> {
    pub(crate) fn new(manifest: &'a Manifest) -> Self {
        Self {
            manifest,
            catalog_position: 0,
            current_catalog: None,
            current_index: 0,
        }
    }

    fn open_catalog(&self, position: usize) -> Result<Catalog> {
        let name = &self.manifest.catalog_paths()[position];
        let start_index = position as u64 * self.manifest.max_len();
        let mut catalog = Catalog::open(&self.manifest.base_path().join(name), true, start_index)?;
        catalog.rewind()?;
        Ok(catalog)
    }

    fn advance_catalog(&mut self) {
        self.current_catalog = None;
        self.catalog_position += 1;
    }
}

impl<'a> Iterator for ManifestIterator<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.catalog_position >= self.manifest.catalog_paths().len() {
                return None;
            }

            if self.current_catalog.is_none() {
                match self.open_catalog(self.catalog_position) {
                    Ok(catalog) => {
                        self.current_index = catalog.start_index();
                        self.current_catalog = Some(catalog);
                    }
                    Err(e) => {
                        self.advance_catalog();
                        return Some(Err(e));
                    }
                }
            }

            let line = match self.current_catalog.as_mut().map(Catalog::next_line) {
                Some(Ok(Some(line))) => line,
                Some(Ok(None)) | None => {
                    self.advance_catalog();
                    continue;
                }
                Some(Err(e)) => {
                    self.advance_catalog();
                    return Some(Err(e));
                }
            };

            let index = self.current_index;
            self.current_index += 1;

            // Lines past the cursor were never acknowledged by the manifest
            if index >= self.manifest.current_index() {
                self.advance_catalog();
                continue;
            }

            if self.manifest.deleted_indexes().contains(&index) {
                continue;
            }

            match serde_json::from_str::<Record>(&line) {
                Ok(record) => return Some(Ok(record)),
                Err(e) => {
                    warn!(index, error = %e, "Ignoring malformed record");
                    continue;
                }
            }
        }
    }
}
