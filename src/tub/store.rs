//! Tub
//!
//! Type-aware layer over a `Manifest`: encodes declared fields (scalars inline,
//! images as JPEG files) into JSON records on the way in, and reverses the
//! encoding on the way out.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::DynamicImage;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::TubConfig;
use crate::error::{Result, TubError};
use crate::schema::{FieldType, Schema};
use crate::storage::{Manifest, ManifestIterator, Record};

use super::images::{image_file_name, load_image, save_image, IMAGES_DIR};
use super::value::{decode, encode, Encoded, Value};

/// Global index private field
pub const INDEX_FIELD: &str = "_index";

/// Write time private field, unix millis
pub const TIMESTAMP_FIELD: &str = "_timestamp_ms";

/// Recording session private field
pub const SESSION_FIELD: &str = "_session_id";

/// Field values keyed by input name
pub type Values = BTreeMap<String, Value>;

/// A decoded record
#[derive(Debug, Clone, PartialEq)]
pub struct TubRecord {
    /// Global index assigned at write time
    pub index: u64,

    /// Wall-clock write time (unix millis)
    pub timestamp_ms: i64,

    /// Session that wrote the record, absent in older tubs
    pub session_id: Option<String>,

    /// Declared fields present in the record
    pub values: Values,
}

impl TubRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}

/// Schema-typed datastore
pub struct Tub {
    base_path: PathBuf,
    images_path: PathBuf,
    manifest: Manifest,
}

impl Tub {
    /// Open or create a tub
    pub fn open(config: TubConfig) -> Result<Self> {
        let manifest = Manifest::open(&config)?;
        let base_path = config.base_path;
        let images_path = base_path.join(IMAGES_DIR);

        if !config.read_only && !images_path.exists() {
            fs::create_dir_all(&images_path)?;
        }

        Ok(Self {
            base_path,
            images_path,
            manifest,
        })
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Encode and append a record, returning its global index
    ///
    /// Keys outside the schema and `Value::Null` fields are dropped. Every
    /// field is validated before anything touches disk, so a type mismatch
    /// rejects the whole record. Image files written for a record that then
    /// fails to append are removed again.
    pub fn write_record(&mut self, record: &Values) -> Result<u64> {
        if self.manifest.is_read_only() {
            return Err(TubError::ReadOnly(self.base_path.clone()));
        }

        let index = self.manifest.current_index();
        let mut contents = Record::new();
        let mut images = Vec::new();

        for (key, value) in record {
            if value.is_null() {
                continue;
            }

            let field_type = match self.manifest.schema().field_type(key) {
                Some(field_type) => field_type,
                None => {
                    debug!(field = %key, "Dropping field not declared in the schema");
                    continue;
                }
            };

            match encode(key, field_type, value)? {
                Encoded::Json(json) => {
                    contents.insert(key.clone(), json);
                }
                Encoded::Image(image) => {
                    let name = image_file_name(index, key);
                    contents.insert(key.clone(), JsonValue::String(name.clone()));
                    images.push((name, image));
                }
            }
        }

        let mut saved = Vec::with_capacity(images.len());
        match self.persist(contents, images, &mut saved) {
            Ok(index) => Ok(index),
            Err(e) => {
                for path in &saved {
                    if let Err(remove_error) = fs::remove_file(path) {
                        warn!(
                            path = %path.display(),
                            error = %remove_error,
                            "Failed to remove image of a rejected record"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Save images, stamp private fields and append; `saved` collects every
    /// image file written so the caller can remove them on failure
    fn persist(
        &mut self,
        mut contents: Record,
        images: Vec<(String, &DynamicImage)>,
        saved: &mut Vec<PathBuf>,
    ) -> Result<u64> {
        let index = self.manifest.current_index();

        for (name, image) in images {
            let path = self.images_path.join(name);
            save_image(image, &path)?;
            saved.push(path);
        }

        contents.insert(
            TIMESTAMP_FIELD.to_string(),
            JsonValue::from(Utc::now().timestamp_millis()),
        );
        contents.insert(INDEX_FIELD.to_string(), JsonValue::from(index));
        contents.insert(
            SESSION_FIELD.to_string(),
            JsonValue::from(self.manifest.session_id()),
        );

        self.manifest.write_record(&contents)
    }

    pub fn delete_record(&mut self, index: u64) -> Result<()> {
        self.manifest.delete_record(index)
    }

    pub fn delete_records<I>(&mut self, indexes: I) -> Result<()>
    where
        I: IntoIterator<Item = u64>,
    {
        self.manifest.delete_records(indexes)
    }

    /// Tombstone the last `n` written records
    pub fn delete_last_n_records(&mut self, n: u64) -> Result<()> {
        let last_index = self.manifest.current_index();
        let first_index = last_index.saturating_sub(n);
        self.manifest.delete_records(first_index..last_index)
    }

    pub fn restore_record(&mut self, index: u64) -> Result<()> {
        self.manifest.restore_record(index)
    }

    pub fn restore_records<I>(&mut self, indexes: I) -> Result<()>
    where
        I: IntoIterator<Item = u64>,
    {
        self.manifest.restore_records(indexes)
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Read and decode one record; `Ok(None)` if it is tombstoned
    pub fn get_record(&self, index: u64) -> Result<Option<TubRecord>> {
        match self.manifest.read_record(index)? {
            Some(raw) => self.decode_record(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Decode a raw record, loading referenced images
    pub fn decode_record(&self, raw: &Record) -> Result<TubRecord> {
        let index = raw
            .get(INDEX_FIELD)
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| TubError::Storage(format!("record without {}", INDEX_FIELD)))?;
        let timestamp_ms = raw
            .get(TIMESTAMP_FIELD)
            .and_then(JsonValue::as_i64)
            .unwrap_or_default();
        let session_id = raw
            .get(SESSION_FIELD)
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        let mut values = Values::new();
        for (name, field_type) in self.manifest.schema().fields() {
            let json = match raw.get(name) {
                Some(json) => json,
                None => continue,
            };

            let value = match (field_type, decode(name, field_type, json)?) {
                (FieldType::ImageArray, Value::Str(file_name)) => {
                    Value::Image(load_image(&self.images_path.join(file_name))?)
                }
                (_, value) => value,
            };
            values.insert(name.to_string(), value);
        }

        Ok(TubRecord {
            index,
            timestamp_ms,
            session_id,
            values,
        })
    }

    /// Decoded records in index order, tombstones skipped
    pub fn iter(&self) -> TubIterator<'_> {
        TubIterator {
            tub: self,
            records: self.manifest.iter(),
        }
    }

    /// Raw JSON records in index order, tombstones skipped
    pub fn records(&self) -> ManifestIterator<'_> {
        self.manifest.iter()
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn close(self) -> Result<()> {
        self.manifest.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn images_path(&self) -> &Path {
        &self.images_path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn schema(&self) -> &Schema {
        self.manifest.schema()
    }

    pub fn inputs(&self) -> &[String] {
        self.manifest.inputs()
    }

    pub fn types(&self) -> &[FieldType] {
        self.manifest.types()
    }

    pub fn current_index(&self) -> u64 {
        self.manifest.current_index()
    }

    pub fn deleted_indexes(&self) -> &BTreeSet<u64> {
        self.manifest.deleted_indexes()
    }
}

/// Iterator decoding each live record of a tub
pub struct TubIterator<'a> {
    tub: &'a Tub,
    records: ManifestIterator<'a>,
}

impl<'a> Iterator for TubIterator<'a> {
    type Item = Result<TubRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.records.next()?;
        Some(raw.and_then(|raw| self.tub.decode_record(&raw)))
    }
}
