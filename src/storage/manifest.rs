//! Manifest
//!
//! The top-level index of a datastore. `manifest.json` is newline-delimited
//! JSON with exactly five lines, in this order:
//!
//! ```text
//! 1  [ inputs ]
//! 2  [ types ]
//! 3  { user metadata }
//! 4  { manifest metadata: created_at, sessions }
//! 5  { paths, current_index, max_len, deleted_indexes }
//! ```
//!
//! Line 5 is rewritten after every record write and every tombstone change;
//! line 4 is rewritten on close when the session wrote records.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::config::TubConfig;
use crate::error::{Result, TubError};
use crate::schema::{FieldType, Schema};
use crate::storage::{now_secs, Catalog, ManifestIterator, Record, Seekable};

/// File name of the manifest inside the base directory
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Physical lines in a well-formed manifest
const MANIFEST_LINES: usize = 5;

/// Line holding the manifest metadata (1-based)
const MANIFEST_METADATA_LINE: usize = 4;

/// Recording sessions seen by this datastore
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sessions {
    pub last_id: u64,
    pub last_full_id: String,
    pub all_full_ids: Vec<String>,
}

/// Line 4: datastore-level metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Creation time, seconds since the epoch
    pub created_at: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Sessions>,

    /// Keys written by other tools are kept as-is
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ManifestMetadata {
    fn new() -> Self {
        Self {
            created_at: now_secs(),
            sessions: None,
            extra: Map::new(),
        }
    }
}

/// Line 5 as read from disk
#[derive(Debug, Deserialize)]
struct CatalogIndex {
    paths: Vec<String>,
    current_index: u64,
    max_len: u64,
    #[serde(default)]
    deleted_indexes: Vec<u64>,
}

/// Line 5 as written to disk
#[derive(Debug, Serialize)]
struct CatalogIndexRef<'a> {
    paths: &'a [String],
    current_index: u64,
    max_len: u64,
    deleted_indexes: &'a BTreeSet<u64>,
}

/// All five sections of the manifest file
#[derive(Debug)]
struct ManifestContents {
    schema: Schema,
    metadata: Map<String, JsonValue>,
    manifest_metadata: ManifestMetadata,
    catalog_index: CatalogIndex,
}

/// Durable index tying schema, catalogs, write cursor and tombstones together
///
/// ## Ownership
/// A `Manifest` is an owned handle: all mutation goes through `&mut self`,
/// and iterators borrow it immutably, so a live iterator and a write on the
/// same handle cannot coexist. There is no internal locking; one writer per
/// datastore directory.
///
/// ## Deletion
/// Deletes are tombstones only. Catalog bytes of deleted records are never
/// reclaimed; there is no compaction.
#[derive(Debug)]
pub struct Manifest {
    base_path: PathBuf,
    read_only: bool,

    schema: Schema,
    metadata: Map<String, JsonValue>,
    manifest_metadata: ManifestMetadata,

    catalog_paths: Vec<String>,
    current_index: u64,
    max_len: u64,
    deleted_indexes: BTreeSet<u64>,

    /// `manifest.json`
    seekable: Seekable,

    /// Catalog receiving writes; `None` when opened read-only
    current_catalog: Option<Catalog>,

    session_id: String,
    updated_session: bool,
}

impl Manifest {
    /// Open an existing datastore or create a new one
    ///
    /// On startup:
    /// 1. Load `manifest.json` if present (schema in `config` is ignored)
    /// 2. Otherwise require a schema and create the base directory
    /// 3. Create the first catalog, or reopen the last one via its sidecar
    /// 4. Reconcile the write cursor with the active catalog
    /// 5. Start a new recording session (writable only)
    pub fn open(config: &TubConfig) -> Result<Self> {
        let base_path = config.base_path.clone();
        let manifest_path = base_path.join(MANIFEST_FILENAME);
        let read_only = config.read_only;

        if !manifest_path.exists() {
            if config.schema.is_none() {
                return Err(TubError::MissingSchema(base_path));
            }
            if read_only {
                return Err(TubError::ReadOnly(base_path));
            }
            if !base_path.exists() {
                fs::create_dir_all(&base_path)?;
                info!(path = %base_path.display(), "Created a new datastore");
            }
        }

        let mut seekable = Seekable::open(&manifest_path, read_only, None)?;

        let contents = if seekable.has_content() {
            let contents = Self::read_contents(&mut seekable)?;
            if let Some(schema) = &config.schema {
                if *schema != contents.schema {
                    warn!(
                        path = %base_path.display(),
                        "Ignoring supplied schema; the datastore keeps the schema it was created with"
                    );
                }
            }
            contents
        } else {
            let schema = config
                .schema
                .clone()
                .ok_or_else(|| TubError::MissingSchema(base_path.clone()))?;
            if read_only {
                return Err(TubError::ReadOnly(base_path));
            }
            ManifestContents {
                schema,
                metadata: config.metadata.clone(),
                manifest_metadata: ManifestMetadata::new(),
                catalog_index: CatalogIndex {
                    paths: Vec::new(),
                    current_index: 0,
                    max_len: config.max_catalog_len,
                    deleted_indexes: Vec::new(),
                },
            }
        };

        let ManifestContents {
            schema,
            metadata,
            manifest_metadata,
            catalog_index,
        } = contents;

        let mut manifest = Self {
            base_path,
            read_only,
            schema,
            metadata,
            manifest_metadata,
            catalog_paths: catalog_index.paths,
            current_index: catalog_index.current_index,
            max_len: catalog_index.max_len,
            deleted_indexes: catalog_index.deleted_indexes.into_iter().collect(),
            seekable,
            current_catalog: None,
            session_id: String::new(),
            updated_session: false,
        };

        if !read_only {
            if manifest.catalog_paths.is_empty() {
                manifest.write_contents()?;
                manifest.add_catalog()?;
            } else {
                manifest.open_last_catalog()?;
                manifest.reconcile_cursor()?;
            }

            manifest.session_id = manifest.create_new_session();
            debug!(session = %manifest.session_id, "Started recording session");
        }

        Ok(manifest)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Append a record and return its global index
    ///
    /// Rotates to a new catalog first when the cursor sits on a multiple of
    /// `max_len`.
    pub fn write_record(&mut self, record: &Record) -> Result<u64> {
        if self.read_only {
            return Err(TubError::ReadOnly(self.base_path.clone()));
        }

        if self.current_index > 0 && self.current_index % self.max_len == 0 {
            self.add_catalog()?;
        }

        let catalog = self
            .current_catalog
            .as_mut()
            .ok_or_else(|| TubError::Storage("no active catalog".to_string()))?;
        catalog.write_record(record)?;

        let index = self.current_index;
        self.current_index += 1;
        self.update_catalog_metadata(true)?;
        self.updated_session = true;

        Ok(index)
    }

    /// Tombstone a single record
    pub fn delete_record(&mut self, index: u64) -> Result<()> {
        self.delete_records([index])
    }

    /// Tombstone a set of records with one metadata rewrite
    pub fn delete_records<I>(&mut self, indexes: I) -> Result<()>
    where
        I: IntoIterator<Item = u64>,
    {
        let indexes = self.checked_indexes(indexes)?;
        self.deleted_indexes.extend(indexes);
        self.update_catalog_metadata(true)
    }

    /// Lift the tombstone from a single record
    pub fn restore_record(&mut self, index: u64) -> Result<()> {
        self.restore_records([index])
    }

    /// Lift tombstones from a set of records with one metadata rewrite
    pub fn restore_records<I>(&mut self, indexes: I) -> Result<()>
    where
        I: IntoIterator<Item = u64>,
    {
        let indexes = self.checked_indexes(indexes)?;
        for index in indexes {
            self.deleted_indexes.remove(&index);
        }
        self.update_catalog_metadata(true)
    }

    fn checked_indexes<I>(&self, indexes: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = u64>,
    {
        if self.read_only {
            return Err(TubError::ReadOnly(self.base_path.clone()));
        }

        indexes
            .into_iter()
            .map(|index| {
                if index < self.current_index {
                    Ok(index)
                } else {
                    Err(TubError::IndexOutOfRange {
                        index,
                        current_index: self.current_index,
                    })
                }
            })
            .collect()
    }

    /// Close the active catalog and start `catalog_<N>.catalog`
    fn add_catalog(&mut self) -> Result<()> {
        let catalog_name = format!("catalog_{}.catalog", self.catalog_paths.len());
        let catalog_path = self.base_path.join(&catalog_name);

        let catalog = Catalog::open(&catalog_path, self.read_only, self.current_index)?;
        info!(
            catalog = %catalog_name,
            start_index = self.current_index,
            "Rotated to new catalog"
        );

        let previous = self.current_catalog.replace(catalog);
        self.catalog_paths.push(catalog_name);
        self.update_catalog_metadata(true)?;

        if let Some(previous) = previous {
            previous.close()?;
        }
        Ok(())
    }

    fn open_last_catalog(&mut self) -> Result<()> {
        let position = self.catalog_paths.len() - 1;
        let path = self.base_path.join(&self.catalog_paths[position]);
        debug!(catalog = %path.display(), "Using catalog");

        let start_index = position as u64 * self.max_len;
        self.current_catalog = Some(Catalog::open(&path, self.read_only, start_index)?);
        Ok(())
    }

    /// Align `current_index` with what the active catalog actually holds
    ///
    /// A crash between the catalog append and the manifest rewrite leaves one
    /// durable record the cursor does not count; it is kept. A catalog shorter
    /// than the cursor means records were lost. Their indexes were already
    /// handed out, so the cursor stays put: the missing lines are filled with
    /// placeholders, keeping line position equal to index, and tombstoned.
    fn reconcile_cursor(&mut self) -> Result<()> {
        let catalog = match self.current_catalog.as_mut() {
            Some(catalog) => catalog,
            None => return Ok(()),
        };
        let durable = catalog.start_index() + catalog.len() as u64;

        if durable == self.current_index {
            return Ok(());
        }

        if durable > self.current_index {
            warn!(
                manifest_index = self.current_index,
                catalog_index = durable,
                "Catalog holds records past the manifest cursor; rolling forward"
            );
            self.current_index = durable;
        } else {
            warn!(
                manifest_index = self.current_index,
                catalog_index = durable,
                "Catalog is missing records counted by the manifest; tombstoning them"
            );
            catalog.pad_lost((self.current_index - durable) as usize)?;
            self.deleted_indexes.extend(durable..self.current_index);
        }

        self.update_catalog_metadata(true)
    }

    // =========================================================================
    // Manifest File Sections
    // =========================================================================

    fn read_contents(seekable: &mut Seekable) -> Result<ManifestContents> {
        if seekable.lines() != MANIFEST_LINES {
            return Err(TubError::CorruptManifest(format!(
                "{} has {} lines, expected {}",
                seekable.path().display(),
                seekable.lines(),
                MANIFEST_LINES
            )));
        }

        let lines = seekable.read_from(1)?;
        let inputs: Vec<String> = parse_section(&lines[0], "inputs")?;
        let types: Vec<FieldType> = parse_section(&lines[1], "types")?;
        let metadata = parse_section(&lines[2], "metadata")?;
        let manifest_metadata = parse_section(&lines[3], "manifest metadata")?;
        let mut catalog_index: CatalogIndex = parse_section(&lines[4], "catalog metadata")?;

        if catalog_index.max_len == 0 {
            return Err(TubError::CorruptManifest(
                "catalog metadata has max_len 0".to_string(),
            ));
        }

        let current_index = catalog_index.current_index;
        let (deleted, out_of_range): (Vec<u64>, Vec<u64>) = catalog_index
            .deleted_indexes
            .into_iter()
            .partition(|&index| index < current_index);
        if !out_of_range.is_empty() {
            warn!(
                current_index,
                dropped = ?out_of_range,
                "Ignoring tombstones for indexes that were never assigned"
            );
        }
        catalog_index.deleted_indexes = deleted;

        let schema = Schema::new(inputs, types)
            .map_err(|e| TubError::CorruptManifest(e.to_string()))?;

        Ok(ManifestContents {
            schema,
            metadata,
            manifest_metadata,
            catalog_index,
        })
    }

    fn write_contents(&mut self) -> Result<()> {
        self.seekable.truncate_until_end(0)?;
        self.seekable
            .writeline(&serde_json::to_string(self.schema.inputs())?)?;
        self.seekable
            .writeline(&serde_json::to_string(self.schema.types())?)?;
        self.seekable.writeline(&serde_json::to_string(&self.metadata)?)?;
        self.seekable
            .writeline(&serde_json::to_string(&self.manifest_metadata)?)?;
        self.update_catalog_metadata(false)
    }

    /// Persist line 5; `update` replaces the existing line
    fn update_catalog_metadata(&mut self, update: bool) -> Result<()> {
        if update {
            self.seekable.truncate_until_end(MANIFEST_LINES - 1)?;
        }

        let catalog_index = CatalogIndexRef {
            paths: &self.catalog_paths,
            current_index: self.current_index,
            max_len: self.max_len,
            deleted_indexes: &self.deleted_indexes,
        };
        self.seekable.writeline(&serde_json::to_string(&catalog_index)?)
    }

    /// Allocate the next session id, `YY-MM-DD_N`
    fn create_new_session(&mut self) -> String {
        let this_id = self
            .manifest_metadata
            .sessions
            .as_ref()
            .map_or(0, |sessions| sessions.last_id + 1);
        let full_id = format!("{}_{}", Local::now().format("%y-%m-%d"), this_id);

        let sessions = self
            .manifest_metadata
            .sessions
            .get_or_insert_with(Sessions::default);
        sessions.last_id = this_id;
        sessions.last_full_id = full_id.clone();
        sessions.all_full_ids.push(full_id.clone());

        full_id
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Lazy, tombstone-aware iterator over all records
    pub fn iter(&self) -> ManifestIterator<'_> {
        ManifestIterator::new(self)
    }

    /// Read one record by global index, seeking directly to its line
    ///
    /// Returns `Ok(None)` for tombstoned records.
    pub fn read_record(&self, index: u64) -> Result<Option<Record>> {
        if index >= self.current_index {
            return Err(TubError::RecordNotFound(index));
        }
        if self.deleted_indexes.contains(&index) {
            return Ok(None);
        }

        let position = (index / self.max_len) as usize;
        let name = self
            .catalog_paths
            .get(position)
            .ok_or(TubError::RecordNotFound(index))?;

        let mut catalog = Catalog::open(
            &self.base_path.join(name),
            true,
            position as u64 * self.max_len,
        )?;
        let offset = index
            .checked_sub(catalog.start_index())
            .ok_or(TubError::RecordNotFound(index))?;
        let line = catalog
            .read_line(offset)?
            .ok_or(TubError::RecordNotFound(index))?;

        Ok(Some(serde_json::from_str(&line)?))
    }

    /// Live records: assigned indexes minus tombstones
    pub fn len(&self) -> usize {
        (self.current_index - self.deleted_indexes.len() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the datastore, recording the session if it wrote anything
    ///
    /// Dropping a `Manifest` without closing loses only the session entry;
    /// every written record and tombstone is already on disk.
    pub fn close(mut self) -> Result<()> {
        if self.updated_session && !self.read_only {
            let line = serde_json::to_string(&self.manifest_metadata)?;
            self.seekable.update_line(MANIFEST_METADATA_LINE, &line)?;
        }

        if let Some(catalog) = self.current_catalog.take() {
            catalog.close()?;
        }
        self.seekable.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn inputs(&self) -> &[String] {
        self.schema.inputs()
    }

    pub fn types(&self) -> &[FieldType] {
        self.schema.types()
    }

    pub fn metadata(&self) -> &Map<String, JsonValue> {
        &self.metadata
    }

    pub fn manifest_metadata(&self) -> &ManifestMetadata {
        &self.manifest_metadata
    }

    pub fn catalog_paths(&self) -> &[String] {
        &self.catalog_paths
    }

    /// Next index to be assigned
    pub fn current_index(&self) -> u64 {
        self.current_index
    }

    pub fn max_len(&self) -> u64 {
        self.max_len
    }

    pub fn deleted_indexes(&self) -> &BTreeSet<u64> {
        &self.deleted_indexes
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

fn parse_section<T: DeserializeOwned>(line: &str, section: &str) -> Result<T> {
    serde_json::from_str(line)
        .map_err(|e| TubError::CorruptManifest(format!("{} line: {}", section, e)))
}
