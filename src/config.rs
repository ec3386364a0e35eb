//! Configuration for tubstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use serde_json::{Map, Value as JsonValue};

use crate::error::{Result, TubError};
use crate::schema::{FieldType, Schema};

/// Default number of records per catalog before rotation
pub const DEFAULT_MAX_CATALOG_LEN: u64 = 1000;

/// Configuration for opening a tub
#[derive(Debug, Clone)]
pub struct TubConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Base directory of the datastore
    /// Internal structure:
    ///   {base_path}/
    ///     ├── manifest.json
    ///     ├── catalog_0.catalog
    ///     ├── catalog_0.catalog_manifest
    ///     └── images/
    pub base_path: PathBuf,

    /// Records per catalog segment. Only used when the datastore is created;
    /// an existing manifest keeps the value it was created with.
    pub max_catalog_len: u64,

    /// Open without writing anything to disk
    pub read_only: bool,

    // -------------------------------------------------------------------------
    // Schema Configuration
    // -------------------------------------------------------------------------
    /// Declared inputs and types. Required when the datastore does not exist
    /// yet, ignored (in favor of the persisted schema) otherwise.
    pub schema: Option<Schema>,

    /// Free-form user metadata stored on line 3 of the manifest
    pub metadata: Map<String, JsonValue>,
}

impl Default for TubConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./data/tub"),
            max_catalog_len: DEFAULT_MAX_CATALOG_LEN,
            read_only: false,
            schema: None,
            metadata: Map::new(),
        }
    }
}

impl TubConfig {
    /// Create a new config builder
    pub fn builder() -> TubConfigBuilder {
        TubConfigBuilder::default()
    }
}

/// Builder for TubConfig
#[derive(Default)]
pub struct TubConfigBuilder {
    config: TubConfig,
    inputs: Vec<(String, FieldType)>,
}

impl TubConfigBuilder {
    /// Set the datastore base directory
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_path = path.into();
        self
    }

    /// Declare one input (appended in call order)
    pub fn input(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.inputs.push((name.into(), field_type));
        self
    }

    /// Declare the full schema at once, replacing any inputs added so far
    pub fn schema(mut self, schema: Schema) -> Self {
        self.inputs = schema
            .fields()
            .map(|(name, ty)| (name.to_string(), ty))
            .collect();
        self.config.schema = Some(schema);
        self
    }

    /// Add a user metadata entry
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.config.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the number of records per catalog
    pub fn max_catalog_len(mut self, len: u64) -> Self {
        self.config.max_catalog_len = len;
        self
    }

    /// Open the datastore read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    pub fn build(mut self) -> Result<TubConfig> {
        if self.config.max_catalog_len == 0 {
            return Err(TubError::Config(
                "max_catalog_len must be greater than zero".to_string(),
            ));
        }

        if !self.inputs.is_empty() || self.config.schema.is_some() {
            self.config.schema = Some(Schema::from_pairs(self.inputs)?);
        }

        Ok(self.config)
    }
}
