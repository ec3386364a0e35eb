//! Record schema
//!
//! A tub's schema is fixed when the datastore is created: an ordered list of
//! input names and, position for position, the declared type of each input.
//! Both lists are persisted as the first two lines of `manifest.json`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TubError};

/// Declared type of a record field
///
/// Serialized under the same names the manifest has always used
/// (`"float"`, `"image_array"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "float")]
    Float,

    #[serde(rename = "int")]
    Int,

    #[serde(rename = "str")]
    Str,

    #[serde(rename = "boolean")]
    Boolean,

    /// Arbitrary JSON array, stored as-is
    #[serde(rename = "list")]
    List,

    /// Numeric array
    #[serde(rename = "vector")]
    Vector,

    /// Image stored as a JPEG under `images/`, referenced by filename
    #[serde(rename = "image_array")]
    ImageArray,
}

impl FieldType {
    /// Name used on disk
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Float => "float",
            FieldType::Int => "int",
            FieldType::Str => "str",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Vector => "vector",
            FieldType::ImageArray => "image_array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = TubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float" => Ok(FieldType::Float),
            "int" => Ok(FieldType::Int),
            "str" => Ok(FieldType::Str),
            "boolean" => Ok(FieldType::Boolean),
            "list" => Ok(FieldType::List),
            "vector" => Ok(FieldType::Vector),
            "image_array" => Ok(FieldType::ImageArray),
            other => Err(TubError::Schema(format!("unknown field type '{}'", other))),
        }
    }
}

/// Ordered input names and their declared types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    inputs: Vec<String>,
    types: Vec<FieldType>,
}

impl Schema {
    /// Build a schema, rejecting length mismatches and duplicate names
    pub fn new(inputs: Vec<String>, types: Vec<FieldType>) -> Result<Self> {
        if inputs.len() != types.len() {
            return Err(TubError::Schema(format!(
                "{} inputs but {} types",
                inputs.len(),
                types.len()
            )));
        }

        let mut seen = HashSet::with_capacity(inputs.len());
        for name in &inputs {
            if !seen.insert(name.as_str()) {
                return Err(TubError::Schema(format!("duplicate input '{}'", name)));
            }
        }

        Ok(Self { inputs, types })
    }

    /// Build a schema from `(name, type)` pairs
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        let (inputs, types) = pairs.into_iter().map(|(n, t)| (n.into(), t)).unzip();
        Self::new(inputs, types)
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn types(&self) -> &[FieldType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Declared type of an input, if it is part of the schema
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.inputs
            .iter()
            .position(|input| input == name)
            .map(|i| self.types[i])
    }

    /// Iterate `(name, type)` in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> + '_ {
        self.inputs
            .iter()
            .map(String::as_str)
            .zip(self.types.iter().copied())
    }
}
