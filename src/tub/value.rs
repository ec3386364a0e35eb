//! Typed record values
//!
//! `Value` is what the orchestrator hands to a tub and what it gets back.
//! Encoding coerces a value to its declared `FieldType` the way the vehicle
//! parts expect (an `Int` throttle written to a `float` input is fine), and
//! rejects anything that cannot be represented, such as a string for a
//! `float` input or a NaN.

use image::{DynamicImage, GrayImage, RgbImage};
use serde_json::{Number, Value as JsonValue};

use crate::error::{Result, TubError};
use crate::schema::FieldType;

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent reading; the field is left out of the record
    Null,
    Float(f64),
    Int(i64),
    Str(String),
    Bool(bool),
    List(Vec<JsonValue>),
    Vector(Vec<f64>),
    Image(DynamicImage),
}

impl Value {
    /// Short name of the runtime variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Image(_) => "image",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&DynamicImage> {
        match self {
            Value::Image(image) => Some(image),
            _ => None,
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl From<Vec<JsonValue>> for Value {
    fn from(v: Vec<JsonValue>) -> Self {
        Value::List(v)
    }
}

impl From<DynamicImage> for Value {
    fn from(v: DynamicImage) -> Self {
        Value::Image(v)
    }
}

impl From<RgbImage> for Value {
    fn from(v: RgbImage) -> Self {
        Value::Image(DynamicImage::ImageRgb8(v))
    }
}

impl From<GrayImage> for Value {
    fn from(v: GrayImage) -> Self {
        Value::Image(DynamicImage::ImageLuma8(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// A value ready to be stored
#[derive(Debug)]
pub(crate) enum Encoded<'a> {
    /// Stored inline in the JSON record
    Json(JsonValue),
    /// Written to `images/`; the record stores the file name
    Image(&'a DynamicImage),
}

/// Coerce `value` to `field_type`, or explain why it cannot be stored
pub(crate) fn encode<'a>(field: &str, field_type: FieldType, value: &'a Value) -> Result<Encoded<'a>> {
    let mismatch = || TubError::TypeMismatch {
        field: field.to_string(),
        expected: field_type,
        found: value.kind(),
    };

    let json = match (field_type, value) {
        (FieldType::Float, Value::Float(f)) => finite_number(field, *f)?,
        (FieldType::Float, Value::Int(i)) => finite_number(field, *i as f64)?,
        (FieldType::Float, Value::Bool(b)) => finite_number(field, if *b { 1.0 } else { 0.0 })?,

        (FieldType::Int, Value::Int(i)) => JsonValue::from(*i),
        (FieldType::Int, Value::Float(f)) => {
            if !f.is_finite() {
                return Err(TubError::NonFiniteFloat(field.to_string()));
            }
            JsonValue::from(f.trunc() as i64)
        }
        (FieldType::Int, Value::Bool(b)) => JsonValue::from(i64::from(*b)),

        (FieldType::Boolean, Value::Bool(b)) => JsonValue::Bool(*b),
        (FieldType::Boolean, Value::Int(i)) => JsonValue::Bool(*i != 0),
        (FieldType::Boolean, Value::Float(f)) => JsonValue::Bool(*f != 0.0),

        (FieldType::Str, Value::Str(s)) => JsonValue::String(s.clone()),

        (FieldType::List | FieldType::Vector, Value::List(items)) => JsonValue::Array(items.clone()),
        (FieldType::List | FieldType::Vector, Value::Vector(items)) => JsonValue::Array(
            items
                .iter()
                .map(|&f| finite_number(field, f))
                .collect::<Result<Vec<_>>>()?,
        ),

        (FieldType::ImageArray, Value::Image(image)) => return Ok(Encoded::Image(image)),

        (
            FieldType::Float
            | FieldType::Int
            | FieldType::Str
            | FieldType::Boolean
            | FieldType::List
            | FieldType::Vector
            | FieldType::ImageArray,
            _,
        ) => return Err(mismatch()),
    };

    Ok(Encoded::Json(json))
}

fn finite_number(field: &str, f: f64) -> Result<JsonValue> {
    Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| TubError::NonFiniteFloat(field.to_string()))
}

// =============================================================================
// Decoding
// =============================================================================

/// Interpret a stored JSON value as `field_type`
///
/// `image_array` fields are returned as their stored file name; the caller
/// loads the image.
pub(crate) fn decode(field: &str, field_type: FieldType, json: &JsonValue) -> Result<Value> {
    let corrupt = || {
        TubError::Storage(format!(
            "field '{}' declared as {} holds {}",
            field, field_type, json
        ))
    };

    if json.is_null() {
        return Ok(Value::Null);
    }

    let value = match field_type {
        FieldType::Float => Value::Float(json.as_f64().ok_or_else(corrupt)?),
        FieldType::Int => Value::Int(json.as_i64().ok_or_else(corrupt)?),
        FieldType::Str | FieldType::ImageArray => {
            Value::Str(json.as_str().ok_or_else(corrupt)?.to_string())
        }
        FieldType::Boolean => Value::Bool(json.as_bool().ok_or_else(corrupt)?),
        FieldType::List => Value::List(json.as_array().ok_or_else(corrupt)?.clone()),
        FieldType::Vector => Value::Vector(
            json.as_array()
                .ok_or_else(corrupt)?
                .iter()
                .map(|item| item.as_f64().ok_or_else(corrupt))
                .collect::<Result<Vec<_>>>()?,
        ),
    };

    Ok(value)
}
