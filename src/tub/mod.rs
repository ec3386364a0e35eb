//! Tub Module
//!
//! Typed records on top of the storage layer.
//!
//! ## Responsibilities
//! - Map declared field types onto JSON records (`Value` ↔ JSON)
//! - Store `image_array` fields as JPEG files under `images/`
//! - Stamp every record with `_index`, `_timestamp_ms` and `_session_id`
//! - Positional write contract for the vehicle loop (`TubWriter`)

mod images;
mod store;
mod value;
mod writer;

pub use images::{image_file_name, load_image, save_image, IMAGES_DIR};
pub use store::{Tub, TubIterator, TubRecord, Values, INDEX_FIELD, SESSION_FIELD, TIMESTAMP_FIELD};
pub use value::Value;
pub use writer::TubWriter;
