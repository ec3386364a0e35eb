//! Image payloads
//!
//! `image_array` fields are written as JPEG files under `images/` and the
//! record stores only the file name, relative to that directory.

use std::borrow::Cow;
use std::path::Path;

use image::{DynamicImage, ImageFormat};

use crate::error::Result;

/// Directory, relative to the tub base path, holding image payloads
pub const IMAGES_DIR: &str = "images";

/// `{index}_{key}.jpg`, with `/` in keys replaced so the name stays flat
///
/// `image_file_name(7, "cam/image_array")` → `"7_cam_image_array.jpg"`
pub fn image_file_name(index: u64, key: &str) -> String {
    format!("{}_{}.jpg", index, key.replace('/', "_"))
}

/// Encode `image` as JPEG at `path`
///
/// JPEG carries no alpha channel, so anything other than 8-bit gray or RGB
/// is converted to RGB first.
pub fn save_image(image: &DynamicImage, path: &Path) -> Result<()> {
    let encodable = match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(image),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    };
    encodable.save_with_format(path, ImageFormat::Jpeg)?;
    Ok(())
}

/// Decode the JPEG at `path`
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    Ok(image::open(path)?)
}
