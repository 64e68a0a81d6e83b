//! Region cropping: cut a detected diagram out of a rendered page.
//!
//! The detection step reports boxes in its own coordinate space, usually
//! the pixel size of whatever image it looked at, and declares that space
//! through `page_width`/`page_height`. The box is rescaled into the raster
//! image's real pixel space before any pixels are touched.

use crate::error::PipelineError;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A diagram location in the detector's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Width of the space `x`/`width` are measured in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_width: Option<f64>,
    /// Height of the space `y`/`height` are measured in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_height: Option<f64>,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            page_width: None,
            page_height: None,
        }
    }

    /// Declare the coordinate space the box was measured in.
    pub fn with_page_size(mut self, page_width: f64, page_height: f64) -> Self {
        self.page_width = Some(page_width);
        self.page_height = Some(page_height);
        self
    }

    /// Validate loosely-typed detector output.
    ///
    /// `x`, `y`, `width` and `height` must be present and finite numbers.
    /// `page_width`/`page_height` are optional; a present but non-numeric
    /// value is rejected rather than silently ignored.
    pub fn from_value(value: &Value) -> Result<Self, PipelineError> {
        let obj = value.as_object().ok_or_else(|| {
            PipelineError::InvalidBoundingBox("expected an object with x, y, width, height".into())
        })?;

        let required = |key: &str| -> Result<f64, PipelineError> {
            match obj.get(key) {
                None | Some(Value::Null) => Err(PipelineError::InvalidBoundingBox(format!(
                    "missing field '{key}'"
                ))),
                Some(v) => finite(key, v),
            }
        };
        let optional = |key: &str| -> Result<Option<f64>, PipelineError> {
            match obj.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => finite(key, v).map(Some),
            }
        };

        Ok(Self {
            x: required("x")?,
            y: required("y")?,
            width: required("width")?,
            height: required("height")?,
            page_width: optional("page_width")?,
            page_height: optional("page_height")?,
        })
    }
}

fn finite(key: &str, value: &Value) -> Result<f64, PipelineError> {
    value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| PipelineError::InvalidBoundingBox(format!("field '{key}' is not a number: {value}")))
}

/// A rectangle in the raster image's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Scale `bbox` into a `image_width`×`image_height` image and clamp it to
/// the image bounds.
///
/// The reference space is the box's declared page size, or the image's own
/// size when none is declared. A box with no positive reference dimension
/// is rejected instead of being cropped against a made-up scale.
pub fn region_for(
    bbox: &BoundingBox,
    image_width: u32,
    image_height: u32,
) -> Result<CropRegion, PipelineError> {
    let ref_w = reference(bbox.page_width, image_width).ok_or_else(|| {
        PipelineError::InvalidBoundingBox("no usable reference width".into())
    })?;
    let ref_h = reference(bbox.page_height, image_height).ok_or_else(|| {
        PipelineError::InvalidBoundingBox("no usable reference height".into())
    })?;

    let scale_x = f64::from(image_width) / ref_w;
    let scale_y = f64::from(image_height) / ref_h;

    let (left, width) = clamp_axis(bbox.x * scale_x, bbox.width * scale_x, image_width);
    let (top, height) = clamp_axis(bbox.y * scale_y, bbox.height * scale_y, image_height);

    if width <= 0 || height <= 0 {
        return Err(PipelineError::CropOutOfBounds {
            left,
            top,
            image_width,
            image_height,
        });
    }

    // left < image_width and top < image_height hold here, so the casts are lossless.
    Ok(CropRegion {
        left: left as u32,
        top: top as u32,
        width: width as u32,
        height: height as u32,
    })
}

/// Round one axis to pixels and clamp it to `0..limit`.
///
/// Returns the clamped start and extent; an extent ≤ 0 means the box does
/// not overlap the image on this axis. When the box does not overlap, the
/// unclamped start is returned so the error can report it.
fn clamp_axis(start: f64, extent: f64, limit: u32) -> (i64, i64) {
    let start = start.round() as i64;
    let end = start.saturating_add((extent.round() as i64).max(1));
    if end <= 0 {
        return (start, 0);
    }
    let clamped = start.max(0);
    (clamped, end.min(i64::from(limit)) - clamped)
}

fn reference(declared: Option<f64>, actual: u32) -> Option<f64> {
    declared
        .filter(|d| d.is_finite() && *d > 0.0)
        .or_else(|| (actual > 0).then(|| f64::from(actual)))
}

/// Extract the region described by `bbox` as an RGBA image.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage, PipelineError> {
    let (w, h) = image.dimensions();
    let region = region_for(bbox, w, h)?;
    Ok(extract_region(image, region))
}

/// Copy `region` out of `image` as RGBA. `region` must lie inside the image,
/// which [`region_for`] guarantees.
pub fn extract_region(image: &DynamicImage, region: CropRegion) -> DynamicImage {
    let cropped = image.crop_imm(region.left, region.top, region.width, region.height);
    DynamicImage::ImageRgba8(cropped.to_rgba8())
}

/// [`crop`] for callers holding encoded images: decode, crop, re-encode as
/// PNG.
pub fn crop_png(image_bytes: &[u8], bbox: &BoundingBox) -> Result<Vec<u8>, PipelineError> {
    let image = image::load_from_memory(image_bytes)
        .map_err(|e| PipelineError::EncodeFailed(format!("decoding input image: {e}")))?;
    let cropped = crop(&image, bbox)?;
    super::encode::encode_png(&cropped)
}
