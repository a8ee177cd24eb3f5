//! Region compositing: margin-cropped page regions encoded as JPEG, and the
//! paragraph-above-question stacking used for case questions.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use tracing::debug;

use crate::error::{CaptureError, CaptureResult};
use crate::geometry::{Interval, Margins, crop};

/// Default JPEG quality (0.8 on a 0-1 scale)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// Encoded image bytes plus the pixel dimensions they decode to
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl EncodedImage {
    pub fn jpeg(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
            mime_type: JPEG_MIME_TYPE,
        }
    }

    /// `data:` URL for inline previews
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("bytes", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Crops and encodes page regions at a fixed quality.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    quality: u8,
}

impl Compositor {
    pub fn new(quality: u8) -> CaptureResult<Self> {
        if !(1..=100).contains(&quality) {
            return Err(CaptureError::invalid_configuration(format!(
                "JPEG quality must be between 1 and 100, got {}",
                quality
            )));
        }
        Ok(Self { quality })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a raster as JPEG. Alpha is dropped; rendered pages are opaque.
    pub fn encode(&self, raster: &RgbaImage) -> CaptureResult<EncodedImage> {
        let (width, height) = raster.dimensions();
        let rgb = DynamicImage::ImageRgba8(raster.clone()).to_rgb8();

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .write_image(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .map_err(CaptureError::Encode)?;

        Ok(EncodedImage::jpeg(bytes, width, height))
    }

    /// Crop one region of the page and encode it.
    pub fn compose_single(
        &self,
        surface: &RgbaImage,
        interval: Interval,
        margins: Margins,
    ) -> CaptureResult<EncodedImage> {
        let region = crop(surface, interval, margins)?;
        self.encode(&region)
    }

    /// Stack the stored paragraph raster above a freshly cropped question region.
    pub fn compose_case_question(
        &self,
        paragraph: &RgbaImage,
        question_interval: Interval,
        surface: &RgbaImage,
        margins: Margins,
    ) -> CaptureResult<EncodedImage> {
        let question = crop(surface, question_interval, margins)?;
        let combined = stack_vertically(paragraph, &question)?;

        debug!(
            paragraph_height = paragraph.height(),
            question_height = question.height(),
            width = combined.width(),
            "Composited case question"
        );

        self.encode(&combined)
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// New raster with `top` at `(0, 0)` and `bottom` directly beneath it.
pub fn stack_vertically(top: &RgbaImage, bottom: &RgbaImage) -> CaptureResult<RgbaImage> {
    if top.width() != bottom.width() {
        return Err(CaptureError::DimensionMismatch {
            paragraph_width: top.width(),
            question_width: bottom.width(),
        });
    }

    let mut combined = RgbaImage::new(top.width(), top.height() + bottom.height());
    image::imageops::replace(&mut combined, top, 0, 0);
    image::imageops::replace(&mut combined, bottom, 0, i64::from(top.height()));
    Ok(combined)
}
