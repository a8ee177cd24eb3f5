//! Vertical capture intervals and margin cropping of page rasters.
//!
//! All coordinates are pixel rows/columns of the page raster as rendered at the
//! current scale. Rows grow downwards from the top edge of the page.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, CaptureResult};

/// A vertical pixel span `[y0, y1)` on one rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    y0: u32,
    y1: u32,
}

impl Interval {
    /// Create an interval, rejecting empty and inverted spans.
    pub fn new(y0: u32, y1: u32) -> CaptureResult<Self> {
        if y0 >= y1 {
            return Err(CaptureError::invalid_geometry(format!(
                "interval start {} must lie above end {}",
                y0, y1
            )));
        }
        Ok(Self { y0, y1 })
    }

    pub fn y0(&self) -> u32 {
        self.y0
    }

    pub fn y1(&self) -> u32 {
        self.y1
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Horizontal pixel insets applied to every crop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub right: u32,
}

impl Margins {
    pub fn new(left: u32, right: u32) -> Self {
        Self { left, right }
    }

    /// Width left over after removing both margins from a raster of `width`.
    pub fn effective_width(&self, width: u32) -> CaptureResult<u32> {
        let total = u64::from(self.left) + u64::from(self.right);
        if total >= u64::from(width) {
            return Err(CaptureError::invalid_geometry(format!(
                "margins {}+{} leave no content in a {}px wide page",
                self.left, self.right, width
            )));
        }
        Ok(width - self.left - self.right)
    }
}

/// Copy rows `[y0, y1)` and columns `[left, width - right)` out of `surface`.
///
/// The source raster is never modified.
pub fn crop(surface: &RgbaImage, interval: Interval, margins: Margins) -> CaptureResult<RgbaImage> {
    let (width, height) = surface.dimensions();
    let effective_width = margins.effective_width(width)?;

    if interval.y1() > height {
        return Err(CaptureError::invalid_geometry(format!(
            "interval {}..{} extends past page height {}",
            interval.y0(),
            interval.y1(),
            height
        )));
    }

    Ok(image::imageops::crop_imm(
        surface,
        margins.left,
        interval.y0(),
        effective_width,
        interval.height(),
    )
    .to_image())
}
