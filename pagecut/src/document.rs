//! Document loading and page rasterization.
//!
//! The capture engine only needs two capabilities from a document backend:
//! turning bytes into a document, and rendering one page at a scale. The PDFium
//! backend lives in [`pdf`].

pub mod pdf;

use std::sync::Arc;

use image::RgbaImage;

use crate::error::{CaptureResult, RenderError};

pub use pdf::PdfiumLoader;

/// A loaded document whose pages can be rendered to rasters.
pub trait PageSource: Send + Sync {
    /// Display name, used to name the export archive
    fn name(&self) -> &str;

    fn page_count(&self) -> u32;

    /// Render a 1-based page at `scale` (1.0 = one pixel per PDF point).
    fn render_page(&self, page_number: u32, scale: f32) -> Result<RgbaImage, RenderError>;
}

/// Turns raw document bytes into a [`PageSource`].
pub trait DocumentLoader: Send + Sync {
    fn load_document(&self, name: &str, bytes: Vec<u8>) -> CaptureResult<Arc<dyn PageSource>>;
}

/// Check a 1-based page number against the document.
pub(crate) fn check_page(page_number: u32, page_count: u32) -> Result<(), RenderError> {
    if page_number == 0 || page_number > page_count {
        return Err(RenderError::PageOutOfRange {
            page: page_number,
            page_count,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Synthetic documents for tests that must not depend on libpdfium.

    use super::*;
    use crate::error::CaptureError;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Pages of `width x height` points filled with a vertical gradient.
    pub(crate) struct GradientDocument {
        pub name: String,
        pub pages: u32,
        pub width: u32,
        pub height: u32,
        pub renders: AtomicUsize,
    }

    impl PageSource for GradientDocument {
        fn name(&self) -> &str {
            &self.name
        }

        fn page_count(&self) -> u32 {
            self.pages
        }

        fn render_page(&self, page_number: u32, scale: f32) -> Result<RgbaImage, RenderError> {
            check_page(page_number, self.pages)?;
            self.renders.fetch_add(1, Ordering::SeqCst);
            let width = (self.width as f32 * scale).round() as u32;
            let height = (self.height as f32 * scale).round() as u32;
            Ok(RgbaImage::from_fn(width, height, |x, y| {
                Rgba([(x % 256) as u8, (y % 256) as u8, page_number as u8, 255])
            }))
        }
    }

    /// Loads any bytes starting with `%PDF` as a gradient document.
    pub(crate) struct GradientLoader {
        pub pages: u32,
        pub width: u32,
        pub height: u32,
    }

    impl DocumentLoader for GradientLoader {
        fn load_document(&self, name: &str, bytes: Vec<u8>) -> CaptureResult<Arc<dyn PageSource>> {
            if !bytes.starts_with(b"%PDF") {
                return Err(CaptureError::DocumentLoad {
                    message: "missing PDF header".to_string(),
                });
            }
            Ok(Arc::new(GradientDocument {
                name: name.to_string(),
                pages: self.pages,
                width: self.width,
                height: self.height,
                renders: AtomicUsize::new(0),
            }))
        }
    }
}
