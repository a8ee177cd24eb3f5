//! PDF rendering using pdfium-render.

use std::sync::Arc;

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use tracing::{debug, info};

use super::{DocumentLoader, PageSource, check_page};
use crate::error::{CaptureError, CaptureResult, RenderError};

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn create_pdfium() -> CaptureResult<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| CaptureError::DocumentLoad {
            message: format!(
                "Failed to load PDFium library. Place libpdfium next to the binary or install it: {:?}",
                e
            ),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Loads PDF documents with PDFium.
///
/// PDFium bindings are not `Send`, so every load and render binds its own
/// instance on the thread doing the work.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumLoader;

impl PdfiumLoader {
    /// Fails early if libpdfium cannot be found.
    pub fn new() -> CaptureResult<Self> {
        create_pdfium()?;
        Ok(Self)
    }
}

impl DocumentLoader for PdfiumLoader {
    fn load_document(&self, name: &str, bytes: Vec<u8>) -> CaptureResult<Arc<dyn PageSource>> {
        let page_count = {
            let pdfium = create_pdfium()?;
            let document = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|e| CaptureError::DocumentLoad {
                    message: format!("{}: {}", name, e),
                })?;
            u32::from(document.pages().len())
        };

        info!(name, pages = page_count, size = bytes.len(), "Loaded PDF document");

        Ok(Arc::new(PdfiumDocument {
            name: name.to_string(),
            bytes,
            page_count,
        }))
    }
}

/// A PDF held in memory. Each render reopens the document from the owned
/// buffer.
#[derive(Debug)]
pub struct PdfiumDocument {
    name: String,
    bytes: Vec<u8>,
    page_count: u32,
}

impl PdfiumDocument {
    fn backend_error(page: u32, context: &str, e: PdfiumError) -> RenderError {
        RenderError::Backend {
            page,
            message: format!("{}: {}", context, e),
        }
    }
}

impl PageSource for PdfiumDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn render_page(&self, page_number: u32, scale: f32) -> Result<RgbaImage, RenderError> {
        check_page(page_number, self.page_count)?;
        let index = PdfPageIndex::try_from(page_number - 1).map_err(|_| {
            RenderError::PageOutOfRange {
                page: page_number,
                page_count: self.page_count,
            }
        })?;

        let pdfium = create_pdfium().map_err(|e| RenderError::Backend {
            page: page_number,
            message: e.to_string(),
        })?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(|e| Self::backend_error(page_number, "Failed to reopen document", e))?;
        let page = document
            .pages()
            .get(index)
            .map_err(|e| Self::backend_error(page_number, "Failed to get page", e))?;

        let width = (page.width().value * scale).ceil() as i32;
        let height = (page.height().value * scale).ceil() as i32;

        debug!(
            page = page_number,
            scale,
            size = format!("{}x{}", width, height),
            "Rendering page"
        );

        let config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| Self::backend_error(page_number, "Failed to render page", e))?;

        // pdfium-render's conversion handles the BGRA channel order
        let image: DynamicImage = bitmap.as_image();
        Ok(image.to_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_backend_types_are_thread_safe() {
        assert_send_sync::<PdfiumLoader>();
        assert_send_sync::<PdfiumDocument>();
    }

    #[test]
    fn test_document_reports_metadata_without_rendering() {
        let document = PdfiumDocument {
            name: "exam.pdf".to_string(),
            bytes: Vec::new(),
            page_count: 4,
        };
        assert_eq!(document.name(), "exam.pdf");
        assert_eq!(document.page_count(), 4);
        assert!(matches!(
            document.render_page(5, 1.0),
            Err(RenderError::PageOutOfRange { page: 5, page_count: 4 })
        ));
    }
}
