//! Page rasterization through a dynamically bound PDFium library

use std::sync::Mutex;

use image::RgbaImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::coords::POINTS_PER_INCH;
use crate::engine::Rasterizer;
use crate::error::{EditorError, Result};

/// Rasterizer backed by PDFium
///
/// The library is looked up in the working directory first, then on the
/// system library path. Calls are serialized through one bound instance.
pub struct PdfiumRasterizer {
    pdfium: Mutex<Pdfium>,
}

impl PdfiumRasterizer {
    pub fn new() -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| EditorError::Engine(format!("Failed to load PDFium library: {:?}", e)))?;
        info!("PDFium library bound");

        Ok(Self {
            pdfium: Mutex::new(Pdfium::new(bindings)),
        })
    }
}

fn pdfium_err(e: PdfiumError) -> EditorError {
    EditorError::Engine(format!("PDFium: {:?}", e))
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<RgbaImage> {
        let pdfium = self
            .pdfium
            .lock()
            .map_err(|_| EditorError::Engine("PDFium instance poisoned".to_string()))?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| EditorError::Corrupt(format!("{:?}", e)))?;
        let pages = document.pages();
        let page_count = pages.len() as u32;
        let index = page
            .checked_sub(1)
            .and_then(|i| i.try_into().ok())
            .filter(|_| page <= page_count)
            .ok_or(EditorError::PageOutOfRange { page, page_count })?;
        let pdf_page = pages.get(index).map_err(pdfium_err)?;

        let scale = dpi as f32 / POINTS_PER_INCH as f32;
        let width = (pdf_page.width().value * scale).round().max(1.0) as i32;
        let height = (pdf_page.height().value * scale).round().max(1.0) as i32;
        debug!(page, dpi, width, height, "Rasterizing page");

        let config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);
        let bitmap = pdf_page.render_with_config(&config).map_err(pdfium_err)?;

        let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
        RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(|| {
            EditorError::Engine(format!("PDFium returned a short {}x{} bitmap", width, height))
        })
    }
}
