//! Single-page rasterization and image encoding

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::engine::EngineDocument;
use crate::error::{EditorError, Result};
use crate::model::{ImageFormat, RenderRequest, MAX_DPI};

pub const JPEG_QUALITY: u8 = 85;

pub fn check_dpi(dpi: u32) -> Result<()> {
    if !(1..=MAX_DPI).contains(&dpi) {
        return Err(EditorError::Validation(format!(
            "dpi must be between 1 and {}, got {}",
            MAX_DPI, dpi
        )));
    }
    Ok(())
}

/// Render one page of `doc` and encode it. No side effects.
pub fn render_page<D: EngineDocument>(doc: &D, request: &RenderRequest) -> Result<Vec<u8>> {
    let page_count = doc.page_count();
    if request.page == 0 || request.page > page_count {
        return Err(EditorError::PageOutOfRange {
            page: request.page,
            page_count,
        });
    }
    check_dpi(request.dpi)?;

    let raster = doc.render_page(request.page, request.dpi)?;
    debug!(
        page = request.page,
        dpi = request.dpi,
        width = raster.width(),
        height = raster.height(),
        "Page rasterized"
    );
    encode_image(raster, request.format)
}

pub fn encode_image(raster: RgbaImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match format {
        ImageFormat::Png => {
            raster.write_with_encoder(PngEncoder::new(&mut out))?;
        }
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(raster).into_rgb8();
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
        }
    }
    Ok(out.into_inner())
}
