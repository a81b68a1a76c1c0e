//! Export a stored document as PDF, DOCX, or a zip of page images

use std::io::{Cursor, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::engine::{DocumentEngine, EngineDocument};
use crate::error::Result;
use crate::model::{ExportArtifact, ExportFormat, ImageFormat, RenderRequest};
use crate::naming::clean_display_name;
use crate::render::{check_dpi, render_page};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Options for one export, independent of where the bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportJob {
    pub format: ExportFormat,
    pub image_format: ImageFormat,
    pub dpi: u32,
}

/// Produce the export artifact for the document stored as `stored_name`
pub fn export_document<E: DocumentEngine>(
    engine: &E,
    stored_name: &str,
    bytes: Vec<u8>,
    job: &ExportJob,
) -> Result<ExportArtifact> {
    let base = clean_display_name(stored_name);
    debug!(file = %stored_name, format = %job.format, "Exporting");

    match job.format {
        ExportFormat::Pdf => Ok(ExportArtifact {
            bytes,
            content_type: PDF_CONTENT_TYPE,
            file_name: format!("{}.pdf", base),
        }),
        ExportFormat::Docx => {
            let mut doc = engine.load(&bytes)?;
            Ok(ExportArtifact {
                bytes: doc.save_as_docx()?,
                content_type: DOCX_CONTENT_TYPE,
                file_name: format!("{}.docx", base),
            })
        }
        ExportFormat::Images => {
            let doc = engine.load(&bytes)?;
            Ok(ExportArtifact {
                bytes: page_images_zip(&doc, &base, job.image_format, job.dpi)?,
                content_type: ZIP_CONTENT_TYPE,
                file_name: format!("{}_images.zip", base),
            })
        }
    }
}

/// Every page rendered in ascending order into `{base}_p{n}.{ext}` entries
fn page_images_zip<D: EngineDocument>(
    doc: &D,
    base: &str,
    format: ImageFormat,
    dpi: u32,
) -> Result<Vec<u8>> {
    check_dpi(dpi)?;

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        // Encoded images do not shrink further
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for page in 1..=doc.page_count() {
            let image = render_page(doc, &RenderRequest { page, dpi, format })?;
            zip.start_file(format!("{}_p{}.{}", base, page, format.extension()), options)?;
            zip.write_all(&image)?;
        }
        zip.finish()?;
    }
    Ok(buffer)
}
