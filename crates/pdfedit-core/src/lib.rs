//! PDF edit, preview, and export core
//!
//! Uploaded documents live in a working area; edited copies are written to a
//! derived area. An [`EditBatch`] (text replacements, text overlays, metadata)
//! is applied to a document loaded through a [`DocumentEngine`], then either
//! persisted, rendered as a preview, or exported.
//!
//! The default engine parses and rewrites PDFs with lopdf and rasterizes
//! pages through PDFium (`pdfium` feature).

pub mod apply;
pub mod coords;
pub mod docx;
pub mod editor;
pub mod engine;
pub mod error;
pub mod export;
pub mod fonts;
pub mod lopdf_engine;
pub mod model;
pub mod naming;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod render;
pub mod storage;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use apply::{
    apply_edits, parse_hex_color, EditReport, MetadataReport, SkipReason, SkippedProperty,
};
pub use editor::{Download, PdfEditor};
pub use engine::{
    DocumentEngine, DocumentProperty, EngineDocument, Rasterizer, Rgb, TextMatch, TextRun,
    UnavailableRasterizer,
};
pub use error::{EditorError, Result};
pub use export::{export_document, ExportJob};
pub use lopdf_engine::{LopdfDocument, LopdfEngine};
pub use model::{
    CommitOutcome, CommitRequest, EditBatch, ExportArtifact, ExportFormat, ExportRequest,
    ImageFormat, MetadataPatch, PreviewRequest, RenderRequest, TextOverlay, TextReplace,
    UploadResult, DEFAULT_DPI, DEFAULT_FONT_SIZE, MAX_DPI,
};
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;
pub use render::render_page;
pub use storage::{FallbackPolicy, ResolvedDocument, Storage, StorageArea, StorageConfig};
