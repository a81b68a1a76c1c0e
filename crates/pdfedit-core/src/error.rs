use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Failed to parse PDF: {0}")]
    Corrupt(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Document engine failed: {0}")]
    Engine(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, EditorError>;
