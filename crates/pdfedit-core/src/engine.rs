//! Document engine seam
//!
//! Everything that needs to understand PDF internals (parsing, content
//! rewriting, rasterization, format conversion) sits behind these traits.
//! The edit, render, and export pipelines only talk to [`EngineDocument`].

use image::RgbaImage;

use crate::error::{EditorError, Result};
use crate::naming::PropertyKey;

/// Parses stored bytes into an editable in-memory document
pub trait DocumentEngine: Send + Sync {
    type Document: EngineDocument;

    /// Fails with `EditorError::Corrupt` when the bytes are not a readable PDF
    fn load(&self, bytes: &[u8]) -> Result<Self::Document>;
}

/// One loaded document. Never shared between requests.
pub trait EngineDocument {
    fn page_count(&self) -> u32;

    /// Literal (non-pattern) search of one 1-based page, in content order
    fn find_in_page(
        &self,
        page: u32,
        pattern: &str,
        case_sensitive: bool,
    ) -> Result<Vec<TextMatch>>;

    /// [`find_in_page`](Self::find_in_page) over every page, in document order
    fn find_text(&self, pattern: &str, case_sensitive: bool) -> Result<Vec<TextMatch>> {
        let mut matches = Vec::new();
        for page in 1..=self.page_count() {
            matches.extend(self.find_in_page(page, pattern, case_sensitive)?);
        }
        Ok(matches)
    }

    /// Replace the text covered by a match returned from [`find_in_page`](Self::find_in_page).
    ///
    /// Matches within the same run must be replaced back to front.
    fn set_match_text(&mut self, found: &TextMatch, text: &str) -> Result<()>;

    /// Plain text of one page as the engine sees it after pending edits
    fn page_text(&self, page: u32) -> Result<String>;

    fn add_text_run(&mut self, run: &TextRun) -> Result<()>;

    fn property(&self, property: DocumentProperty) -> Option<String>;
    fn set_property(&mut self, property: DocumentProperty, value: &str) -> Result<()>;

    fn custom_property(&self, key: &PropertyKey) -> Option<String>;
    /// All non-reserved properties as (name, value) pairs
    fn custom_properties(&self) -> Vec<(String, String)>;
    fn set_custom_property(&mut self, key: &PropertyKey, value: &str) -> Result<()>;

    /// Rasterize a 1-based page. Callers validate the page number first.
    fn render_page(&self, page: u32, dpi: u32) -> Result<RgbaImage>;

    fn save_as_pdf(&mut self) -> Result<Vec<u8>>;
    fn save_as_docx(&mut self) -> Result<Vec<u8>>;
}

/// Turns PDF bytes into pixels. Split out so the rasterizing backend can be
/// swapped without touching document mutation.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<RgbaImage>;
}

/// Stand-in used when no rasterizing backend could be initialized.
/// Every render fails with the reason it was created with.
#[derive(Debug, Clone)]
pub struct UnavailableRasterizer {
    reason: String,
}

impl UnavailableRasterizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Rasterizer for UnavailableRasterizer {
    fn rasterize(&self, _pdf: &[u8], _page: u32, _dpi: u32) -> Result<RgbaImage> {
        Err(EditorError::Engine(format!(
            "page rendering unavailable: {}",
            self.reason
        )))
    }
}

/// A matched span inside one text run of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub page: u32,
    /// Engine-assigned index of the text run within the page
    pub run: usize,
    pub start: usize,
    pub end: usize,
    /// The matched text as it appears in the document
    pub text: String,
}

/// A new run of text to draw, in point space
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub font_size: f64,
    pub font_name: Option<String>,
    pub color: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Components in the 0-1 range used by PDF color operators
    pub fn to_unit(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

/// The six first-class document information entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentProperty {
    Title,
    Author,
    Subject,
    Keywords,
    Creator,
    Producer,
}

impl DocumentProperty {
    pub const ALL: [DocumentProperty; 6] = [
        DocumentProperty::Title,
        DocumentProperty::Author,
        DocumentProperty::Subject,
        DocumentProperty::Keywords,
        DocumentProperty::Creator,
        DocumentProperty::Producer,
    ];

    /// Case-insensitive lookup of a reserved metadata key
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(key))
    }

    /// Name of the entry in the PDF information dictionary
    pub fn name(&self) -> &'static str {
        match self {
            DocumentProperty::Title => "Title",
            DocumentProperty::Author => "Author",
            DocumentProperty::Subject => "Subject",
            DocumentProperty::Keywords => "Keywords",
            DocumentProperty::Creator => "Creator",
            DocumentProperty::Producer => "Producer",
        }
    }
}
