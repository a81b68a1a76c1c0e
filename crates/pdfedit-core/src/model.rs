//! Request and result types shared by the edit, preview, and export flows

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::apply::EditReport;
use crate::error::EditorError;
use crate::storage::StorageArea;

pub const DEFAULT_DPI: u32 = 150;
/// Letter at 1200 dpi is roughly 10200x13200 pixels
pub const MAX_DPI: u32 = 1200;
pub const DEFAULT_FONT_SIZE: f64 = 12.0;

/// Literal search-and-replace rule applied across all pages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextReplace {
    pub find: String,
    /// Empty string deletes the matched text
    #[serde(default)]
    pub replace_with: String,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Accepted for compatibility; matching stays literal-substring
    #[serde(default)]
    pub whole_word: bool,
}

/// Text placed at a point-space position on one page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    /// 1-based page number
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default)]
    pub font_name: Option<String>,
    #[serde(default = "default_color_hex")]
    pub color_hex: String,
}

fn default_font_size() -> f64 {
    DEFAULT_FONT_SIZE
}

fn default_color_hex() -> String {
    "#000000".to_string()
}

/// Metadata key/value patch. Application order is not significant.
pub type MetadataPatch = BTreeMap<String, String>;

/// Replacements, overlays, and metadata applied to one document in that order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditBatch {
    #[serde(default)]
    pub replacements: Vec<TextReplace>,
    #[serde(default)]
    pub overlays: Vec<TextOverlay>,
    #[serde(default)]
    pub metadata: MetadataPatch,
}

impl EditBatch {
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && self.overlays.is_empty() && self.metadata.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            other => Err(EditorError::UnsupportedFormat(format!(
                "image format '{}' (expected png or jpeg)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    #[default]
    Pdf,
    Docx,
    Images,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Pdf => write!(f, "pdf"),
            ExportFormat::Docx => write!(f, "docx"),
            ExportFormat::Images => write!(f, "images"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "docx" => Ok(ExportFormat::Docx),
            "images" => Ok(ExportFormat::Images),
            other => Err(EditorError::UnsupportedFormat(format!(
                "export format '{}' (expected pdf, docx, or images)",
                other
            ))),
        }
    }
}

/// Rasterize one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    pub page: u32,
    pub dpi: u32,
    pub format: ImageFormat,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page: 1,
            dpi: DEFAULT_DPI,
            format: ImageFormat::Png,
        }
    }
}

/// Commit an edit batch, either in place or as a new derived document
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    pub file_name: String,
    pub save_as_new: bool,
    pub batch: EditBatch,
}

/// Render one page with an edit batch applied, without persisting anything
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    pub file_name: String,
    pub render: RenderRequest,
    pub batch: EditBatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub file_name: String,
    pub format: ExportFormat,
    pub image_format: ImageFormat,
    pub dpi: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub file_name: String,
    pub page_count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub file_name: String,
    pub display_name: String,
    pub area: StorageArea,
    pub report: EditReport,
}

/// Bytes ready to hand to a client as a download
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}
