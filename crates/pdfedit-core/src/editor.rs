//! Storage-aware entry points: upload, commit, preview, export, download

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use tracing::{debug, info};
use uuid::Uuid;

use crate::apply::apply_edits;
use crate::engine::{DocumentEngine, DocumentProperty, EngineDocument};
use crate::error::{EditorError, Result};
use crate::export::{export_document, ExportJob};
use crate::model::{
    CommitOutcome, CommitRequest, ExportArtifact, ExportRequest, MetadataPatch, PreviewRequest,
    RenderRequest, UploadResult,
};
use crate::naming::{clean_display_name, sanitize_base};
use crate::render::render_page;
use crate::storage::{FallbackPolicy, ResolvedDocument, Storage, StorageArea};

/// An open stored file ready to stream back to a client
#[derive(Debug)]
pub struct Download {
    pub file: File,
    pub name: String,
    pub area: StorageArea,
}

pub struct PdfEditor<E> {
    storage: Storage,
    engine: E,
}

impl<E: DocumentEngine> PdfEditor<E> {
    pub fn new(storage: Storage, engine: E) -> Self {
        Self { storage, engine }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Validate and store an uploaded PDF in the working area
    pub fn save_upload(&self, original_name: &str, bytes: &[u8]) -> Result<UploadResult> {
        if bytes.is_empty() {
            return Err(EditorError::Validation("uploaded file is empty".to_string()));
        }

        let path = Path::new(original_name.trim());
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(EditorError::Validation(format!(
                "'{}' is not a .pdf file",
                original_name
            )));
        }

        // Parse before writing so corrupt uploads never reach storage
        let page_count = self.engine.load(bytes)?.page_count();

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = format!("{}_{}.pdf", sanitize_base(&stem), Uuid::new_v4().simple());
        self.storage.create_new(StorageArea::Working, &file_name, bytes)?;

        info!(file = %file_name, pages = page_count, "Upload stored");
        Ok(UploadResult {
            file_name,
            page_count,
        })
    }

    pub fn page_count(&self, file_name: &str) -> Result<u32> {
        let (_, doc) = self.load(file_name)?;
        Ok(doc.page_count())
    }

    pub fn render_stored_page(&self, file_name: &str, request: &RenderRequest) -> Result<Vec<u8>> {
        let (_, doc) = self.load(file_name)?;
        render_page(&doc, request)
    }

    /// Apply a batch and persist the result, either as a new derived
    /// document or back over the input
    pub fn apply_and_persist(&self, request: &CommitRequest) -> Result<CommitOutcome> {
        let (source, mut doc) = self.load(&request.file_name)?;
        let report = apply_edits(&mut doc, &request.batch)?;

        let (file_name, area) = if request.save_as_new {
            let title = requested_title(&request.batch.metadata)
                .or_else(|| doc.property(DocumentProperty::Title))
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| clean_display_name(&source.name));
            let base = sanitize_base(&title);

            let output = doc.save_as_pdf()?;
            let name = self
                .storage
                .create_unique(StorageArea::Derived, &base, "pdf", &output)?;
            (name, StorageArea::Derived)
        } else {
            let output = doc.save_as_pdf()?;
            self.storage.overwrite(&source, &output)?;
            (source.name.clone(), source.area)
        };

        info!(
            source = %source.name,
            file = %file_name,
            area = %area,
            replacements = report.replacements,
            overlays = report.overlays,
            "Edits committed"
        );
        Ok(CommitOutcome {
            display_name: clean_display_name(&file_name),
            file_name,
            area,
            report,
        })
    }

    /// Render one page with the batch applied. Nothing is written.
    pub fn preview_with_edits(&self, request: &PreviewRequest) -> Result<Vec<u8>> {
        let (_, mut doc) = self.load(&request.file_name)?;
        apply_edits(&mut doc, &request.batch)?;
        render_page(&doc, &request.render)
    }

    pub fn export(&self, request: &ExportRequest) -> Result<ExportArtifact> {
        let source = self
            .storage
            .resolve(&request.file_name, FallbackPolicy::PreferDerived)?;
        let bytes = self.storage.read(&source)?;
        let job = ExportJob {
            format: request.format,
            image_format: request.image_format,
            dpi: request.dpi,
        };
        export_document(&self.engine, &source.name, bytes, &job)
    }

    pub fn open_download(&self, file_name: &str) -> Result<Download> {
        let source = self
            .storage
            .resolve(file_name, FallbackPolicy::PreferDerived)?;
        let file = self.storage.open_for_read(source.area, &source.name)?;
        Ok(Download {
            file,
            name: source.name,
            area: source.area,
        })
    }

    /// The six reserved properties (absent ones as `None`) plus every custom entry
    pub fn read_metadata(&self, file_name: &str) -> Result<BTreeMap<String, Option<String>>> {
        let (_, doc) = self.load(file_name)?;

        let mut metadata: BTreeMap<String, Option<String>> = DocumentProperty::ALL
            .iter()
            .map(|p| (p.name().to_string(), doc.property(*p)))
            .collect();

        for (key, value) in doc.custom_properties() {
            if !metadata.keys().any(|k| k.eq_ignore_ascii_case(&key)) {
                metadata.insert(key, Some(value));
            }
        }
        Ok(metadata)
    }

    fn load(&self, file_name: &str) -> Result<(ResolvedDocument, E::Document)> {
        let source = self
            .storage
            .resolve(file_name, FallbackPolicy::PreferDerived)?;
        let bytes = self.storage.read(&source)?;
        debug!(file = %source.name, area = %source.area, size = bytes.len(), "Loading document");
        let doc = self.engine.load(&bytes)?;
        Ok((source, doc))
    }
}

/// Non-blank `title` entry of a metadata patch, key matched case-insensitively
fn requested_title(patch: &MetadataPatch) -> Option<String> {
    patch
        .iter()
        .find(|(key, value)| key.trim().eq_ignore_ascii_case("title") && !value.trim().is_empty())
        .map(|(_, value)| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lopdf_engine::LopdfEngine;
    use crate::model::{EditBatch, ExportFormat, ImageFormat, TextOverlay, TextReplace};
    use crate::storage::StorageConfig;
    use crate::testing::{create_test_pdf, test_engine};
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use tempfile::TempDir;

    fn editor() -> (TempDir, PdfEditor<LopdfEngine>) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(&StorageConfig {
            root: dir.path().to_path_buf(),
        })
        .unwrap();
        (dir, PdfEditor::new(storage, test_engine()))
    }

    fn upload(editor: &PdfEditor<LopdfEngine>, pages: &[&str]) -> String {
        editor
            .save_upload("report.pdf", &create_test_pdf(pages))
            .unwrap()
            .file_name
    }

    fn stored(editor: &PdfEditor<LopdfEngine>, area: StorageArea) -> Vec<String> {
        editor.storage().list(area).unwrap()
    }

    fn commit(file_name: &str, batch: EditBatch) -> CommitRequest {
        CommitRequest {
            file_name: file_name.to_string(),
            save_as_new: true,
            batch,
        }
    }

    fn hello_to_hi() -> EditBatch {
        EditBatch {
            replacements: vec![TextReplace {
                find: "Hello".to_string(),
                replace_with: "Hi".to_string(),
                case_sensitive: true,
                whole_word: false,
            }],
            ..Default::default()
        }
    }

    fn overlay(page: u32) -> TextOverlay {
        TextOverlay {
            page,
            x: 10.0,
            y: 10.0,
            text: "Note".to_string(),
            font_size: 12.0,
            font_name: None,
            color_hex: "#000000".to_string(),
        }
    }

    #[test]
    fn test_upload_then_page_count() {
        let (_dir, editor) = editor();
        let result = editor
            .save_upload("My Scan.PDF", &create_test_pdf(&["a", "b", "c"]))
            .unwrap();

        assert_eq!(result.page_count, 3);
        assert!(result.file_name.starts_with("My Scan_"));
        assert!(result.file_name.ends_with(".pdf"));
        assert_eq!(clean_display_name(&result.file_name), "My Scan");
        assert_eq!(editor.page_count(&result.file_name).unwrap(), 3);
        assert_eq!(stored(&editor, StorageArea::Working), vec![result.file_name]);
    }

    #[test]
    fn test_upload_rejects_bad_input() {
        let (_dir, editor) = editor();
        assert!(matches!(
            editor.save_upload("a.pdf", b""),
            Err(EditorError::Validation(_))
        ));
        assert!(matches!(
            editor.save_upload("a.txt", &create_test_pdf(&["a"])),
            Err(EditorError::Validation(_))
        ));
        assert!(matches!(
            editor.save_upload("a.pdf", b"%PDF-garbage"),
            Err(EditorError::Corrupt(_))
        ));
        assert!(stored(&editor, StorageArea::Working).is_empty());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let (_dir, editor) = editor();
        assert!(matches!(
            editor.page_count("ghost.pdf"),
            Err(EditorError::NotFound(_))
        ));
    }

    #[test]
    fn test_commit_as_new_uses_display_name() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["Hello world"]);

        let outcome = editor
            .apply_and_persist(&commit(&source, hello_to_hi()))
            .unwrap();
        assert_eq!(outcome.file_name, "report.pdf");
        assert_eq!(outcome.display_name, "report");
        assert_eq!(outcome.area, StorageArea::Derived);
        assert_eq!(outcome.report.replacements, 1);

        let (_, doc) = editor.load(&outcome.file_name).unwrap();
        let text = doc.page_text(1).unwrap();
        assert!(text.contains("Hi world"));
        assert!(!text.contains("Hello"));

        // The upload itself is untouched
        let (_, original) = editor.load(&source).unwrap();
        assert_eq!(original.page_text(1).unwrap(), "Hello world");
    }

    #[test]
    fn test_commit_title_names_output_with_collisions() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["x"]);
        let mut batch = EditBatch::default();
        batch
            .metadata
            .insert("Title".to_string(), "Quarterly Report".to_string());

        let first = editor.apply_and_persist(&commit(&source, batch.clone())).unwrap();
        let second = editor.apply_and_persist(&commit(&source, batch)).unwrap();

        assert_eq!(first.file_name, "Quarterly Report.pdf");
        assert_eq!(second.file_name, "Quarterly Report (1).pdf");
        assert_eq!(
            stored(&editor, StorageArea::Derived),
            vec!["Quarterly Report (1).pdf", "Quarterly Report.pdf"]
        );
    }

    #[test]
    fn test_commit_title_is_sanitized() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["x"]);
        let mut batch = EditBatch::default();
        batch
            .metadata
            .insert("title".to_string(), "  Q3: Plan / Draft?  ".to_string());

        let outcome = editor.apply_and_persist(&commit(&source, batch)).unwrap();
        assert_eq!(outcome.file_name, "Q3 Plan Draft.pdf");
    }

    #[test]
    fn test_commit_with_very_long_title() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["x"]);
        let mut batch = EditBatch::default();
        batch.metadata.insert("title".to_string(), "A".repeat(300));

        let first = editor.apply_and_persist(&commit(&source, batch.clone())).unwrap();
        assert_eq!(first.file_name, format!("{}.pdf", "A".repeat(200)));

        let second = editor.apply_and_persist(&commit(&source, batch)).unwrap();
        assert_eq!(second.file_name, format!("{} (1).pdf", "A".repeat(200)));
    }

    #[test]
    fn test_commit_falls_back_to_document_title() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["x"]);
        let mut batch = EditBatch::default();
        batch.metadata.insert("Title".to_string(), "Board Pack".to_string());
        let titled = editor.apply_and_persist(&commit(&source, batch)).unwrap();

        // No title in the patch: the stored document's own title wins
        let again = editor
            .apply_and_persist(&commit(&titled.file_name, hello_to_hi()))
            .unwrap();
        assert_eq!(again.file_name, "Board Pack (1).pdf");
    }

    #[test]
    fn test_commit_in_place() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["Hello world"]);

        let outcome = editor
            .apply_and_persist(&CommitRequest {
                save_as_new: false,
                ..commit(&source, hello_to_hi())
            })
            .unwrap();
        assert_eq!(outcome.file_name, source);
        assert_eq!(outcome.area, StorageArea::Working);
        assert!(stored(&editor, StorageArea::Derived).is_empty());

        let (_, doc) = editor.load(&source).unwrap();
        assert_eq!(doc.page_text(1).unwrap(), "Hi world");
    }

    #[test]
    fn test_commit_with_bad_overlay_writes_nothing() {
        let (dir, editor) = editor();
        let source = upload(&editor, &["a", "b", "c"]);
        let before = std::fs::read(dir.path().join("uploads").join(&source)).unwrap();

        let batch = EditBatch {
            overlays: vec![overlay(5)],
            ..Default::default()
        };
        let err = editor.apply_and_persist(&commit(&source, batch.clone())).unwrap_err();
        assert!(matches!(err, EditorError::PageOutOfRange { page: 5, page_count: 3 }));
        assert!(stored(&editor, StorageArea::Derived).is_empty());

        let in_place = CommitRequest {
            save_as_new: false,
            ..commit(&source, batch)
        };
        assert!(editor.apply_and_persist(&in_place).is_err());
        let after = std::fs::read(dir.path().join("uploads").join(&source)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_preview_never_writes() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["Hello world", "two"]);
        let before = stored(&editor, StorageArea::Working);

        let image = editor
            .preview_with_edits(&PreviewRequest {
                file_name: source.clone(),
                render: RenderRequest {
                    page: 2,
                    dpi: 36,
                    format: ImageFormat::Png,
                },
                batch: EditBatch {
                    overlays: vec![overlay(2)],
                    ..hello_to_hi()
                },
            })
            .unwrap();
        assert!(!image.is_empty());

        let failed = editor.preview_with_edits(&PreviewRequest {
            file_name: source.clone(),
            render: RenderRequest {
                page: 9,
                ..Default::default()
            },
            batch: hello_to_hi(),
        });
        assert!(matches!(failed, Err(EditorError::PageOutOfRange { .. })));

        assert!(stored(&editor, StorageArea::Derived).is_empty());
        assert_eq!(stored(&editor, StorageArea::Working), before);
        let (_, doc) = editor.load(&source).unwrap();
        assert_eq!(doc.page_text(1).unwrap(), "Hello world");
    }

    #[test]
    fn test_render_stored_page() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["a"]);
        let png = editor
            .render_stored_page(&source, &RenderRequest::default())
            .unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        // Letter page at the default 150 DPI
        assert_eq!((decoded.width(), decoded.height()), (1275, 1650));
    }

    #[test]
    fn test_export_images_prefers_derived() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["1", "2"]);
        let outcome = editor
            .apply_and_persist(&commit(&source, hello_to_hi()))
            .unwrap();

        let artifact = editor
            .export(&ExportRequest {
                file_name: outcome.file_name,
                format: ExportFormat::Images,
                image_format: ImageFormat::Png,
                dpi: 36,
            })
            .unwrap();
        assert_eq!(artifact.file_name, "report_images.zip");
        let archive = zip::ZipArchive::new(std::io::Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn test_export_pdf_uses_clean_name() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["1"]);
        let artifact = editor
            .export(&ExportRequest {
                file_name: source,
                format: ExportFormat::Pdf,
                image_format: ImageFormat::Png,
                dpi: 150,
            })
            .unwrap();
        assert_eq!(artifact.file_name, "report.pdf");
        assert!(artifact.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_open_download() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["1"]);
        let mut download = editor.open_download(&source).unwrap();
        assert_eq!(download.area, StorageArea::Working);

        let mut bytes = Vec::new();
        download.file.read_to_end(&mut bytes).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        assert!(matches!(
            editor.open_download("missing.pdf"),
            Err(EditorError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_metadata() {
        let (_dir, editor) = editor();
        let source = upload(&editor, &["1"]);
        let mut batch = EditBatch::default();
        batch.metadata.insert("author".to_string(), "Ada".to_string());
        batch.metadata.insert("Department".to_string(), "Finance".to_string());
        let outcome = editor
            .apply_and_persist(&CommitRequest {
                save_as_new: false,
                ..commit(&source, batch)
            })
            .unwrap();

        let metadata = editor.read_metadata(&outcome.file_name).unwrap();
        assert_eq!(metadata["Author"].as_deref(), Some("Ada"));
        assert_eq!(metadata["Title"], None);
        assert_eq!(metadata["Department"].as_deref(), Some("Finance"));
        assert_eq!(metadata.len(), 7);
    }

    #[test]
    fn test_requested_title() {
        let mut patch = MetadataPatch::new();
        assert_eq!(requested_title(&patch), None);
        patch.insert("TITLE".to_string(), "  ".to_string());
        assert_eq!(requested_title(&patch), None);
        patch.insert(" title ".to_string(), "Plan".to_string());
        assert_eq!(requested_title(&patch).as_deref(), Some("Plan"));
    }
}
