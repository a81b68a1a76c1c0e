//! Apply an edit batch to a loaded document

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::{DocumentProperty, EngineDocument, Rgb, TextRun};
use crate::error::{EditorError, Result};
use crate::model::{EditBatch, MetadataPatch, TextOverlay, TextReplace};
use crate::naming::sanitize_property_key;

/// What an applied batch changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditReport {
    /// Number of matched spans that were rewritten
    pub replacements: usize,
    pub overlays: usize,
    pub metadata: MetadataReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataReport {
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedProperty>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedProperty {
    pub key: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "detail")]
pub enum SkipReason {
    /// Nothing identifier-safe was left after sanitizing the key
    EmptyKey,
    Rejected(String),
}

/// Parse `#RRGGBB` or `RRGGBB`; anything else is black
pub fn parse_hex_color(color: &str) -> Rgb {
    let hex = color.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Rgb::BLACK;
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
    Rgb {
        r: channel(0),
        g: channel(2),
        b: channel(4),
    }
}

/// Apply replacements, then overlays, then metadata, mutating `doc` in place.
///
/// Overlay pages are checked before anything is touched, so an out-of-range
/// overlay leaves the document unchanged.
pub fn apply_edits<D: EngineDocument>(doc: &mut D, batch: &EditBatch) -> Result<EditReport> {
    let page_count = doc.page_count();
    if let Some(bad) = batch
        .overlays
        .iter()
        .find(|o| o.page == 0 || o.page > page_count)
    {
        return Err(EditorError::PageOutOfRange {
            page: bad.page,
            page_count,
        });
    }

    let mut report = EditReport::default();

    for rule in &batch.replacements {
        report.replacements += apply_replacement(doc, rule)?;
    }

    for overlay in &batch.overlays {
        doc.add_text_run(&overlay_run(overlay))?;
        report.overlays += 1;
    }

    report.metadata = apply_metadata(doc, &batch.metadata)?;

    debug!(
        replacements = report.replacements,
        overlays = report.overlays,
        metadata_applied = report.metadata.applied.len(),
        metadata_skipped = report.metadata.skipped.len(),
        "Edit batch applied"
    );
    Ok(report)
}

fn apply_replacement<D: EngineDocument>(doc: &mut D, rule: &TextReplace) -> Result<usize> {
    if rule.find.is_empty() {
        warn!("Skipping replacement with empty search text");
        return Ok(0);
    }

    let mut replaced = 0;
    for page in 1..=doc.page_count() {
        // whole_word is accepted but matching is always a literal substring
        let matches = match doc.find_in_page(page, &rule.find, rule.case_sensitive) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(page, error = %e, "Skipping page whose text could not be searched");
                continue;
            }
        };

        // Back to front so earlier offsets in the same run stay valid
        for found in matches.iter().rev() {
            doc.set_match_text(found, &rule.replace_with)?;
        }
        replaced += matches.len();
    }
    Ok(replaced)
}

fn overlay_run(overlay: &TextOverlay) -> TextRun {
    TextRun {
        page: overlay.page,
        x: overlay.x,
        y: overlay.y,
        text: overlay.text.clone(),
        font_size: overlay.font_size,
        font_name: overlay.font_name.clone(),
        color: parse_hex_color(&overlay.color_hex),
    }
}

fn apply_metadata<D: EngineDocument>(doc: &mut D, patch: &MetadataPatch) -> Result<MetadataReport> {
    let mut report = MetadataReport::default();

    for (raw_key, value) in patch {
        if let Some(property) = DocumentProperty::from_key(raw_key) {
            doc.set_property(property, value)?;
            report.applied.push(property.name().to_string());
            continue;
        }

        let Some(key) = sanitize_property_key(raw_key) else {
            warn!(key = %raw_key, "Skipping metadata key with no usable characters");
            report.skipped.push(SkippedProperty {
                key: raw_key.clone(),
                reason: SkipReason::EmptyKey,
            });
            continue;
        };

        match doc.set_custom_property(&key, value) {
            Ok(()) => report.applied.push(key.to_string()),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping metadata key");
                report.skipped.push(SkippedProperty {
                    key: raw_key.clone(),
                    reason: SkipReason::Rejected(e.to_string()),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DocumentEngine, TextMatch};
    use crate::lopdf_engine::LopdfDocument;
    use crate::naming::PropertyKey;
    use image::RgbaImage;
    use crate::testing::{create_test_pdf, test_engine};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn load(pages: &[&str]) -> LopdfDocument {
        test_engine().load(&create_test_pdf(pages)).unwrap()
    }

    fn replace(find: &str, with: &str) -> TextReplace {
        TextReplace {
            find: find.to_string(),
            replace_with: with.to_string(),
            case_sensitive: true,
            whole_word: false,
        }
    }

    fn overlay(page: u32, text: &str) -> TextOverlay {
        TextOverlay {
            page,
            x: 72.0,
            y: 72.0,
            text: text.to_string(),
            font_size: 12.0,
            font_name: None,
            color_hex: "#FF0000".to_string(),
        }
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), Rgb { r: 255, g: 0, b: 0 });
        assert_eq!(parse_hex_color("00ff80"), Rgb { r: 0, g: 255, b: 128 });
        assert_eq!(parse_hex_color("#FFF"), Rgb::BLACK);
        assert_eq!(parse_hex_color("#GG0000"), Rgb::BLACK);
        assert_eq!(parse_hex_color("#FF000000"), Rgb::BLACK);
        assert_eq!(parse_hex_color(""), Rgb::BLACK);
        assert_eq!(parse_hex_color("##FF0000"), Rgb::BLACK);
    }

    #[test]
    fn test_replacement_rewrites_text() {
        let mut doc = load(&["Hello world"]);
        let batch = EditBatch {
            replacements: vec![replace("Hello", "Hi")],
            ..Default::default()
        };

        let report = apply_edits(&mut doc, &batch).unwrap();
        assert_eq!(report.replacements, 1);

        let text = doc.page_text(1).unwrap();
        assert!(text.contains("Hi world"));
        assert!(!text.contains("Hello"));
    }

    #[test]
    fn test_replacement_without_match_is_noop() {
        let mut doc = load(&["Hello world"]);
        let batch = EditBatch {
            replacements: vec![replace("Goodbye", "Hi")],
            ..Default::default()
        };
        let report = apply_edits(&mut doc, &batch).unwrap();
        assert_eq!(report.replacements, 0);
        assert_eq!(doc.page_text(1).unwrap(), "Hello world");
    }

    #[test]
    fn test_empty_find_is_skipped() {
        let mut doc = load(&["Hello"]);
        let batch = EditBatch {
            replacements: vec![replace("", "x")],
            ..Default::default()
        };
        assert_eq!(apply_edits(&mut doc, &batch).unwrap().replacements, 0);
        assert_eq!(doc.page_text(1).unwrap(), "Hello");
    }

    #[test]
    fn test_case_insensitive_replacement() {
        let mut doc = load(&["ACME acme Acme"]);
        let batch = EditBatch {
            replacements: vec![TextReplace {
                case_sensitive: false,
                ..replace("acme", "Initech")
            }],
            ..Default::default()
        };
        assert_eq!(apply_edits(&mut doc, &batch).unwrap().replacements, 3);
        assert_eq!(doc.page_text(1).unwrap(), "Initech Initech Initech");
    }

    #[test]
    fn test_whole_word_still_matches_substrings() {
        // Word boundaries are not honored; "cat" inside "concatenate" is rewritten
        let mut doc = load(&["cat concatenate"]);
        let batch = EditBatch {
            replacements: vec![TextReplace {
                whole_word: true,
                ..replace("cat", "dog")
            }],
            ..Default::default()
        };
        assert_eq!(apply_edits(&mut doc, &batch).unwrap().replacements, 2);
        assert_eq!(doc.page_text(1).unwrap(), "dog condogenate");
    }

    #[test]
    fn test_replacements_run_in_order() {
        let mut doc = load(&["alpha"]);
        let batch = EditBatch {
            replacements: vec![replace("alpha", "beta"), replace("beta", "gamma")],
            ..Default::default()
        };
        apply_edits(&mut doc, &batch).unwrap();
        assert_eq!(doc.page_text(1).unwrap(), "gamma");
    }

    /// Document whose content on one page cannot be decoded
    struct UnreadablePage {
        inner: LopdfDocument,
        page: u32,
    }

    impl EngineDocument for UnreadablePage {
        fn page_count(&self) -> u32 {
            self.inner.page_count()
        }
        fn find_in_page(
            &self,
            page: u32,
            pattern: &str,
            case_sensitive: bool,
        ) -> Result<Vec<TextMatch>> {
            if page == self.page {
                return Err(EditorError::Engine("Could not decode content".to_string()));
            }
            self.inner.find_in_page(page, pattern, case_sensitive)
        }
        fn set_match_text(&mut self, found: &TextMatch, text: &str) -> Result<()> {
            self.inner.set_match_text(found, text)
        }
        fn page_text(&self, page: u32) -> Result<String> {
            self.inner.page_text(page)
        }
        fn add_text_run(&mut self, run: &TextRun) -> Result<()> {
            self.inner.add_text_run(run)
        }
        fn property(&self, property: DocumentProperty) -> Option<String> {
            self.inner.property(property)
        }
        fn set_property(&mut self, property: DocumentProperty, value: &str) -> Result<()> {
            self.inner.set_property(property, value)
        }
        fn custom_property(&self, key: &PropertyKey) -> Option<String> {
            self.inner.custom_property(key)
        }
        fn custom_properties(&self) -> Vec<(String, String)> {
            self.inner.custom_properties()
        }
        fn set_custom_property(&mut self, key: &PropertyKey, value: &str) -> Result<()> {
            self.inner.set_custom_property(key, value)
        }
        fn render_page(&self, page: u32, dpi: u32) -> Result<RgbaImage> {
            self.inner.render_page(page, dpi)
        }
        fn save_as_pdf(&mut self) -> Result<Vec<u8>> {
            self.inner.save_as_pdf()
        }
        fn save_as_docx(&mut self) -> Result<Vec<u8>> {
            self.inner.save_as_docx()
        }
    }

    #[test]
    fn test_unreadable_page_does_not_abort_replacements() {
        let mut doc = UnreadablePage {
            inner: load(&["Acme one", "Acme two", "Acme three"]),
            page: 2,
        };
        let batch = EditBatch {
            replacements: vec![replace("Acme", "Initech")],
            overlays: vec![overlay(2, "STAMP")],
            ..Default::default()
        };

        let report = apply_edits(&mut doc, &batch).unwrap();
        assert_eq!(report.replacements, 2);
        assert_eq!(report.overlays, 1);
        assert_eq!(doc.page_text(1).unwrap(), "Initech one");
        assert_eq!(doc.page_text(3).unwrap(), "Initech three");
    }

    #[test]
    fn test_overlay_out_of_range_changes_nothing() {
        let mut doc = load(&["one", "two", "three"]);
        let batch = EditBatch {
            replacements: vec![replace("one", "uno")],
            overlays: vec![overlay(1, "ok"), overlay(5, "nope")],
            ..Default::default()
        };

        let err = apply_edits(&mut doc, &batch).unwrap_err();
        assert!(matches!(
            err,
            EditorError::PageOutOfRange { page: 5, page_count: 3 }
        ));
        assert_eq!(doc.page_text(1).unwrap(), "one");
    }

    #[test]
    fn test_overlay_page_zero_is_out_of_range() {
        let mut doc = load(&["one"]);
        let batch = EditBatch {
            overlays: vec![overlay(0, "x")],
            ..Default::default()
        };
        assert!(matches!(
            apply_edits(&mut doc, &batch),
            Err(EditorError::PageOutOfRange { page: 0, .. })
        ));
    }

    #[test]
    fn test_overlays_are_drawn() {
        let mut doc = load(&["one", "two"]);
        let batch = EditBatch {
            overlays: vec![overlay(2, "SIGNED"), overlay(2, "DATED")],
            ..Default::default()
        };
        assert_eq!(apply_edits(&mut doc, &batch).unwrap().overlays, 2);

        let text = doc.page_text(2).unwrap();
        assert!(text.contains("SIGNED"));
        assert!(text.contains("DATED"));
        assert_eq!(doc.page_text(1).unwrap(), "one");
    }

    #[test]
    fn test_metadata_reserved_and_custom() {
        let mut doc = load(&["x"]);
        let mut metadata = MetadataPatch::new();
        metadata.insert("title".to_string(), "Quarterly Report".to_string());
        metadata.insert("Dept Name!".to_string(), "Finance".to_string());
        metadata.insert("***".to_string(), "lost".to_string());
        metadata.insert("ModDate".to_string(), "yesterday".to_string());

        let batch = EditBatch {
            metadata,
            ..Default::default()
        };
        let report = apply_edits(&mut doc, &batch).unwrap().metadata;

        assert_eq!(
            doc.property(DocumentProperty::Title).as_deref(),
            Some("Quarterly Report")
        );
        let key = sanitize_property_key("DeptName").unwrap();
        assert_eq!(doc.custom_property(&key).as_deref(), Some("Finance"));

        assert_eq!(report.applied, vec!["DeptName", "Title"]);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].key, "***");
        assert_eq!(report.skipped[0].reason, SkipReason::EmptyKey);
        assert_eq!(report.skipped[1].key, "ModDate");
        assert!(matches!(report.skipped[1].reason, SkipReason::Rejected(_)));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = EditReport {
            replacements: 1,
            overlays: 0,
            metadata: MetadataReport {
                applied: vec![],
                skipped: vec![SkippedProperty {
                    key: "?".to_string(),
                    reason: SkipReason::EmptyKey,
                }],
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["metadata"]["skipped"][0]["reason"]["kind"], "emptyKey");
    }

    proptest! {
        #[test]
        fn malformed_colors_are_black(s in "[^0-9A-Fa-f#]{0,8}") {
            prop_assert_eq!(parse_hex_color(&s), Rgb::BLACK);
        }

        #[test]
        fn wellformed_colors_roundtrip(r in any::<u8>(), g in any::<u8>(), b in any::<u8>(), hash in any::<bool>()) {
            let hex = format!("{}{:02x}{:02X}{:02x}", if hash { "#" } else { "" }, r, g, b);
            prop_assert_eq!(parse_hex_color(&hex), Rgb { r, g, b });
        }
    }
}
