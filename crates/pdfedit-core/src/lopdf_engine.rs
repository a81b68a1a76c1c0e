//! Document engine backed by lopdf
//!
//! Text search and replacement work on decoded page content streams. Every
//! string operand of `Tj`, `'`, `"` is one text run, and so is the joined
//! string elements of a `TJ` array, so kerned text is matched as it reads.
//! Runs are decoded one byte per character, so only simple (single-byte)
//! font encodings are searchable. A match never spans two runs.
//!
//! Edited pages are kept decoded until the document is saved or rendered.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use image::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::docx;
use crate::engine::{
    DocumentEngine, DocumentProperty, EngineDocument, Rasterizer, TextMatch, TextRun,
};
use crate::error::{EditorError, Result};
use crate::fonts::resolve_standard_font;
use crate::naming::PropertyKey;

/// Info dictionary entries whose values are dates or names, not free text
const TYPED_INFO_KEYS: &[&str] = &["CreationDate", "ModDate", "Trapped"];

/// Guard against cyclic page trees when looking up inherited resources
const MAX_TREE_DEPTH: usize = 32;

/// TJ adjustments below this (thousandths of text space) read as a word gap
const TJ_SPACE_THRESHOLD: f64 = -200.0;

fn engine_err(e: impl Display) -> EditorError {
    EditorError::Engine(e.to_string())
}

pub struct LopdfEngine {
    rasterizer: Arc<dyn Rasterizer>,
}

impl LopdfEngine {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { rasterizer }
    }
}

impl DocumentEngine for LopdfEngine {
    type Document = LopdfDocument;

    fn load(&self, bytes: &[u8]) -> Result<LopdfDocument> {
        let doc = Document::load_mem(bytes).map_err(|e| EditorError::Corrupt(e.to_string()))?;
        let page_ids = doc.get_pages().into_values().collect();

        Ok(LopdfDocument {
            doc,
            page_ids,
            edited: HashMap::new(),
            fonts: HashMap::new(),
            rasterizer: Arc::clone(&self.rasterizer),
        })
    }
}

/// Decoded content of a page that has pending edits
struct EditedPage {
    content: Content,
    /// Original content has been wrapped in `q ... Q` so overlays start from
    /// a clean graphics state
    bracketed: bool,
}

pub struct LopdfDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    edited: HashMap<u32, EditedPage>,
    /// Standard font dictionaries added by overlays, keyed by base font
    fonts: HashMap<&'static str, ObjectId>,
    rasterizer: Arc<dyn Rasterizer>,
}

impl LopdfDocument {
    fn page_id(&self, page: u32) -> Result<ObjectId> {
        page.checked_sub(1)
            .and_then(|index| self.page_ids.get(index as usize))
            .copied()
            .ok_or(EditorError::PageOutOfRange {
                page,
                page_count: self.page_count(),
            })
    }

    /// Run `f` against the current content of a page, edited or not
    fn with_content<R>(&self, page: u32, f: impl FnOnce(&Content) -> R) -> Result<R> {
        if let Some(edited) = self.edited.get(&page) {
            return Ok(f(&edited.content));
        }
        let page_id = self.page_id(page)?;
        let content = self
            .doc
            .get_and_decode_page_content(page_id)
            .map_err(engine_err)?;
        Ok(f(&content))
    }

    fn edited_page(&mut self, page: u32) -> Result<&mut EditedPage> {
        let page_id = self.page_id(page)?;
        match self.edited.entry(page) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let content = self
                    .doc
                    .get_and_decode_page_content(page_id)
                    .map_err(engine_err)?;
                Ok(entry.insert(EditedPage {
                    content,
                    bracketed: false,
                }))
            }
        }
    }

    /// Make sure the page has its own indirect resources dictionary and return its id
    fn resources_id(&mut self, page_id: ObjectId) -> Result<ObjectId> {
        let existing = {
            let page = self.doc.get_dictionary(page_id).map_err(engine_err)?;
            match page.get(b"Resources") {
                Ok(Object::Reference(id)) => return Ok(*id),
                Ok(Object::Dictionary(dict)) => Some(dict.clone()),
                _ => None,
            }
        };

        let resources = existing
            .or_else(|| self.inherited_resources(page_id))
            .unwrap_or_else(Dictionary::new);
        let resources_id = self.doc.add_object(resources);

        self.doc
            .get_object_mut(page_id)
            .and_then(|page| page.as_dict_mut())
            .map_err(engine_err)?
            .set("Resources", Object::Reference(resources_id));

        Ok(resources_id)
    }

    fn inherited_resources(&self, page_id: ObjectId) -> Option<Dictionary> {
        let mut node_id = self
            .doc
            .get_dictionary(page_id)
            .ok()?
            .get(b"Parent")
            .ok()?
            .as_reference()
            .ok()?;

        for _ in 0..MAX_TREE_DEPTH {
            let node = self.doc.get_dictionary(node_id).ok()?;
            match node.get(b"Resources") {
                Ok(Object::Reference(id)) => return self.doc.get_dictionary(*id).ok().cloned(),
                Ok(Object::Dictionary(dict)) => return Some(dict.clone()),
                _ => {}
            }
            node_id = node.get(b"Parent").ok()?.as_reference().ok()?;
        }
        None
    }

    /// Register a standard font on the page and return its resource name
    fn register_font(&mut self, page_id: ObjectId, base_font: &'static str) -> Result<String> {
        let font_id = match self.fonts.get(base_font) {
            Some(id) => *id,
            None => {
                let id = self.doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => base_font,
                    "Encoding" => "WinAnsiEncoding",
                });
                self.fonts.insert(base_font, id);
                id
            }
        };

        let resource_name = format!("PdfEd{}", base_font.replace('-', ""));
        let key = resource_name.as_bytes().to_vec();

        let resources_id = self.resources_id(page_id)?;
        let shared_fonts = match self
            .doc
            .get_dictionary(resources_id)
            .map_err(engine_err)?
            .get(b"Font")
        {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };

        match shared_fonts {
            Some(fonts_id) => {
                self.doc
                    .get_object_mut(fonts_id)
                    .and_then(|fonts| fonts.as_dict_mut())
                    .map_err(engine_err)?
                    .set(key, Object::Reference(font_id));
            }
            None => {
                let resources = self
                    .doc
                    .get_object_mut(resources_id)
                    .and_then(|resources| resources.as_dict_mut())
                    .map_err(engine_err)?;
                if let Ok(Object::Dictionary(fonts)) = resources.get_mut(b"Font") {
                    fonts.set(key, Object::Reference(font_id));
                } else {
                    let mut fonts = Dictionary::new();
                    fonts.set(key, Object::Reference(font_id));
                    resources.set("Font", Object::Dictionary(fonts));
                }
            }
        }

        Ok(resource_name)
    }

    fn info(&self) -> Option<&Dictionary> {
        match self.doc.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.doc.get_dictionary(*id).ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    fn info_mut(&mut self) -> Result<&mut Dictionary> {
        let (existing_id, inline) = match self.doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => (Some(*id), None),
            Ok(Object::Dictionary(dict)) => (None, Some(dict.clone())),
            _ => (None, None),
        };

        let info_id = match existing_id {
            Some(id) => id,
            None => {
                let id = self.doc.add_object(inline.unwrap_or_else(Dictionary::new));
                self.doc.trailer.set("Info", Object::Reference(id));
                id
            }
        };

        self.doc
            .get_object_mut(info_id)
            .and_then(|info| info.as_dict_mut())
            .map_err(engine_err)
    }

    fn info_value(&self, key: &str) -> Option<String> {
        self.info()?.get(key.as_bytes()).ok().and_then(decode_info_value)
    }

    /// Serialize the current state without disturbing pending edits
    fn snapshot(&self) -> Result<Vec<u8>> {
        let mut doc = self.doc.clone();
        write_edited_pages(&mut doc, &self.page_ids, &self.edited)?;
        let mut output = Vec::new();
        doc.save_to(&mut output).map_err(engine_err)?;
        Ok(output)
    }
}

impl EngineDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    fn find_in_page(
        &self,
        page: u32,
        pattern: &str,
        case_sensitive: bool,
    ) -> Result<Vec<TextMatch>> {
        let Some(needle) = encode_single_byte(pattern) else {
            // Characters outside the single-byte range can never appear in a run
            return Ok(Vec::new());
        };

        self.with_content(page, |content| {
            let mut matches = Vec::new();
            for (run_index, run) in text_runs(content).into_iter().enumerate() {
                let Some(bytes) = run_bytes(content, run) else {
                    continue;
                };
                for (start, end) in find_all(&bytes, &needle, case_sensitive) {
                    matches.push(TextMatch {
                        page,
                        run: run_index,
                        start,
                        end,
                        text: decode_single_byte(&bytes[start..end]),
                    });
                }
            }
            matches
        })
    }

    fn set_match_text(&mut self, found: &TextMatch, text: &str) -> Result<()> {
        let replacement = encode_single_byte_lossy(text);
        let edited = self.edited_page(found.page)?;

        let run = text_runs(&edited.content)
            .get(found.run)
            .copied()
            .ok_or_else(|| {
                EditorError::Engine(format!(
                    "text run {} not found on page {}",
                    found.run, found.page
                ))
            })?;
        let mut segments = run_segments_mut(&mut edited.content, run).ok_or_else(|| {
            EditorError::Engine(format!("text run {} holds no strings", found.run))
        })?;

        let run_len: usize = segments.iter().map(|bytes| bytes.len()).sum();
        if found.start > found.end || found.end > run_len {
            return Err(EditorError::Engine(format!(
                "stale match {}..{} in run of length {}",
                found.start, found.end, run_len
            )));
        }
        splice_segments(&mut segments, found.start, found.end, replacement);
        Ok(())
    }

    fn page_text(&self, page: u32) -> Result<String> {
        self.with_content(page, content_text)
    }

    fn add_text_run(&mut self, run: &TextRun) -> Result<()> {
        let page_id = self.page_id(run.page)?;
        let base_font = resolve_standard_font(run.font_name.as_deref());
        let resource_name = self.register_font(page_id, base_font)?;
        let (r, g, b) = run.color.to_unit();

        debug!(page = run.page, font = base_font, "Adding text run");

        let edited = self.edited_page(run.page)?;
        if !edited.bracketed {
            edited.content.operations.insert(0, Operation::new("q", vec![]));
            edited.content.operations.push(Operation::new("Q", vec![]));
            edited.bracketed = true;
        }

        edited.content.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(resource_name.into_bytes()),
                    Object::Real(run.font_size as f32),
                ],
            ),
            Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
            Operation::new(
                "Td",
                vec![Object::Real(run.x as f32), Object::Real(run.y as f32)],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(
                    encode_single_byte_lossy(&run.text),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
        ]);
        Ok(())
    }

    fn property(&self, property: DocumentProperty) -> Option<String> {
        self.info_value(property.name())
    }

    fn set_property(&mut self, property: DocumentProperty, value: &str) -> Result<()> {
        self.info_mut()?.set(property.name(), encode_text_string(value));
        Ok(())
    }

    fn custom_property(&self, key: &PropertyKey) -> Option<String> {
        self.info_value(key.as_str())
    }

    fn custom_properties(&self) -> Vec<(String, String)> {
        let Some(info) = self.info() else {
            return Vec::new();
        };
        info.iter()
            .filter_map(|(key, value)| {
                let key = String::from_utf8_lossy(key).into_owned();
                if DocumentProperty::ALL.iter().any(|p| p.name() == key) {
                    return None;
                }
                decode_info_value(value).map(|value| (key, value))
            })
            .collect()
    }

    fn set_custom_property(&mut self, key: &PropertyKey, value: &str) -> Result<()> {
        let name = key.as_str();
        if DocumentProperty::from_key(name).is_some() {
            return Err(EditorError::Validation(format!(
                "'{}' collides with a reserved property",
                name
            )));
        }
        if TYPED_INFO_KEYS.iter().any(|k| k.eq_ignore_ascii_case(name)) {
            return Err(EditorError::Validation(format!(
                "'{}' is not a text property",
                name
            )));
        }
        if value.contains('\0') {
            return Err(EditorError::Validation(format!(
                "value for '{}' contains a NUL character",
                name
            )));
        }

        self.info_mut()?.set(name, encode_text_string(value));
        Ok(())
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<RgbaImage> {
        self.page_id(page)?;
        let pdf = self.snapshot()?;
        self.rasterizer.rasterize(&pdf, page, dpi)
    }

    fn save_as_pdf(&mut self) -> Result<Vec<u8>> {
        write_edited_pages(&mut self.doc, &self.page_ids, &self.edited)?;
        self.edited.clear();

        self.doc.prune_objects();
        self.doc.compress();

        let mut output = Vec::new();
        self.doc.save_to(&mut output).map_err(engine_err)?;
        Ok(output)
    }

    fn save_as_docx(&mut self) -> Result<Vec<u8>> {
        let pages = (1..=self.page_count())
            .map(|page| self.page_text(page))
            .collect::<Result<Vec<_>>>()?;
        let title = self.property(DocumentProperty::Title);
        docx::build_docx(title.as_deref(), &pages)
    }
}

/// Replace the content of every edited page with a fresh stream
fn write_edited_pages(
    doc: &mut Document,
    page_ids: &[ObjectId],
    edited: &HashMap<u32, EditedPage>,
) -> Result<()> {
    for (page, edited_page) in edited {
        let Some(page_id) = page.checked_sub(1).and_then(|i| page_ids.get(i as usize)) else {
            continue;
        };
        let encoded = edited_page.content.encode().map_err(engine_err)?;
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), encoded));
        doc.get_object_mut(*page_id)
            .and_then(|page| page.as_dict_mut())
            .map_err(engine_err)?
            .set("Contents", Object::Reference(stream_id));
    }
    Ok(())
}

/// Location of one text run inside a content stream. For `TJ` the run is
/// every string element of the array, read as one byte sequence.
#[derive(Debug, Clone, Copy)]
struct RunRef {
    op: usize,
    operand: usize,
}

fn text_runs(content: &Content) -> Vec<RunRef> {
    let mut runs = Vec::new();
    for (op, operation) in content.operations.iter().enumerate() {
        let operand = match operation.operator.as_str() {
            "Tj" | "'" | "TJ" => 0,
            "\"" => 2,
            _ => continue,
        };
        match operation.operands.get(operand) {
            Some(Object::String(..)) => runs.push(RunRef { op, operand }),
            Some(Object::Array(items)) if operation.operator == "TJ" => {
                if items.iter().any(|item| matches!(item, Object::String(..))) {
                    runs.push(RunRef { op, operand });
                }
            }
            _ => {}
        }
    }
    runs
}

/// Joined bytes of a run
fn run_bytes(content: &Content, run: RunRef) -> Option<Vec<u8>> {
    let operand = content.operations.get(run.op)?.operands.get(run.operand)?;
    match operand {
        Object::String(bytes, _) => Some(bytes.clone()),
        Object::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Object::String(bytes, _) => Some(bytes.as_slice()),
                    _ => None,
                })
                .flatten()
                .copied()
                .collect(),
        ),
        _ => None,
    }
}

/// The string pieces of a run, in order
fn run_segments_mut(content: &mut Content, run: RunRef) -> Option<Vec<&mut Vec<u8>>> {
    let operand = content
        .operations
        .get_mut(run.op)?
        .operands
        .get_mut(run.operand)?;
    match operand {
        Object::String(bytes, _) => Some(vec![bytes]),
        Object::Array(items) => Some(
            items
                .iter_mut()
                .filter_map(|item| match item {
                    Object::String(bytes, _) => Some(bytes),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Replace `start..end` of the joined segments. The replacement lands in the
/// first segment the span touches; later segments only lose their share.
fn splice_segments(
    segments: &mut [&mut Vec<u8>],
    start: usize,
    end: usize,
    replacement: Vec<u8>,
) {
    let mut replacement = Some(replacement);
    let mut offset = 0;
    for bytes in segments.iter_mut() {
        let (seg_start, seg_end) = (offset, offset + bytes.len());
        offset = seg_end;

        let lo = start.max(seg_start);
        let hi = end.min(seg_end);
        let touched = if start == end {
            replacement.is_some() && start <= seg_end
        } else {
            lo < hi
        };
        if !touched {
            continue;
        }

        let tail = bytes.split_off(hi - seg_start);
        bytes.truncate(lo - seg_start);
        if let Some(text) = replacement.take() {
            bytes.extend(text);
        }
        bytes.extend(tail);
    }
}

/// Non-overlapping occurrences of `needle`, left to right
fn find_all(haystack: &[u8], needle: &[u8], case_sensitive: bool) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    if needle.is_empty() {
        return found;
    }

    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        let window = &haystack[i..i + needle.len()];
        let hit = if case_sensitive {
            window == needle
        } else {
            window.eq_ignore_ascii_case(needle)
        };
        if hit {
            found.push((i, i + needle.len()));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    found
}

fn as_number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Approximate reading-order text of a content stream
fn content_text(content: &Content) -> String {
    fn line_break(out: &mut String) {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    }
    fn push_run(out: &mut String, operand: Option<&Object>) {
        if let Some(Object::String(bytes, _)) = operand {
            out.push_str(&decode_single_byte(bytes));
        }
    }

    let mut out = String::new();
    for operation in &content.operations {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "Tj" => push_run(&mut out, operands.first()),
            "'" => {
                line_break(&mut out);
                push_run(&mut out, operands.first());
            }
            "\"" => {
                line_break(&mut out);
                push_run(&mut out, operands.get(2));
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => out.push_str(&decode_single_byte(bytes)),
                            other => {
                                if as_number(other).is_some_and(|n| n < TJ_SPACE_THRESHOLD) {
                                    out.push(' ');
                                }
                            }
                        }
                    }
                }
            }
            "T*" | "ET" => line_break(&mut out),
            "Td" | "TD" => {
                if operands.get(1).and_then(as_number).is_some_and(|ty| ty != 0.0) {
                    line_break(&mut out);
                }
            }
            _ => {}
        }
    }

    let trimmed_len = out.trim_end_matches('\n').len();
    out.truncate(trimmed_len);
    out
}

fn decode_single_byte(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// `None` if any character has no single-byte representation
fn encode_single_byte(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

fn encode_single_byte_lossy(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// PDF text string: plain bytes for ASCII, UTF-16BE with BOM otherwise
fn encode_text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => decode_single_byte(bytes),
    }
}

fn decode_info_value(value: &Object) -> Option<String> {
    match value {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}
