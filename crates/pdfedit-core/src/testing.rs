//! Helpers shared by unit tests here and by the server crate's tests

use std::io::{Cursor, Read};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::coords::POINTS_PER_INCH;
use crate::engine::Rasterizer;
use crate::error::Result;
use crate::lopdf_engine::LopdfEngine;

const LETTER_WIDTH_PT: f64 = 612.0;
const LETTER_HEIGHT_PT: f64 = 792.0;

/// Letter-sized PDF with one Helvetica line of text per page
pub fn create_test_pdf(pages: &[&str]) -> Vec<u8> {
    let pages: Vec<Vec<Object>> = pages
        .iter()
        .map(|text| vec![Object::string_literal(*text)])
        .collect();
    create_kerned_test_pdf(&pages)
}

/// Like [`create_test_pdf`], but each page shows its line with one `TJ`
/// array, so pieces can be split by kerning adjustments.
/// A page given as a single string uses a plain `Tj` instead.
pub fn create_kerned_test_pdf(pages: &[Vec<Object>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for line in pages {
        let show = match line.as_slice() {
            [single @ Object::String(..)] => Operation::new("Tj", vec![single.clone()]),
            items => Operation::new("TJ", vec![Object::Array(items.to_vec())]),
        };
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                show,
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    // Resources and MediaBox live on the page tree node and are inherited
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    "F1" => font_id,
                },
            },
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Rasterizer that returns a blank letter-sized page at the requested DPI
pub struct BlankPageRasterizer;

impl Rasterizer for BlankPageRasterizer {
    fn rasterize(&self, _pdf: &[u8], _page: u32, dpi: u32) -> Result<RgbaImage> {
        let scale = dpi as f64 / POINTS_PER_INCH;
        let width = (LETTER_WIDTH_PT * scale).round() as u32;
        let height = (LETTER_HEIGHT_PT * scale).round() as u32;
        Ok(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
    }
}

pub fn test_engine() -> LopdfEngine {
    LopdfEngine::new(Arc::new(BlankPageRasterizer))
}

/// Read one entry of a zip archive as UTF-8 text
pub fn read_zip_entry(archive: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut text = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    text
}
