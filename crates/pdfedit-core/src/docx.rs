//! Minimal WordprocessingML package for text export
//!
//! One paragraph per extracted line, a page break between source pages.
//! Layout, images, and fonts are not carried over.

use std::io::{Cursor, Write};

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#;

const DOCUMENT_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_CLOSE: &str = "<w:sectPr/></w:body></w:document>";

const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// Build a .docx from the plain text of each page, in order
pub fn build_docx(title: Option<&str>, pages: &[String]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(ROOT_RELS.as_bytes())?;

        zip.start_file("word/document.xml", options)?;
        zip.write_all(document_xml(pages).as_bytes())?;

        zip.start_file("docProps/core.xml", options)?;
        zip.write_all(core_xml(title).as_bytes())?;

        zip.finish()?;
    }
    Ok(buffer)
}

fn document_xml(pages: &[String]) -> String {
    let mut xml = String::from(DOCUMENT_OPEN);
    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            xml.push_str(PAGE_BREAK);
        }
        for line in page.lines() {
            xml.push_str(&paragraph(line));
        }
    }
    xml.push_str(DOCUMENT_CLOSE);
    xml
}

fn paragraph(line: &str) -> String {
    let text = xml_text(line);
    if text.is_empty() {
        return "<w:p/>".to_string();
    }
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, text)
}

fn core_xml(title: Option<&str>) -> String {
    let title = title
        .map(|t| format!("<dc:title>{}</dc:title>", xml_text(t)))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/">{}</cp:coreProperties>"#,
        title
    )
}

/// Escape for XML character data, dropping characters XML 1.0 cannot hold
fn xml_text(raw: &str) -> String {
    let allowed: String = raw
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .collect();
    escape(&allowed).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::read_zip_entry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_package_has_required_parts() {
        let bytes = build_docx(Some("Report"), &["Hello".to_string()]).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "docProps/core.xml",
                "word/document.xml"
            ]
        );
    }

    #[test]
    fn test_pages_and_lines() {
        let pages = vec!["first\nsecond".to_string(), "third".to_string()];
        let bytes = build_docx(None, &pages).unwrap();
        let xml = read_zip_entry(&bytes, "word/document.xml");

        assert_eq!(xml.matches("<w:t ").count(), 3);
        assert_eq!(xml.matches(r#"w:type="page""#).count(), 1);
        let first = xml.find("first").unwrap();
        let third = xml.find("third").unwrap();
        assert!(first < third);
    }

    #[test]
    fn test_text_is_escaped() {
        let bytes = build_docx(Some("A & B"), &["x < y\u{1}".to_string()]).unwrap();
        let xml = read_zip_entry(&bytes, "word/document.xml");
        assert!(xml.contains("x &lt; y<"));
        assert!(!xml.contains('\u{1}'));

        let core = read_zip_entry(&bytes, "docProps/core.xml");
        assert!(core.contains("<dc:title>A &amp; B</dc:title>"));
    }

    #[test]
    fn test_empty_document() {
        let bytes = build_docx(None, &[]).unwrap();
        let xml = read_zip_entry(&bytes, "word/document.xml");
        assert!(xml.ends_with(DOCUMENT_CLOSE));
        assert!(!xml.contains("<w:p>"));
    }
}
