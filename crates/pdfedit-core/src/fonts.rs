//! Font registry mapping free-form font names onto the PDF standard 14 fonts
//!
//! Overlays are drawn with standard Type1 fonts so nothing has to be embedded.
//! Requested names such as "Arial Bold", "serif", or "BCDEEE+TimesNewRomanPSMT"
//! are resolved by family and style; anything unrecognised becomes Helvetica.

pub const DEFAULT_FONT: &str = "Helvetica";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Times,
    Helvetica,
    Courier,
    Symbol,
    ZapfDingbats,
}

fn family_of(lower: &str) -> Family {
    match lower {
        "serif" => return Family::Times,
        "sans-serif" | "cursive" | "fantasy" => return Family::Helvetica,
        "monospace" => return Family::Courier,
        _ => {}
    }

    if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
        Family::Times
    } else if lower.contains("courier")
        || lower.contains("mono")
        || lower.contains("consolas")
        || lower.contains("monaco")
    {
        Family::Courier
    } else if lower.contains("symbol") {
        Family::Symbol
    } else if lower.contains("zapf") || lower.contains("dingbat") {
        Family::ZapfDingbats
    } else {
        Family::Helvetica
    }
}

/// Resolve a requested font name to a standard 14 base font name
pub fn resolve_standard_font(requested: Option<&str>) -> &'static str {
    let lower = match requested.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_lowercase(),
        _ => return DEFAULT_FONT,
    };

    let bold = lower.contains("bold");
    let italic = lower.contains("italic") || lower.contains("oblique");

    match family_of(&lower) {
        Family::Times => match (bold, italic) {
            (true, true) => "Times-BoldItalic",
            (true, false) => "Times-Bold",
            (false, true) => "Times-Italic",
            (false, false) => "Times-Roman",
        },
        Family::Helvetica => match (bold, italic) {
            (true, true) => "Helvetica-BoldOblique",
            (true, false) => "Helvetica-Bold",
            (false, true) => "Helvetica-Oblique",
            (false, false) => "Helvetica",
        },
        Family::Courier => match (bold, italic) {
            (true, true) => "Courier-BoldOblique",
            (true, false) => "Courier-Bold",
            (false, true) => "Courier-Oblique",
            (false, false) => "Courier",
        },
        Family::Symbol => "Symbol",
        Family::ZapfDingbats => "ZapfDingbats",
    }
}
