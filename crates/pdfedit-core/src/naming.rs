//! File and property name derivation
//!
//! Stored files carry a `_<32 hex>` identity suffix (optionally preceded by
//! `_edited`) that is stripped again for display and download names.

use std::fmt;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

/// Base name used when nothing printable survives sanitization
pub const FALLBACK_BASE: &str = "document";

/// Longest base name in bytes; leaves room for ` (n).ext` within a
/// 255-byte file name
pub const MAX_BASE_LEN: usize = 200;

lazy_static! {
    static ref UNSAFE_FILE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._\- ]+").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    static ref IDENTITY_SUFFIX: Regex = Regex::new(r"(?i)((?:_edited)?_[0-9a-f]{32})+$").unwrap();
    static ref UNSAFE_KEY_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.\-]").unwrap();
}

/// Normalize arbitrary text (usually a document title) into a file base name
pub fn sanitize_base(raw: &str) -> String {
    let cleaned = UNSAFE_FILE_CHARS.replace_all(raw, "");
    let collapsed = WHITESPACE_RUN.replace_all(&cleaned, " ");
    let trimmed = collapsed.trim();

    let mut end = trimmed.len().min(MAX_BASE_LEN);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let bounded = trimmed[..end].trim_end();

    if bounded.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        bounded.to_string()
    }
}

/// Strip the extension and any trailing identity suffixes from a stored file name
///
/// `report_edited_<hex>_<hex>.pdf` becomes `report`.
pub fn clean_display_name(stored_file_name: &str) -> String {
    let stem = Path::new(stored_file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = IDENTITY_SUFFIX.replace(&stem, "");

    if name.trim().is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        name.into_owned()
    }
}

/// Identifier-safe name of a custom document property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyKey(String);

impl PropertyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a free-form metadata key to `[A-Za-z0-9_.-]`, or `None` if nothing is left
pub fn sanitize_property_key(raw: &str) -> Option<PropertyKey> {
    let safe = UNSAFE_KEY_CHARS.replace_all(raw.trim(), "");
    if safe.is_empty() {
        None
    } else {
        Some(PropertyKey(safe.into_owned()))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn stored_name() -> impl Strategy<Value = String> {
        (
            "[A-Za-z0-9 ._-]{0,20}",
            prop::collection::vec(("(_edited)?", "[0-9a-fA-F]{32}"), 0..3),
            prop_oneof![Just(".pdf"), Just(""), Just(".PDF")],
        )
            .prop_map(|(base, suffixes, ext)| {
                let mut name = base;
                for (edited, hex) in suffixes {
                    name.push_str(&edited);
                    name.push('_');
                    name.push_str(&hex);
                }
                name.push_str(ext);
                name
            })
    }

    proptest! {
        #[test]
        fn clean_display_name_is_idempotent(name in stored_name()) {
            let once = clean_display_name(&name);
            let twice = clean_display_name(&format!("{}.pdf", once));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn clean_display_name_is_never_empty(name in ".{0,60}") {
            prop_assert!(!clean_display_name(&name).is_empty());
        }

        #[test]
        fn sanitize_base_output_is_safe(raw in ".{0,300}") {
            let base = sanitize_base(&raw);
            prop_assert!(!base.is_empty());
            prop_assert!(!base.contains('/') && !base.contains('\\'));
            prop_assert!(base.chars().all(|c| c.is_ascii_alphanumeric() || "._- ".contains(c)));
            prop_assert_eq!(base.trim(), base.as_str());
            prop_assert!(!base.contains("  "));
            prop_assert!(base.len() <= MAX_BASE_LEN);
        }

        #[test]
        fn sanitized_keys_are_identifier_safe(raw in ".{0,40}") {
            if let Some(key) = sanitize_property_key(&raw) {
                prop_assert!(!key.as_str().is_empty());
                prop_assert!(key.as_str().chars().all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c)));
            }
        }
    }
}
