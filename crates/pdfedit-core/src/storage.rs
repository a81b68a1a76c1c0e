//! Two-area document storage
//!
//! Uploads land in the working area, commit-as-new results in the derived
//! area. Both are flat directories under one root.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EditorError, Result};

/// Upper bound on create-exclusive retries when racing for a derived name
const MAX_CREATE_ATTEMPTS: usize = 16;

const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Freshly uploaded, unedited documents
    Working,
    /// Documents produced by a commit-as-new edit
    Derived,
}

impl StorageArea {
    pub fn dir_name(&self) -> &'static str {
        match self {
            StorageArea::Working => "uploads",
            StorageArea::Derived => "processed",
        }
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageArea::Working => write!(f, "working"),
            StorageArea::Derived => write!(f, "derived"),
        }
    }
}

impl FromStr for StorageArea {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "working" | "uploads" => Ok(StorageArea::Working),
            "derived" | "processed" => Ok(StorageArea::Derived),
            other => Err(EditorError::Validation(format!(
                "unknown storage area '{}'",
                other
            ))),
        }
    }
}

/// Where to look for a named document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Only the given area
    Strict(StorageArea),
    /// Derived first, then working
    PreferDerived,
}

impl FallbackPolicy {
    fn areas(&self) -> &'static [StorageArea] {
        match self {
            FallbackPolicy::Strict(StorageArea::Working) => &[StorageArea::Working],
            FallbackPolicy::Strict(StorageArea::Derived) => &[StorageArea::Derived],
            FallbackPolicy::PreferDerived => &[StorageArea::Derived, StorageArea::Working],
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

/// A document located in one of the areas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    pub name: String,
    pub area: StorageArea,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create both area directories under the configured root
    pub fn open(config: &StorageConfig) -> Result<Self> {
        for area in [StorageArea::Working, StorageArea::Derived] {
            fs::create_dir_all(config.root.join(area.dir_name()))?;
        }
        debug!(root = %config.root.display(), "Storage opened");
        Ok(Self {
            root: config.root.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn area_dir(&self, area: StorageArea) -> PathBuf {
        self.root.join(area.dir_name())
    }

    /// Path of `name` inside `area`. Names are flat; anything that could
    /// escape the area directory is rejected.
    pub fn path_of(&self, area: StorageArea, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        Ok(self.area_dir(area).join(name))
    }

    pub fn exists(&self, area: StorageArea, name: &str) -> Result<bool> {
        Ok(self.path_of(area, name)?.is_file())
    }

    pub fn resolve(&self, name: &str, policy: FallbackPolicy) -> Result<ResolvedDocument> {
        for &area in policy.areas() {
            let path = self.path_of(area, name)?;
            if path.is_file() {
                return Ok(ResolvedDocument {
                    name: name.to_string(),
                    area,
                    path,
                });
            }
        }
        Err(EditorError::NotFound(name.to_string()))
    }

    pub fn read(&self, document: &ResolvedDocument) -> Result<Vec<u8>> {
        fs::read(&document.path).map_err(|e| not_found_or_io(e, &document.name))
    }

    /// Strict read handle, no fallback to the other area
    pub fn open_for_read(&self, area: StorageArea, name: &str) -> Result<File> {
        let path = self.path_of(area, name)?;
        File::open(path).map_err(|e| not_found_or_io(e, name))
    }

    /// File names in one area, sorted
    pub fn list(&self, area: StorageArea) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.area_dir(area))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// `base.ext` when free, else the first free `base (n).ext`.
    ///
    /// Only a snapshot: another writer may take the name before it is used.
    /// [`create_unique`](Self::create_unique) closes that window.
    pub fn allocate_unique_name(&self, area: StorageArea, base: &str, ext: &str) -> Result<String> {
        self.next_free_name(area, base, ext, 0)
    }

    fn next_free_name(&self, area: StorageArea, base: &str, ext: &str, from: u32) -> Result<String> {
        let mut n = from;
        loop {
            let candidate = numbered_name(base, ext, n);
            if !self.exists(area, &candidate)? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Write `bytes` to a name that must not exist yet
    pub fn create_new(&self, area: StorageArea, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_of(area, name)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %cleanup, "Failed to remove partial file");
            }
            return Err(e.into());
        }
        Ok(path)
    }

    /// Allocate a collision-free name and write to it exclusively, moving on
    /// to the next suffix when another writer wins the race
    pub fn create_unique(&self, area: StorageArea, base: &str, ext: &str, bytes: &[u8]) -> Result<String> {
        let mut from = 0;
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let name = self.next_free_name(area, base, ext, from)?;
            match self.create_new(area, &name, bytes) {
                Ok(_) => return Ok(name),
                Err(EditorError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(name = %name, "Name taken concurrently, retrying");
                    from = suffix_of(&name, base, ext).map_or(1, |n| n + 1);
                }
                Err(e) => return Err(e),
            }
        }
        Err(EditorError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "no free name for '{}.{}' after {} attempts",
                base, ext, MAX_CREATE_ATTEMPTS
            ),
        )))
    }

    /// Replace the content of an existing file
    pub fn overwrite(&self, document: &ResolvedDocument, bytes: &[u8]) -> Result<()> {
        fs::write(&document.path, bytes)?;
        Ok(())
    }
}

/// `n == 0` is the bare name
fn numbered_name(base: &str, ext: &str, n: u32) -> String {
    if n == 0 {
        format!("{}.{}", base, ext)
    } else {
        format!("{} ({}).{}", base, n, ext)
    }
}

fn suffix_of(name: &str, base: &str, ext: &str) -> Option<u32> {
    let inner = name
        .strip_prefix(base)?
        .strip_suffix(ext)?
        .strip_suffix('.')?;
    if inner.is_empty() {
        return Some(0);
    }
    inner.strip_prefix(" (")?.strip_suffix(')')?.parse().ok()
}

fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.len() > MAX_FILE_NAME_LEN
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(EditorError::Validation(format!("invalid file name '{}'", name)));
    }
    Ok(())
}

fn not_found_or_io(e: io::Error, name: &str) -> EditorError {
    if e.kind() == io::ErrorKind::NotFound {
        EditorError::NotFound(name.to_string())
    } else {
        EditorError::Io(e)
    }
}
