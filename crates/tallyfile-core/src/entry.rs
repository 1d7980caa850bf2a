//! Inventory entry types.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{EntryWarning, WarningKind};
use crate::wire::RemoteEntry;

/// Extension bucket for names without a usable suffix.
pub const NO_EXTENSION: &str = "(none)";

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Type of inventory node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Folder.
    Folder,
}

/// A single file or folder in the inventory.
///
/// Entries are immutable once captured; the path is the unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// File or folder.
    pub kind: EntryKind,

    /// Canonical absolute path with original casing.
    pub path: String,

    /// Case-folded path, for matching against case-insensitive sources.
    pub path_lower: String,

    /// Leaf name.
    pub name: CompactString,

    /// Path of the containing folder (`/` for root children).
    pub parent_path: String,

    /// Number of ancestors, counting the root.
    pub depth: u32,

    /// Size in bytes (always zero for folders).
    #[serde(default)]
    pub size_bytes: u64,

    /// Opaque content hash.
    #[serde(default)]
    pub content_hash: Option<String>,

    /// Opaque revision identifier.
    #[serde(default)]
    pub revision: Option<String>,

    /// Server-side modification time.
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,

    /// Stable identifier assigned by the source.
    #[serde(default)]
    pub remote_id: Option<String>,
}

/// Split an absolute path into `(parent, name, depth)`.
///
/// `/A` yields `("/", "A", 1)`, `/A/f.txt` yields `("/A", "f.txt", 2)`.
pub fn split_path(path: &str) -> (String, &str, u32) {
    let depth = path.matches('/').count() as u32;
    match path.rfind('/') {
        Some(0) => ("/".to_string(), &path[1..], depth),
        Some(idx) => (path[..idx].to_string(), &path[idx + 1..], depth),
        None => ("/".to_string(), path, depth),
    }
}

/// Lower-cased suffix of a name including the dot, if it has one.
///
/// Names that start with their only dot (`.bashrc`) or end in a dot have no
/// extension.
pub fn extension_of(name: &str) -> Option<String> {
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(name[idx..].to_lowercase())
}

impl Entry {
    fn bare(kind: EntryKind, path: &str) -> Self {
        let (parent_path, name, depth) = split_path(path);
        Self {
            kind,
            path: path.to_string(),
            path_lower: path.to_lowercase(),
            name: name.into(),
            parent_path,
            depth,
            size_bytes: 0,
            content_hash: None,
            revision: None,
            modified_at: None,
            remote_id: None,
        }
    }

    /// Create a folder entry.
    pub fn new_folder(path: &str) -> Self {
        Self::bare(EntryKind::Folder, path)
    }

    /// Create a file entry.
    pub fn new_file(path: &str, size_bytes: u64) -> Self {
        Self {
            size_bytes,
            ..Self::bare(EntryKind::File, path)
        }
    }

    /// Set the remote identifier.
    pub fn with_remote_id(mut self, id: impl Into<String>) -> Self {
        self.remote_id = Some(id.into());
        self
    }

    /// Convert a raw record from the remote.
    ///
    /// Returns `Ok(None)` for deletion markers, which are part of a listing
    /// but never part of an inventory.
    pub fn from_remote(raw: &RemoteEntry) -> Result<Option<Self>, EntryWarning> {
        let kind = match raw.tag.as_str() {
            "file" => EntryKind::File,
            "folder" => EntryKind::Folder,
            "deleted" => return Ok(None),
            other => return Err(EntryWarning::unknown_kind(raw.display_path(), other)),
        };

        let Some(path) = raw.path_display.as_deref().or(raw.path_lower.as_deref()) else {
            return Err(EntryWarning::missing_field(raw.display_path(), "path_display"));
        };
        if !path.starts_with('/') || path.ends_with('/') {
            return Err(EntryWarning::new(
                path,
                "Path must be absolute and name a child of the root",
                WarningKind::MalformedPath,
            ));
        }

        let mut entry = Self::bare(kind, path);
        if let Some(lower) = &raw.path_lower {
            entry.path_lower = lower.clone();
        }
        entry.remote_id = raw.id.clone();

        if kind == EntryKind::File {
            let Some(size) = raw.size else {
                return Err(EntryWarning::missing_field(path, "size"));
            };
            entry.size_bytes = size;
            entry.content_hash = raw.content_hash.clone();
            entry.revision = raw.rev.clone();
            entry.modified_at = raw.server_modified;
        }

        Ok(Some(entry))
    }

    /// Check if this entry is a file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Check if this entry is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// Lower-cased extension including the dot (files only).
    pub fn extension(&self) -> Option<String> {
        if self.is_file() {
            extension_of(&self.name)
        } else {
            None
        }
    }

    /// Extension bucket used for per-type aggregates.
    pub fn extension_bucket(&self) -> String {
        self.extension().unwrap_or_else(|| NO_EXTENSION.to_string())
    }

    /// Size in megabytes, rounded to two decimals.
    pub fn size_mb(&self) -> f64 {
        (self.size_bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/A"), ("/".to_string(), "A", 1));
        assert_eq!(split_path("/A/f.txt"), ("/A".to_string(), "f.txt", 2));
        assert_eq!(split_path("/a/b/c"), ("/a/b".to_string(), "c", 3));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.PDF").as_deref(), Some(".pdf"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("Makefile"), None);
        assert_eq!(extension_of("odd."), None);
    }

    #[test]
    fn test_from_remote_file() {
        let raw = RemoteEntry::file("/Docs/Plan.TXT", 2048)
            .with_id("id:1")
            .with_content_hash("abc")
            .with_rev("r1");
        let entry = Entry::from_remote(&raw).unwrap().unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.parent_path, "/Docs");
        assert_eq!(entry.depth, 2);
        assert_eq!(entry.path_lower, "/docs/plan.txt");
        assert_eq!(entry.extension_bucket(), ".txt");
        assert_eq!(entry.remote_id.as_deref(), Some("id:1"));
    }

    #[test]
    fn test_from_remote_skips_deleted() {
        assert!(Entry::from_remote(&RemoteEntry::deleted("/gone")).unwrap().is_none());
    }

    #[test]
    fn test_from_remote_rejects_partial_records() {
        let mut raw = RemoteEntry::file("/x.bin", 1);
        raw.size = None;
        let warning = Entry::from_remote(&raw).unwrap_err();
        assert_eq!(warning.kind, WarningKind::MissingField);

        let mut raw = RemoteEntry::folder("/x");
        raw.tag = "symlink".into();
        assert_eq!(Entry::from_remote(&raw).unwrap_err().kind, WarningKind::UnknownKind);

        let raw = RemoteEntry::folder("relative/path");
        assert_eq!(Entry::from_remote(&raw).unwrap_err().kind, WarningKind::MalformedPath);
    }

    #[test]
    fn test_folder_has_no_extension() {
        let folder = Entry::new_folder("/photos.2024");
        assert_eq!(folder.extension(), None);
        assert_eq!(folder.size_mb(), 0.0);
    }

    #[test]
    fn test_size_mb_rounding() {
        let file = Entry::new_file("/big.iso", 1_572_864);
        assert_eq!(file.size_mb(), 1.5);
    }
}
