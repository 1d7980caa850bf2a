//! Listing API wire types.
//!
//! These mirror what a paginated listing endpoint hands back: a page of raw
//! metadata records plus an opaque continuation cursor.

use std::fmt;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Opaque continuation token returned by the listing API.
///
/// Callers must never interpret or construct cursors themselves; they are
/// only ever handed back to the remote that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a token produced by a remote.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for handing back to the remote.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens can be kilobytes long; keep log lines readable.
        match self.0.char_indices().nth(16) {
            Some((cut, _)) => write!(f, "{}…", &self.0[..cut]),
            None => f.write_str(&self.0),
        }
    }
}

/// Raw metadata record as delivered by the remote.
///
/// Every field except the tag is optional because remotes are allowed to
/// send partial records; conversion into an [`Entry`](crate::Entry) decides
/// what is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Record type: `file`, `folder` or `deleted`.
    #[serde(rename = ".tag")]
    pub tag: CompactString,

    /// Leaf name.
    #[serde(default)]
    pub name: Option<CompactString>,

    /// Path with original casing.
    #[serde(default)]
    pub path_display: Option<String>,

    /// Lower-cased path.
    #[serde(default)]
    pub path_lower: Option<String>,

    /// Stable identifier.
    #[serde(default)]
    pub id: Option<String>,

    /// Size in bytes (files only).
    #[serde(default)]
    pub size: Option<u64>,

    /// Opaque content hash (files only).
    #[serde(default)]
    pub content_hash: Option<String>,

    /// Revision identifier (files only).
    #[serde(default)]
    pub rev: Option<String>,

    /// Server-side modification time (files only).
    #[serde(default)]
    pub server_modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    fn with_tag(tag: &str, path: &str) -> Self {
        let name = path.rsplit('/').next().map(CompactString::from);
        Self {
            tag: tag.into(),
            name,
            path_display: Some(path.to_string()),
            path_lower: Some(path.to_lowercase()),
            id: None,
            size: None,
            content_hash: None,
            rev: None,
            server_modified: None,
        }
    }

    /// A folder record.
    pub fn folder(path: &str) -> Self {
        Self::with_tag("folder", path)
    }

    /// A file record with a size.
    pub fn file(path: &str, size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::with_tag("file", path)
        }
    }

    /// A deletion marker.
    pub fn deleted(path: &str) -> Self {
        Self::with_tag("deleted", path)
    }

    /// Set the stable identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the content hash.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Set the revision.
    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    /// Set the modification time.
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.server_modified = Some(modified);
        self
    }

    /// Best available path for diagnostics.
    pub fn display_path(&self) -> &str {
        self.path_display
            .as_deref()
            .or(self.path_lower.as_deref())
            .unwrap_or("<unknown>")
    }

    /// Whether this record describes a folder.
    pub fn is_folder(&self) -> bool {
        self.tag == "folder"
    }

    /// Whether this record describes a file.
    pub fn is_file(&self) -> bool {
        self.tag == "file"
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    /// Records on this page.
    pub entries: Vec<RemoteEntry>,
    /// Cursor for the next page.
    pub cursor: Option<Cursor>,
    /// Whether more pages follow.
    pub has_more: bool,
}

impl ListPage {
    /// A terminal page.
    pub fn last(entries: Vec<RemoteEntry>) -> Self {
        Self {
            entries,
            cursor: None,
            has_more: false,
        }
    }

    /// A page followed by more pages.
    pub fn more(entries: Vec<RemoteEntry>, cursor: Cursor) -> Self {
        Self {
            entries,
            cursor: Some(cursor),
            has_more: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_display_truncates() {
        let cursor = Cursor::new("a".repeat(64));
        assert_eq!(cursor.to_string().chars().count(), 17);
        assert_eq!(Cursor::new("c1").to_string(), "c1");
    }

    #[test]
    fn test_remote_entry_tag_field() {
        let json = r#"{".tag": "file", "path_display": "/A/f.txt", "size": 12}"#;
        let entry: RemoteEntry = serde_json::from_str(json).unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.size, Some(12));
        assert!(entry.id.is_none());
    }

    #[test]
    fn test_remote_entry_constructors() {
        let folder = RemoteEntry::folder("/Photos/2024");
        assert!(folder.is_folder());
        assert_eq!(folder.name.as_deref(), Some("2024"));
        assert_eq!(folder.path_lower.as_deref(), Some("/photos/2024"));
    }
}
