//! On-disk checkpoint schemas.
//!
//! Two layouts exist. The current one carries an explicit `version` field;
//! the legacy one, written by the original inventory script, has none and
//! uses snake_case keys. Detection is by shape, then [`CheckpointSchema::migrate`]
//! turns either into a [`Checkpoint`].

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tallyfile_core::{Checkpoint, Cursor, Entry, EntryKind};

/// Version written by this release.
pub const CHECKPOINT_VERSION: u32 = 2;

/// Current checkpoint layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// Always [`CHECKPOINT_VERSION`].
    pub version: u32,

    #[serde(flatten)]
    pub checkpoint: Checkpoint,
}

impl CheckpointFile {
    /// Wrap a checkpoint in the current layout.
    pub fn new(checkpoint: Checkpoint) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            checkpoint,
        }
    }
}

/// Legacy checkpoint layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyCheckpoint {
    #[serde(default)]
    pub cursor: Option<String>,

    #[serde(default = "default_has_more")]
    pub has_more: bool,

    #[serde(default)]
    pub entries_count: u64,

    #[serde(default)]
    pub api_calls: u64,

    /// Naive local time, as written by the legacy tool.
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Folders observed so far. Not needed to resume.
    #[serde(default)]
    pub folders_seen: Vec<String>,
}

fn default_has_more() -> bool {
    true
}

/// A checkpoint as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointSchema {
    V1(LegacyCheckpoint),
    V2(CheckpointFile),
}

impl CheckpointSchema {
    /// Detect the layout of `raw` and parse it.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let Some(object) = value.as_object() else {
            return Err("expected a JSON object".to_string());
        };

        if let Some(version) = object.get("version") {
            if version.as_u64() != Some(u64::from(CHECKPOINT_VERSION)) {
                return Err(format!("unsupported checkpoint version {version}"));
            }
            return serde_json::from_value(value)
                .map(Self::V2)
                .map_err(|e| e.to_string());
        }

        if object.contains_key("has_more") {
            return serde_json::from_value(value)
                .map(Self::V1)
                .map_err(|e| e.to_string());
        }

        Err("unrecognized checkpoint layout".to_string())
    }

    /// Check if this is the legacy layout.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::V1(_))
    }

    /// Convert to the current in-memory form.
    ///
    /// A legacy cursor is dropped when the legacy run had already reached
    /// the end, since it can never be continued from.
    pub fn migrate(self) -> Checkpoint {
        match self {
            Self::V2(file) => file.checkpoint,
            Self::V1(legacy) => Checkpoint {
                cursor: legacy.cursor.filter(|_| legacy.has_more).map(Cursor::new),
                has_more: legacy.has_more,
                entry_count: legacy.entries_count,
                api_call_count: legacy.api_calls,
                saved_at: legacy
                    .timestamp
                    .as_deref()
                    .and_then(parse_local_timestamp)
                    .unwrap_or_else(Utc::now),
            },
        }
    }
}

/// An entry in a legacy inventory file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub size_mb: f64,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub dropbox_id: Option<String>,
    #[serde(default)]
    pub folder_depth: Option<u32>,
    #[serde(default)]
    pub parent_folder: Option<String>,
}

/// Legacy inventory file. Its summary block is not needed.
#[derive(Debug, Deserialize)]
pub(crate) struct LegacyInventory {
    #[serde(default)]
    pub entries: Vec<LegacyEntry>,
}

impl LegacyEntry {
    /// Convert to a current entry. Depth and parent are recomputed from the
    /// path rather than trusted.
    pub fn into_entry(self) -> Result<Entry, String> {
        let kind: EntryKind = self
            .kind
            .parse()
            .map_err(|_| format!("unknown entry type {:?} at {}", self.kind, self.path))?;

        let mut entry = match kind {
            EntryKind::File => Entry::new_file(&self.path, self.size_bytes),
            EntryKind::Folder => Entry::new_folder(&self.path),
        };
        if let Some(lower) = self.path_lower {
            entry.path_lower = lower;
        }
        entry.remote_id = self.dropbox_id;
        if kind == EntryKind::File {
            entry.content_hash = self.content_hash;
            entry.revision = self.revision;
            entry.modified_at = self.modified.as_deref().and_then(parse_utc_timestamp);
        }
        Ok(entry)
    }
}

/// Parse a timestamp that may lack an offset, treating it as local time.
fn parse_local_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = parse_naive(raw)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a timestamp that may lack an offset, treating it as UTC.
fn parse_utc_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_naive(raw).map(|naive| naive.and_utc())
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
}
