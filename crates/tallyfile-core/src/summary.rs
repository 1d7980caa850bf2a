//! Inventory summaries and snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::entry::Entry;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Whether an inventory covers the whole tree yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// The listing API reported no further pages.
    Complete,
    /// Enumeration was paused or is still running.
    InProgress,
}

/// Totals computed from a set of entries.
///
/// Always recomputed from scratch; there is no way to patch one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Total number of entries.
    pub total_entries: u64,
    /// Number of files.
    pub total_files: u64,
    /// Number of folders.
    pub total_folders: u64,
    /// Sum of file sizes in bytes.
    pub total_size_bytes: u64,
    /// File count per extension bucket.
    pub file_type_counts: BTreeMap<String, u64>,
    /// Byte total per extension bucket.
    pub file_type_sizes: BTreeMap<String, u64>,
}

impl Aggregate {
    /// Compute totals over entries.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Self {
        let mut aggregate = Self::default();
        for entry in entries {
            aggregate.total_entries += 1;
            if entry.is_file() {
                let bucket = entry.extension_bucket();
                aggregate.total_files += 1;
                aggregate.total_size_bytes += entry.size_bytes;
                *aggregate.file_type_counts.entry(bucket.clone()).or_default() += 1;
                *aggregate.file_type_sizes.entry(bucket).or_default() += entry.size_bytes;
            } else {
                aggregate.total_folders += 1;
            }
        }
        aggregate
    }
}

/// Summary block of an inventory artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// When this summary was computed.
    pub generated: DateTime<Utc>,
    /// Completion status.
    pub status: RunStatus,
    /// Total number of entries.
    pub total_entries: u64,
    /// Number of files.
    pub total_files: u64,
    /// Number of folders.
    pub total_folders: u64,
    /// Sum of file sizes in bytes.
    pub total_size_bytes: u64,
    /// Sum of file sizes in GiB, rounded to two decimals.
    pub total_size_gb: f64,
    /// Remote calls made, including retried attempts.
    pub api_calls_made: u64,
    /// File count per extension bucket.
    pub file_type_counts: BTreeMap<String, u64>,
    /// Byte total per extension bucket.
    pub file_type_sizes: BTreeMap<String, u64>,
}

impl Summary {
    /// Build a summary from freshly computed totals.
    pub fn new(aggregate: Aggregate, status: RunStatus, api_calls_made: u64) -> Self {
        Self {
            generated: Utc::now(),
            status,
            total_entries: aggregate.total_entries,
            total_files: aggregate.total_files,
            total_folders: aggregate.total_folders,
            total_size_bytes: aggregate.total_size_bytes,
            total_size_gb: (aggregate.total_size_bytes as f64 / BYTES_PER_GB * 100.0).round()
                / 100.0,
            api_calls_made,
            file_type_counts: aggregate.file_type_counts,
            file_type_sizes: aggregate.file_type_sizes,
        }
    }

    /// Check if the inventory is complete.
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }
}

/// Point-in-time view of an inventory, borrowed from its store.
#[derive(Debug, Clone, Serialize)]
pub struct InventorySnapshot<'a> {
    /// Summary recomputed from `entries`.
    pub summary: Summary,
    /// Entries in listing order.
    pub entries: Vec<&'a Entry>,
}

impl<'a> InventorySnapshot<'a> {
    /// Take a snapshot, recomputing the summary.
    pub fn new(entries: Vec<&'a Entry>, status: RunStatus, api_calls_made: u64) -> Self {
        let aggregate = Aggregate::from_entries(entries.iter().copied());
        Self {
            summary: Summary::new(aggregate, status, api_calls_made),
            entries,
        }
    }
}

/// Owned inventory as read back from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryArtifact {
    /// Summary as written.
    pub summary: Summary,
    /// All entries.
    pub entries: Vec<Entry>,
}

impl InventoryArtifact {
    /// Recompute totals from the entries, ignoring the stored summary.
    pub fn recompute(&self) -> Aggregate {
        Aggregate::from_entries(&self.entries)
    }
}
