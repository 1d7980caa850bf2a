//! Inventory breakdowns that need no remote calls.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use tallyfile_core::Entry;

/// Entry counts at one depth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthStats {
    /// Depth (`/A` is 1).
    pub depth: u32,
    /// Folders at this depth.
    pub folders: u64,
    /// Files at this depth.
    pub files: u64,
    /// Bytes in files at this depth.
    pub bytes: u64,
}

/// Entries grouped by depth, shallowest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthBreakdown {
    pub levels: Vec<DepthStats>,
}

impl DepthBreakdown {
    /// Compute the breakdown.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Self {
        let mut levels: BTreeMap<u32, DepthStats> = BTreeMap::new();
        for entry in entries {
            let stats = levels.entry(entry.depth).or_insert_with(|| DepthStats {
                depth: entry.depth,
                ..DepthStats::default()
            });
            if entry.is_file() {
                stats.files += 1;
                stats.bytes += entry.size_bytes;
            } else {
                stats.folders += 1;
            }
        }
        Self {
            levels: levels.into_values().collect(),
        }
    }

    /// Deepest level present.
    pub fn max_depth(&self) -> Option<u32> {
        self.levels.last().map(|l| l.depth)
    }

    /// Stats at a depth, if any entries live there.
    pub fn at(&self, depth: u32) -> Option<&DepthStats> {
        self.levels.iter().find(|l| l.depth == depth)
    }
}

/// Everything under one folder at the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFolderTotals {
    /// Folder path.
    pub path: String,
    /// Folder name.
    pub name: String,
    /// Files anywhere below the folder.
    pub file_count: u64,
    /// Bytes in those files.
    pub size_bytes: u64,
}

/// Totals for each root folder in the inventory, sorted by path.
pub fn root_folder_totals(entries: &[Entry]) -> Vec<RootFolderTotals> {
    let mut totals: BTreeMap<String, RootFolderTotals> = entries
        .iter()
        .filter(|e| e.is_folder() && e.depth == 1)
        .map(|e| {
            (
                e.path_lower.clone(),
                RootFolderTotals {
                    path: e.path.clone(),
                    name: e.name.to_string(),
                    file_count: 0,
                    size_bytes: 0,
                },
            )
        })
        .collect();

    for file in entries.iter().filter(|e| e.is_file() && e.depth > 1) {
        let root = file.path_lower.splitn(3, '/').take(2).join("/");
        if let Some(total) = totals.get_mut(&root) {
            total.file_count += 1;
            total.size_bytes += file.size_bytes;
        }
    }

    totals
        .into_values()
        .sorted_by(|a, b| a.path.cmp(&b.path))
        .collect()
}
