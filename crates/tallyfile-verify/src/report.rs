//! Verification report types.

use serde::{Deserialize, Serialize};

use crate::breakdown::{DepthBreakdown, RootFolderTotals};

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// The inventory agrees with the source.
    Passed,
    /// The inventory disagrees with the source.
    Failed,
    /// The check could not run; the message says why.
    Error(String),
}

impl CheckStatus {
    /// Check if this status is a pass.
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Root folders listed live versus depth-1 folders in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSetCheck {
    pub status: CheckStatus,
    /// Folders the source has that the inventory lacks.
    pub missing_from_inventory: Vec<String>,
    /// Folders the inventory has that the source no longer lists. Possibly
    /// deleted since the scan; never a failure on their own.
    pub possibly_deleted: Vec<String>,
    /// Root folders reported by the source.
    pub live_folders: usize,
    /// Root files reported by the source.
    pub live_files: usize,
    /// Depth-1 folders in the inventory.
    pub inventory_folders: usize,
}

/// Account usage versus the inventory's total file size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCheck {
    pub status: CheckStatus,
    /// Bytes the source reports in use.
    pub used_bytes: Option<u64>,
    /// Sum of file sizes in the inventory.
    pub inventory_bytes: u64,
    /// `used - inventory`, negative when the inventory is larger.
    pub difference_bytes: Option<i64>,
    /// `|difference| / used`.
    pub relative_difference: Option<f64>,
    /// Largest accepted relative difference.
    pub tolerance: f64,
}

/// Live child count of one folder versus the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotCheck {
    pub status: CheckStatus,
    /// Folder checked.
    pub path: String,
    /// Children the source lists.
    pub live_count: Option<usize>,
    /// Entries in the inventory whose parent is this folder.
    pub inventory_count: usize,
}

/// Result of all checks plus the offline breakdowns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub root_set: RootSetCheck,
    pub usage: UsageCheck,
    pub spot_checks: Vec<SpotCheck>,
    pub root_folders: Vec<RootFolderTotals>,
    pub depth_breakdown: DepthBreakdown,
    /// Remote calls the checks made, retries included.
    pub api_calls: u64,
}

impl VerificationReport {
    /// Overall verdict: root set complete, usage within tolerance, every spot
    /// check matching.
    pub fn passed(&self) -> bool {
        self.root_set.status.is_passed()
            && self.usage.status.is_passed()
            && self.spot_checks.iter().all(|c| c.status.is_passed())
    }

    /// Human-readable list of problems, empty when everything passed.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        match &self.root_set.status {
            CheckStatus::Error(message) => issues.push(format!("Root set check failed to run: {message}")),
            _ if !self.root_set.missing_from_inventory.is_empty() => issues.push(format!(
                "Missing {} root folders: {}",
                self.root_set.missing_from_inventory.len(),
                self.root_set.missing_from_inventory.join(", ")
            )),
            _ => {}
        }

        match (&self.usage.status, self.usage.relative_difference) {
            (CheckStatus::Error(message), _) => issues.push(format!("Usage check failed to run: {message}")),
            (CheckStatus::Failed, Some(relative)) => issues.push(format!(
                "Usage differs by {:.1}% (tolerance {:.1}%)",
                relative * 100.0,
                self.usage.tolerance * 100.0
            )),
            (CheckStatus::Failed, None) => {
                issues.push("Usage is zero but the inventory holds data".to_string())
            }
            _ => {}
        }

        for check in &self.spot_checks {
            match (&check.status, check.live_count) {
                (CheckStatus::Error(message), _) => {
                    issues.push(format!("Spot check of {} failed to run: {message}", check.path))
                }
                (CheckStatus::Failed, Some(live)) => issues.push(format!(
                    "{}: {} live children, {} in inventory",
                    check.path, live, check.inventory_count
                )),
                _ => {}
            }
        }

        issues
    }
}
