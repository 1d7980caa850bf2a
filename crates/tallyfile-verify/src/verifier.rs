//! Reconciliation of an inventory against the live source.

use std::collections::BTreeMap;

use tracing::{info, warn};

use tallyfile_core::{Entry, RemoteEntry, VerifyConfig};
use tallyfile_remote::{RemoteListing, RetryError, RetryPolicy, Sleeper, ThreadSleeper};

use crate::breakdown::{DepthBreakdown, root_folder_totals};
use crate::report::{CheckStatus, RootSetCheck, SpotCheck, UsageCheck, VerificationReport};

/// Runs reconciliation checks. Never modifies the inventory.
pub struct Verifier<R, S = ThreadSleeper> {
    remote: R,
    config: VerifyConfig,
    retry: RetryPolicy<S>,
}

impl<R: RemoteListing> Verifier<R, ThreadSleeper> {
    /// Create a verifier that sleeps for real between retries.
    pub fn new(remote: R, config: VerifyConfig) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self::with_retry_policy(remote, config, retry)
    }
}

impl<R: RemoteListing, S: Sleeper> Verifier<R, S> {
    /// Create a verifier with a custom retry policy.
    pub fn with_retry_policy(remote: R, config: VerifyConfig, retry: RetryPolicy<S>) -> Self {
        Self {
            remote,
            config,
            retry,
        }
    }

    /// Run every check. A check whose remote calls fail is marked as an
    /// error and the remaining checks still run.
    pub fn verify(&mut self, entries: &[Entry]) -> VerificationReport {
        let root_set = self.check_root_set(entries);
        let usage = self.check_usage(entries);
        let spot_checks = self.spot_check(entries);

        let report = VerificationReport {
            root_set,
            usage,
            spot_checks,
            root_folders: root_folder_totals(entries),
            depth_breakdown: DepthBreakdown::from_entries(entries),
            api_calls: self.retry.calls(),
        };
        info!(
            passed = report.passed(),
            api_calls = report.api_calls,
            "Verification finished"
        );
        report
    }

    /// Compare the live root folders with depth-1 folders in the inventory.
    pub fn check_root_set(&mut self, entries: &[Entry]) -> RootSetCheck {
        let inventory: BTreeMap<String, &str> = entries
            .iter()
            .filter(|e| e.is_folder() && e.depth == 1)
            .map(|e| (self.key(&e.path), e.path.as_str()))
            .collect();

        let children = match self.list_children("") {
            Ok(children) => children,
            Err(err) => {
                warn!(error = %err, "Root set check could not list the root");
                return RootSetCheck {
                    status: CheckStatus::Error(err.to_string()),
                    missing_from_inventory: Vec::new(),
                    possibly_deleted: Vec::new(),
                    live_folders: 0,
                    live_files: 0,
                    inventory_folders: inventory.len(),
                };
            }
        };

        let live_files = children.iter().filter(|c| c.is_file()).count();
        let live: BTreeMap<String, String> = children
            .iter()
            .filter(|c| c.is_folder())
            .map(|c| (self.key(c.display_path()), c.display_path().to_string()))
            .collect();

        let missing_from_inventory: Vec<String> = live
            .iter()
            .filter(|(key, _)| !inventory.contains_key(*key))
            .map(|(_, path)| path.clone())
            .collect();
        let possibly_deleted: Vec<String> = inventory
            .iter()
            .filter(|(key, _)| !live.contains_key(*key))
            .map(|(_, path)| path.to_string())
            .collect();

        for path in &missing_from_inventory {
            warn!(path = %path, "Root folder missing from inventory");
        }
        for path in &possibly_deleted {
            info!(path = %path, "Root folder no longer listed, possibly deleted since the scan");
        }

        RootSetCheck {
            status: if missing_from_inventory.is_empty() {
                CheckStatus::Passed
            } else {
                CheckStatus::Failed
            },
            missing_from_inventory,
            possibly_deleted,
            live_folders: live.len(),
            live_files,
            inventory_folders: inventory.len(),
        }
    }

    /// Compare account usage with the inventory's total file size.
    ///
    /// Zero usage passes only if the inventory is empty as well.
    pub fn check_usage(&mut self, entries: &[Entry]) -> UsageCheck {
        let inventory_bytes: u64 = entries.iter().filter(|e| e.is_file()).map(|e| e.size_bytes).sum();
        let tolerance = self.config.usage_tolerance;

        let remote = &self.remote;
        let used = match self.retry.execute("get_usage", || remote.get_usage()) {
            Ok(used) => used,
            Err(err) => {
                warn!(error = %err, "Usage check could not fetch usage");
                return UsageCheck {
                    status: CheckStatus::Error(err.to_string()),
                    used_bytes: None,
                    inventory_bytes,
                    difference_bytes: None,
                    relative_difference: None,
                    tolerance,
                };
            }
        };

        let difference = i128::from(used) - i128::from(inventory_bytes);
        let difference_bytes = i64::try_from(difference).unwrap_or(if difference < 0 {
            i64::MIN
        } else {
            i64::MAX
        });
        let relative_difference =
            (used > 0).then(|| difference.unsigned_abs() as f64 / used as f64);

        let passed = match relative_difference {
            Some(relative) => relative < tolerance,
            None => inventory_bytes == 0,
        };

        UsageCheck {
            status: if passed {
                CheckStatus::Passed
            } else {
                CheckStatus::Failed
            },
            used_bytes: Some(used),
            inventory_bytes,
            difference_bytes: Some(difference_bytes),
            relative_difference,
            tolerance,
        }
    }

    /// Compare child counts of the first few folders at the configured depth.
    pub fn spot_check(&mut self, entries: &[Entry]) -> Vec<SpotCheck> {
        let folders: Vec<&Entry> = entries
            .iter()
            .filter(|e| e.is_folder() && e.depth == self.config.spot_check_depth)
            .take(self.config.spot_check_count)
            .collect();

        folders
            .into_iter()
            .map(|folder| {
                let folder_key = self.key(&folder.path);
                let inventory_count = entries
                    .iter()
                    .filter(|e| self.key(&e.parent_path) == folder_key)
                    .count();

                match self.list_children(&folder.path) {
                    Ok(children) => {
                        let live_count = children.len();
                        let status = if live_count == inventory_count {
                            CheckStatus::Passed
                        } else {
                            warn!(
                                path = %folder.path,
                                live = live_count,
                                inventory = inventory_count,
                                "Spot check mismatch"
                            );
                            CheckStatus::Failed
                        };
                        SpotCheck {
                            status,
                            path: folder.path.clone(),
                            live_count: Some(live_count),
                            inventory_count,
                        }
                    }
                    Err(err) => {
                        warn!(path = %folder.path, error = %err, "Spot check could not list folder");
                        SpotCheck {
                            status: CheckStatus::Error(err.to_string()),
                            path: folder.path.clone(),
                            live_count: None,
                            inventory_count,
                        }
                    }
                }
            })
            .collect()
    }

    /// All live children of a folder, following continuation cursors.
    fn list_children(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RetryError> {
        let remote = &self.remote;
        let mut page = self
            .retry
            .execute("list_shallow", || remote.list_shallow(path))?;
        let mut children = std::mem::take(&mut page.entries);

        while page.has_more {
            let Some(cursor) = page.cursor.take() else {
                break;
            };
            page = self
                .retry
                .execute("list_continue", || remote.list_continue(&cursor))?;
            children.append(&mut page.entries);
        }

        children.retain(|c| c.is_file() || c.is_folder());
        Ok(children)
    }

    fn key(&self, path: &str) -> String {
        if self.config.case_insensitive {
            path.to_lowercase()
        } else {
            path.to_string()
        }
    }
}
