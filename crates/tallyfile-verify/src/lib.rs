//! Reconciliation checks for tallyfile.
//!
//! This crate cross-checks a captured inventory against the live source:
//!
//! - **Root set** - every folder at the root of the source is in the inventory
//! - **Usage** - account-level bytes used is close to the inventory total
//! - **Spot checks** - child counts of a few depth-2 folders match
//!
//! It also computes per-root-folder totals and an entries-by-depth
//! breakdown, which need no remote calls.
//!
//! ```rust,no_run
//! use tallyfile_core::VerifyConfig;
//! use tallyfile_remote::LocalTreeRemote;
//! use tallyfile_store::CheckpointManager;
//! use tallyfile_verify::Verifier;
//!
//! let inventory = CheckpointManager::new("inventory_output").read_inventory().unwrap();
//! let mut verifier = Verifier::new(LocalTreeRemote::new("/srv/share"), VerifyConfig::default());
//! let report = verifier.verify(&inventory.entries);
//!
//! for issue in report.issues() {
//!     println!("{issue}");
//! }
//! ```

pub mod breakdown;
mod report;
mod verifier;

pub use breakdown::{DepthBreakdown, DepthStats, RootFolderTotals, root_folder_totals};
pub use report::{CheckStatus, RootSetCheck, SpotCheck, UsageCheck, VerificationReport};
pub use verifier::Verifier;

// Re-export core types
pub use tallyfile_core::{Entry, VerifyConfig};
