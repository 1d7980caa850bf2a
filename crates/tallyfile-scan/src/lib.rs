//! Resumable enumeration engine for tallyfile.
//!
//! # Overview
//!
//! `tallyfile-scan` drives a paginated listing API through a full recursive
//! listing of a storage tree. Key features:
//!
//! - **Explicit state machine** ([`EnumerationState`]) from the first root
//!   page to completion
//! - **Crash-safe checkpoints** on a time and entry-count cadence
//! - **Resume** from the saved cursor, skipping the root listing
//! - **Cooperative cancellation** via [`CancelFlag`]
//! - **Progress updates** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use tallyfile_core::EnumerateConfig;
//! use tallyfile_remote::LocalTreeRemote;
//! use tallyfile_scan::Enumerator;
//!
//! let remote = LocalTreeRemote::new("/srv/share");
//! let mut enumerator = Enumerator::new(remote, EnumerateConfig::new("inventory_output"));
//! let outcome = enumerator.run().unwrap();
//!
//! println!("Total entries: {}", outcome.report().summary.total_entries);
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use tallyfile_core::EnumerateConfig;
//! use tallyfile_remote::LocalTreeRemote;
//! use tallyfile_scan::Enumerator;
//!
//! let enumerator = Enumerator::new(LocalTreeRemote::new("/srv"), EnumerateConfig::default());
//! let mut progress_rx = enumerator.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         println!("{} entries after {} pages", progress.entries_total, progress.pages);
//!     }
//! });
//! ```

mod enumerator;
mod progress;

pub use enumerator::{
    CancelFlag, EnumerateError, EnumerationState, Enumerator, RunOutcome, RunReport,
};
pub use progress::EnumerateProgress;

// Re-export core types for convenience
pub use tallyfile_core::{EnumerateConfig, EntryWarning, RunStatus, Summary, WarningKind};
