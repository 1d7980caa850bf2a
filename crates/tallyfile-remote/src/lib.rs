//! Listing API abstraction for tallyfile.
//!
//! - [`RemoteListing`] is the seam every listing source implements.
//! - [`RetryPolicy`] wraps calls with a bounded budget, exponential backoff,
//!   and server-suggested waits for rate limits.
//! - [`LocalTreeRemote`] serves a local directory through the same paginated
//!   contract, walking it with jwalk.
//! - [`ReplayRemote`] replays a recorded session from a JSON script.
//!
//! # Example
//!
//! ```rust,no_run
//! use tallyfile_core::RetryConfig;
//! use tallyfile_remote::{LocalTreeRemote, RemoteListing, RetryPolicy};
//!
//! let remote = LocalTreeRemote::new("/srv/share");
//! let mut retry = RetryPolicy::new(RetryConfig::default());
//! let page = retry.execute("list_root", || remote.list_root(true, 2000)).unwrap();
//! println!("{} entries, more: {}", page.entries.len(), page.has_more);
//! ```

mod local;
mod remote;
mod replay;
mod retry;

pub use local::{LocalTreeRemote, SHALLOW_PAGE_LIMIT};
pub use remote::{RemoteListing, normalize_folder};
pub use replay::{ReplayError, ReplayRemote, ReplayScript};
pub use retry::{RecordingSleeper, RetryError, RetryPolicy, Sleeper, ThreadSleeper};

// Re-export core types for convenience
pub use tallyfile_core::{Cursor, FailureClass, ListPage, RemoteEntry, RemoteError, RetryConfig};
