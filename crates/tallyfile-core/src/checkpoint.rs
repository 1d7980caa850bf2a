//! Enumeration progress snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::Cursor;

/// Durable enumeration progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Continuation token; `None` means listing has not started or has ended.
    pub cursor: Option<Cursor>,

    /// False only once the API asserted that no further pages exist.
    pub has_more: bool,

    /// Entries in the inventory at save time.
    pub entry_count: u64,

    /// Remote calls made so far, across resumed runs.
    pub api_call_count: u64,

    /// When this checkpoint was last written.
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Progress before the first page was listed.
    pub fn unstarted() -> Self {
        Self {
            cursor: None,
            has_more: true,
            entry_count: 0,
            api_call_count: 0,
            saved_at: Utc::now(),
        }
    }

    /// A cursor with `has_more == false` cannot be resumed from and must
    /// never be persisted.
    pub fn is_contradictory(&self) -> bool {
        self.cursor.is_some() && !self.has_more
    }

    /// Whether pagination can continue from this checkpoint.
    pub fn can_continue(&self) -> bool {
        self.cursor.is_some() && self.has_more
    }

    /// Whether the API already reported the end of the listing.
    pub fn is_finished(&self) -> bool {
        !self.has_more
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::unstarted()
    }
}
