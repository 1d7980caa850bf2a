//! Path-keyed entry store.

use indexmap::IndexMap;
use tracing::warn;

use tallyfile_core::{Aggregate, Entry, InventorySnapshot, RunStatus};

/// Result of offering an entry to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First time this path was seen.
    Inserted,
    /// Same path and identifier as an existing entry, e.g. a page replayed
    /// after a resume.
    Duplicate,
    /// Same path, different identifier. The existing entry is kept.
    Collision,
}

/// A rejected entry whose path was already taken by a different object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    /// Path both entries claimed.
    pub path: String,
    /// Identifier of the entry that was kept.
    pub kept: Option<String>,
    /// Identifier of the entry that was dropped.
    pub rejected: Option<String>,
}

/// Inventory entries keyed by path, in first-seen order.
///
/// Inserting a path that is already present never replaces the stored entry.
#[derive(Debug, Default)]
pub struct DedupStore {
    entries: IndexMap<String, Entry>,
    duplicates: u64,
    collisions: Vec<Collision>,
}

impl DedupStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted entries.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            store.insert(entry);
        }
        store
    }

    /// Insert an entry. Returns `true` if the path was new.
    pub fn insert(&mut self, entry: Entry) -> bool {
        self.offer(entry) == InsertOutcome::Inserted
    }

    /// Insert an entry and report how it was handled.
    pub fn offer(&mut self, entry: Entry) -> InsertOutcome {
        let Some(existing) = self.entries.get(&entry.path) else {
            self.entries.insert(entry.path.clone(), entry);
            return InsertOutcome::Inserted;
        };

        if existing.remote_id == entry.remote_id {
            self.duplicates += 1;
            return InsertOutcome::Duplicate;
        }

        warn!(
            path = %entry.path,
            kept = ?existing.remote_id,
            rejected = ?entry.remote_id,
            "Path collision, keeping first entry"
        );
        self.collisions.push(Collision {
            path: entry.path,
            kept: existing.remote_id.clone(),
            rejected: entry.remote_id,
        });
        InsertOutcome::Collision
    }

    /// Check whether a path is present.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Look up an entry by path.
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Totals over the current entries, recomputed on every call.
    pub fn aggregate(&self) -> Aggregate {
        Aggregate::from_entries(self.entries.values())
    }

    /// Snapshot for persisting.
    pub fn snapshot(&self, status: RunStatus, api_calls_made: u64) -> InventorySnapshot<'_> {
        InventorySnapshot::new(self.entries.values().collect(), status, api_calls_made)
    }

    /// Silent duplicates seen so far.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Collisions seen so far.
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Consume the store, yielding entries in insertion order.
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries.into_values().collect()
    }
}
