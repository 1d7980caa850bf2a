//! Inventory storage for tallyfile.
//!
//! [`DedupStore`] holds entries keyed by path in first-seen order.
//! [`CheckpointManager`] persists the store and the enumeration progress
//! with write-to-temp-then-rename, and migrates checkpoints written by the
//! legacy tool.

mod artifact;
mod checkpoint;
mod dedup;
mod error;
mod schema;

pub use artifact::{CSV_COLUMNS, read_inventory, write_csv, write_json_atomic};
pub use checkpoint::{
    CHECKPOINT_FILE, CheckpointManager, CheckpointOrigin, INVENTORY_CSV, INVENTORY_JSON,
    MIGRATED_SUFFIX, Resume,
};
pub use dedup::{Collision, DedupStore, InsertOutcome};
pub use error::CheckpointError;
pub use schema::{CHECKPOINT_VERSION, CheckpointFile, CheckpointSchema, LegacyCheckpoint, LegacyEntry};
