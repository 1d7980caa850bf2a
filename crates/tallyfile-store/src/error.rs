//! Checkpoint and artifact errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading or persisting enumeration state.
///
/// Every corruption kind is distinct so the operator can decide whether to
/// start over; none of them is ever silently discarded.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The checkpoint file exists but cannot be understood.
    #[error("Corrupt checkpoint {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// The checkpoint holds a cursor but says the listing has ended.
    #[error("Contradictory checkpoint {path}: cursor present with hasMore=false")]
    Contradictory { path: PathBuf },

    /// A legacy checkpoint was found but its inventory cannot be read.
    #[error("Legacy checkpoint {checkpoint} has unreadable inventory {inventory}: {message}")]
    LegacyDataUnreadable {
        checkpoint: PathBuf,
        inventory: PathBuf,
        message: String,
    },

    /// The inventory referenced by a checkpoint cannot be read.
    #[error("Unreadable inventory {path}: {message}")]
    InventoryUnreadable { path: PathBuf, message: String },

    /// The inventory holds fewer entries than the checkpoint claims.
    #[error("Inventory {path} is behind its checkpoint: expected {expected} entries, found {found}")]
    InventoryBehind {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    /// Writing the CSV projection failed.
    #[error("Failed to write CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Serializing state failed.
    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl CheckpointError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means persisted state is unusable, as opposed to
    /// the filesystem failing underneath us.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. }
                | Self::Contradictory { .. }
                | Self::LegacyDataUnreadable { .. }
                | Self::InventoryUnreadable { .. }
                | Self::InventoryBehind { .. }
        )
    }
}
