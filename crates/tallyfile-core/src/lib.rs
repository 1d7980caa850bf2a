//! Core types and traits for tallyfile.
//!
//! This crate provides the fundamental data structures used throughout
//! the tallyfile workspace: inventory entries, listing wire types,
//! checkpoints, summaries, and configuration.

mod checkpoint;
mod config;
mod entry;
mod error;
mod summary;
mod wire;

pub use checkpoint::Checkpoint;
pub use config::{
    DEFAULT_OUTPUT_DIR, EnumerateConfig, EnumerateConfigBuilder, RetryConfig, RetryConfigBuilder,
    VerifyConfig, VerifyConfigBuilder,
};
pub use entry::{Entry, EntryKind, NO_EXTENSION, extension_of, split_path};
pub use error::{EntryWarning, FailureClass, RemoteError, WarningKind};
pub use summary::{Aggregate, InventoryArtifact, InventorySnapshot, RunStatus, Summary};
pub use wire::{Cursor, ListPage, RemoteEntry};
