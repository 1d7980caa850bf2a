//! Checkpoint persistence and legacy migration.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use tallyfile_core::{Checkpoint, EnumerateConfig, Entry, InventorySnapshot, RunStatus};

use crate::artifact::{self, write_csv, write_json_atomic};
use crate::dedup::DedupStore;
use crate::error::CheckpointError;
use crate::schema::{CheckpointFile, CheckpointSchema, LegacyCheckpoint, LegacyInventory};

/// Checkpoint file name, in both the current and the legacy directory.
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Inventory artifact file name.
pub const INVENTORY_JSON: &str = "inventory.json";

/// Flat CSV projection file name.
pub const INVENTORY_CSV: &str = "inventory.csv";

/// Appended to a legacy checkpoint once it has been consumed.
pub const MIGRATED_SUFFIX: &str = ".migrated";

/// Where a loaded checkpoint came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOrigin {
    /// Written by this release.
    Current,
    /// Converted from a legacy checkpoint at `from`.
    MigratedLegacy { from: PathBuf },
}

/// State recovered from disk.
#[derive(Debug, Clone)]
pub struct Resume {
    /// Validated checkpoint.
    pub checkpoint: Checkpoint,
    /// Entries persisted alongside it.
    pub entries: Vec<Entry>,
    /// Schema the checkpoint was read from.
    pub origin: CheckpointOrigin,
}

/// Loads and saves enumeration state under an output directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    output_dir: PathBuf,
    legacy_dir: Option<PathBuf>,
}

impl CheckpointManager {
    /// Create a manager for `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            legacy_dir: None,
        }
    }

    /// Also look for a legacy checkpoint in `dir`.
    pub fn with_legacy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.legacy_dir = Some(dir.into());
        self
    }

    /// Create a manager from run configuration.
    pub fn from_config(config: &EnumerateConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            legacy_dir: config.legacy_dir.clone(),
        }
    }

    /// Directory holding the artifacts.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the current checkpoint.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(CHECKPOINT_FILE)
    }

    /// Path of the inventory artifact.
    pub fn inventory_path(&self) -> PathBuf {
        self.output_dir.join(INVENTORY_JSON)
    }

    /// Path of the CSV projection.
    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(INVENTORY_CSV)
    }

    fn legacy_checkpoint_path(&self) -> Option<PathBuf> {
        self.legacy_dir.as_ref().map(|dir| dir.join(CHECKPOINT_FILE))
    }

    /// Whether any checkpoint, current or legacy, is waiting to be resumed.
    pub fn exists(&self) -> bool {
        self.checkpoint_path().is_file()
            || self
                .legacy_checkpoint_path()
                .is_some_and(|path| path.is_file())
    }

    /// Load saved state, migrating a legacy checkpoint if that is all there is.
    ///
    /// Returns `Ok(None)` when there is nothing to resume.
    pub fn load(&self) -> Result<Option<Resume>, CheckpointError> {
        let current = self.checkpoint_path();
        if current.is_file() {
            return match read_schema(&current)? {
                CheckpointSchema::V2(file) => self.load_current(&current, file).map(Some),
                CheckpointSchema::V1(legacy) => {
                    self.migrate(&current, &self.output_dir, legacy).map(Some)
                }
            };
        }

        let Some(legacy_path) = self.legacy_checkpoint_path().filter(|p| p.is_file()) else {
            return Ok(None);
        };
        let Some(legacy_dir) = self.legacy_dir.as_deref() else {
            return Ok(None);
        };
        match read_schema(&legacy_path)? {
            CheckpointSchema::V1(legacy) => self.migrate(&legacy_path, legacy_dir, legacy).map(Some),
            CheckpointSchema::V2(_) => Err(CheckpointError::Corrupt {
                path: legacy_path,
                message: "legacy directory holds a current-format checkpoint".to_string(),
            }),
        }
    }

    fn load_current(&self, path: &Path, file: CheckpointFile) -> Result<Resume, CheckpointError> {
        let checkpoint = file.checkpoint;
        if checkpoint.is_contradictory() {
            return Err(CheckpointError::Contradictory {
                path: path.to_path_buf(),
            });
        }

        let entries = if checkpoint.entry_count > 0 {
            let inventory_path = self.inventory_path();
            let artifact = artifact::read_inventory(&inventory_path)?;
            let found = artifact.entries.len() as u64;
            if found < checkpoint.entry_count {
                return Err(CheckpointError::InventoryBehind {
                    path: inventory_path,
                    expected: checkpoint.entry_count,
                    found,
                });
            }
            artifact.entries
        } else {
            Vec::new()
        };

        info!(
            entries = entries.len(),
            api_calls = checkpoint.api_call_count,
            has_more = checkpoint.has_more,
            "Loaded checkpoint"
        );
        Ok(Resume {
            checkpoint,
            entries,
            origin: CheckpointOrigin::Current,
        })
    }

    /// Convert a legacy checkpoint and its inventory, persist the result in
    /// the current format, and set the legacy checkpoint aside.
    fn migrate(
        &self,
        checkpoint_path: &Path,
        legacy_dir: &Path,
        legacy: LegacyCheckpoint,
    ) -> Result<Resume, CheckpointError> {
        let inventory_path = legacy_dir.join(INVENTORY_JSON);
        let unreadable = |message: String| CheckpointError::LegacyDataUnreadable {
            checkpoint: checkpoint_path.to_path_buf(),
            inventory: inventory_path.clone(),
            message,
        };

        let legacy_entries = match fs::read_to_string(&inventory_path) {
            Ok(raw) => serde_json::from_str::<LegacyInventory>(&raw)
                .map_err(|e| unreadable(e.to_string()))?
                .entries,
            Err(e) if e.kind() == ErrorKind::NotFound && legacy.entries_count == 0 => Vec::new(),
            Err(e) => return Err(unreadable(e.to_string())),
        };

        // The old tool counted raw records, re-listed pages included.
        let mut checkpoint = CheckpointSchema::V1(legacy).migrate();
        let listed = legacy_entries.len() as u64;
        if listed < checkpoint.entry_count {
            return Err(CheckpointError::InventoryBehind {
                path: inventory_path,
                expected: checkpoint.entry_count,
                found: listed,
            });
        }

        let mut store = DedupStore::new();
        for legacy_entry in legacy_entries {
            store.insert(legacy_entry.into_entry().map_err(&unreadable)?);
        }
        let found = store.len() as u64;
        checkpoint.entry_count = found;

        let status = if checkpoint.has_more {
            RunStatus::InProgress
        } else {
            RunStatus::Complete
        };
        let checkpoint = self.save(&checkpoint, &store.snapshot(status, checkpoint.api_call_count))?;

        // Saving into the same directory already replaced the legacy file.
        if checkpoint_path != self.checkpoint_path() {
            let mut consumed = checkpoint_path.as_os_str().to_owned();
            consumed.push(MIGRATED_SUFFIX);
            fs::rename(checkpoint_path, &consumed)
                .map_err(|e| CheckpointError::io(checkpoint_path, e))?;
        }

        info!(
            from = %checkpoint_path.display(),
            entries = found,
            api_calls = checkpoint.api_call_count,
            "Migrated legacy checkpoint"
        );
        Ok(Resume {
            checkpoint,
            entries: store.into_entries(),
            origin: CheckpointOrigin::MigratedLegacy {
                from: checkpoint_path.to_path_buf(),
            },
        })
    }

    /// Persist the inventory, its CSV projection, and then the checkpoint.
    ///
    /// The checkpoint is written last so it never refers to data that is not
    /// on disk yet. Returns the checkpoint as written.
    pub fn save(
        &self,
        checkpoint: &Checkpoint,
        snapshot: &InventorySnapshot<'_>,
    ) -> Result<Checkpoint, CheckpointError> {
        let path = self.checkpoint_path();
        if checkpoint.is_contradictory() {
            return Err(CheckpointError::Contradictory { path });
        }

        fs::create_dir_all(&self.output_dir)
            .map_err(|e| CheckpointError::io(&self.output_dir, e))?;

        write_json_atomic(&self.inventory_path(), "inventory", snapshot)?;
        write_csv(&self.csv_path(), snapshot.entries.iter().copied())?;

        let written = Checkpoint {
            entry_count: snapshot.entries.len() as u64,
            saved_at: Utc::now(),
            ..checkpoint.clone()
        };
        write_json_atomic(&path, "checkpoint", &CheckpointFile::new(written.clone()))?;

        debug!(
            entries = written.entry_count,
            api_calls = written.api_call_count,
            has_more = written.has_more,
            "Checkpoint saved"
        );
        Ok(written)
    }

    /// Remove the checkpoint. The inventory artifacts stay.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        let path = self.checkpoint_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::io(path, e)),
        }
    }

    /// Forget all saved progress before a fresh run: the current checkpoint
    /// is removed and any legacy checkpoint is set aside unread.
    pub fn reset(&self) -> Result<(), CheckpointError> {
        self.clear()?;
        if let Some(legacy) = self.legacy_checkpoint_path().filter(|p| p.is_file()) {
            let mut consumed = legacy.as_os_str().to_owned();
            consumed.push(MIGRATED_SUFFIX);
            fs::rename(&legacy, &consumed).map_err(|e| CheckpointError::io(&legacy, e))?;
            warn!(path = %legacy.display(), "Legacy checkpoint set aside for fresh run");
        }
        Ok(())
    }

    /// Read the inventory artifact in the output directory.
    pub fn read_inventory(&self) -> Result<tallyfile_core::InventoryArtifact, CheckpointError> {
        artifact::read_inventory(&self.inventory_path())
    }
}

fn read_schema(path: &Path) -> Result<CheckpointSchema, CheckpointError> {
    let raw = fs::read_to_string(path).map_err(|e| CheckpointError::io(path, e))?;
    CheckpointSchema::parse(&raw).map_err(|message| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        message,
    })
}
