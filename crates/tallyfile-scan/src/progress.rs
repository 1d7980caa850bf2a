//! Enumeration progress reporting.

use std::time::{Duration, Instant};

use tallyfile_core::{Aggregate, Entry};

use crate::enumerator::EnumerationState;

/// Progress information published after every page.
#[derive(Debug, Clone)]
pub struct EnumerateProgress {
    /// State of the run when this update was taken.
    pub state: EnumerationState,
    /// Pages received in this run.
    pub pages: u64,
    /// Entries in the inventory, including any resumed ones.
    pub entries_total: u64,
    /// Entries the last page added.
    pub new_entries: u64,
    /// Number of files in the inventory.
    pub files: u64,
    /// Number of folders in the inventory.
    pub folders: u64,
    /// Sum of file sizes in the inventory.
    pub bytes: u64,
    /// Remote calls made, across resumed runs.
    pub api_calls: u64,
    /// Records skipped because they could not be converted.
    pub warnings: u64,
    /// Time elapsed since this run started.
    pub elapsed: Duration,
}

impl EnumerateProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            state: EnumerationState::Unstarted,
            pages: 0,
            entries_total: 0,
            new_entries: 0,
            files: 0,
            folders: 0,
            bytes: 0,
            api_calls: 0,
            warnings: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// New entries per second over this run.
    pub fn entries_per_second(&self, resumed_entries: u64) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.entries_total.saturating_sub(resumed_entries) as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Pages per minute over this run.
    pub fn pages_per_minute(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.pages as f64 * 60.0 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for EnumerateProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counters behind [`EnumerateProgress`].
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    pages: u64,
    entries: u64,
    files: u64,
    folders: u64,
    bytes: u64,
    warnings: u64,
    last_page_new: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            pages: 0,
            entries: 0,
            files: 0,
            folders: 0,
            bytes: 0,
            warnings: 0,
            last_page_new: 0,
        }
    }

    /// Seed counters from entries carried over from a previous run.
    pub fn seed(&mut self, aggregate: &Aggregate) {
        self.entries = aggregate.total_entries;
        self.files = aggregate.total_files;
        self.folders = aggregate.total_folders;
        self.bytes = aggregate.total_size_bytes;
    }

    pub fn start_page(&mut self) {
        self.pages += 1;
        self.last_page_new = 0;
    }

    pub fn record_entry(&mut self, entry: &Entry) {
        self.entries += 1;
        self.last_page_new += 1;
        if entry.is_file() {
            self.files += 1;
            self.bytes += entry.size_bytes;
        } else {
            self.folders += 1;
        }
    }

    pub fn record_warning(&mut self) {
        self.warnings += 1;
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self, state: EnumerationState, api_calls: u64) -> EnumerateProgress {
        EnumerateProgress {
            state,
            pages: self.pages,
            entries_total: self.entries,
            new_entries: self.last_page_new,
            files: self.files,
            folders: self.folders,
            bytes: self.bytes,
            api_calls,
            warnings: self.warnings,
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
