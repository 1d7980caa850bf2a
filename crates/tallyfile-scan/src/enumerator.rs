//! Resumable paginated enumeration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use strum::Display;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use tallyfile_core::{
    Checkpoint, EnumerateConfig, Entry, EntryWarning, ListPage, RunStatus, Summary,
};
use tallyfile_remote::{RemoteListing, RetryError, RetryPolicy, Sleeper, ThreadSleeper};
use tallyfile_store::{
    CheckpointError, CheckpointManager, CheckpointOrigin, DedupStore, InsertOutcome, Resume,
};

use crate::progress::{EnumerateProgress, ProgressTracker};

/// Lifecycle of an enumeration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EnumerationState {
    /// Nothing listed yet.
    Unstarted,
    /// Requesting the first page of the recursive root listing.
    ListingRoot,
    /// Following continuation cursors.
    Paginating,
    /// Persisting progress.
    Saving,
    /// The listing reported its end and the final save succeeded.
    Complete,
    /// Stopped on request; progress was saved and can be resumed.
    Interrupted,
    /// Stopped by an error.
    Failed,
}

impl EnumerationState {
    /// Check if no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Interrupted | Self::Failed)
    }
}

/// Cooperative cancellation signal, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors that end an enumeration run.
#[derive(Debug, Error)]
pub enum EnumerateError {
    /// A listing call failed permanently or ran out of retries.
    #[error("{source}")]
    Remote {
        #[source]
        source: RetryError,
        /// Whether progress up to the failure was persisted.
        checkpoint_saved: bool,
    },

    /// The listing said more pages exist but gave no cursor to fetch them.
    #[error("Listing reported more pages without a cursor")]
    MissingCursor {
        /// Whether progress up to the failure was persisted.
        checkpoint_saved: bool,
    },

    /// Saved state could not be loaded or written.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Summary of the inventory as last saved.
    pub summary: Summary,
    /// Pages received in this run.
    pub pages: u64,
    /// Where the run resumed from, if it did.
    pub resumed_from: Option<CheckpointOrigin>,
    /// Records skipped during this run.
    pub warnings: Vec<EntryWarning>,
    /// Silent duplicates dropped.
    pub duplicates: u64,
    /// Path collisions dropped.
    pub collisions: usize,
    /// Wall time of this run.
    pub elapsed: Duration,
}

/// How a run ended without error.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The whole tree was listed; the checkpoint is gone.
    Completed(RunReport),
    /// Cancelled; the checkpoint holds the position to resume from.
    Interrupted(RunReport),
}

impl RunOutcome {
    /// The run's report.
    pub fn report(&self) -> &RunReport {
        match self {
            Self::Completed(report) | Self::Interrupted(report) => report,
        }
    }

    /// Check if the run finished the listing.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Drives a [`RemoteListing`] through a full recursive listing, persisting
/// progress so an interrupted run can pick up where it stopped.
pub struct Enumerator<R, S = ThreadSleeper> {
    remote: R,
    config: EnumerateConfig,
    manager: CheckpointManager,
    retry: RetryPolicy<S>,
    store: DedupStore,
    checkpoint: Checkpoint,
    state: EnumerationState,
    cancel: CancelFlag,
    progress_tx: broadcast::Sender<EnumerateProgress>,
    tracker: ProgressTracker,
    warnings: Vec<EntryWarning>,
    resumed_from: Option<CheckpointOrigin>,
    prior_calls: u64,
    last_save: Instant,
    entries_since_save: u64,
}

impl<R: RemoteListing> Enumerator<R, ThreadSleeper> {
    /// Create an enumerator that sleeps for real between retries.
    pub fn new(remote: R, config: EnumerateConfig) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self::with_retry_policy(remote, config, retry)
    }
}

impl<R: RemoteListing, S: Sleeper> Enumerator<R, S> {
    /// Create an enumerator with a custom retry policy.
    pub fn with_retry_policy(remote: R, config: EnumerateConfig, retry: RetryPolicy<S>) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            manager: CheckpointManager::from_config(&config),
            remote,
            config,
            retry,
            store: DedupStore::new(),
            checkpoint: Checkpoint::unstarted(),
            state: EnumerationState::Unstarted,
            cancel: CancelFlag::new(),
            progress_tx,
            tracker: ProgressTracker::new(),
            warnings: Vec::new(),
            resumed_from: None,
            prior_calls: 0,
            last_save: Instant::now(),
            entries_since_save: 0,
        }
    }

    /// Use an existing cancel flag, e.g. one shared with a signal handler.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that stops the run after the current page.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<EnumerateProgress> {
        self.progress_tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> EnumerationState {
        self.state
    }

    /// Entries collected so far.
    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// In-memory checkpoint.
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Checkpoint manager in use.
    pub fn manager(&self) -> &CheckpointManager {
        &self.manager
    }

    /// Remote calls made, across resumed runs.
    pub fn api_calls(&self) -> u64 {
        self.prior_calls + self.retry.calls()
    }

    /// Run until the listing ends, the cancel flag is set, or a fatal error.
    pub fn run(&mut self) -> Result<RunOutcome, EnumerateError> {
        self.last_save = Instant::now();
        let mut next = match self.manager.load()? {
            Some(resume) => self.adopt(resume),
            None => EnumerationState::ListingRoot,
        };

        loop {
            self.transition(next);
            next = match self.state {
                EnumerationState::ListingRoot | EnumerationState::Paginating
                    if self.cancel.is_cancelled() =>
                {
                    EnumerationState::Interrupted
                }
                EnumerationState::ListingRoot => self.fetch_root()?,
                EnumerationState::Paginating => self.fetch_next()?,
                EnumerationState::Complete => return self.finish().map(RunOutcome::Completed),
                EnumerationState::Interrupted => {
                    self.save(RunStatus::InProgress)?;
                    info!(
                        entries = self.store.len(),
                        api_calls = self.api_calls(),
                        "Progress saved, resume by running again"
                    );
                    return Ok(RunOutcome::Interrupted(self.report(RunStatus::InProgress)));
                }
                EnumerationState::Unstarted
                | EnumerationState::Saving
                | EnumerationState::Failed => EnumerationState::ListingRoot,
            };
        }
    }

    /// Take over state from a previous run and decide where to continue.
    fn adopt(&mut self, resume: Resume) -> EnumerationState {
        let Resume {
            checkpoint,
            entries,
            origin,
        } = resume;

        let next = if checkpoint.can_continue() {
            EnumerationState::Paginating
        } else if checkpoint.is_finished() && !entries.is_empty() {
            EnumerationState::Complete
        } else {
            info!("Checkpoint holds no position to continue from, starting over");
            return EnumerationState::ListingRoot;
        };

        self.store = DedupStore::from_entries(entries);
        self.tracker.seed(&self.store.aggregate());
        self.prior_calls = checkpoint.api_call_count;
        self.checkpoint = checkpoint;
        info!(
            entries = self.store.len(),
            api_calls = self.prior_calls,
            origin = ?origin,
            "Resuming from checkpoint"
        );
        self.resumed_from = Some(origin);
        next
    }

    fn fetch_root(&mut self) -> Result<EnumerationState, EnumerateError> {
        let limit = self.config.page_limit;
        let remote = &self.remote;
        let result = self
            .retry
            .execute("list_root", || remote.list_root(true, limit));
        self.handle(result)
    }

    fn fetch_next(&mut self) -> Result<EnumerationState, EnumerateError> {
        let Some(cursor) = self.checkpoint.cursor.clone() else {
            return Err(self.fail_missing_cursor());
        };
        let remote = &self.remote;
        let result = self
            .retry
            .execute("list_continue", || remote.list_continue(&cursor));
        self.handle(result)
    }

    fn handle(
        &mut self,
        result: Result<ListPage, RetryError>,
    ) -> Result<EnumerationState, EnumerateError> {
        let page = match result {
            Ok(page) => page,
            Err(err) => return Err(self.fail(err)),
        };

        if page.has_more && page.cursor.is_none() {
            return Err(self.fail_missing_cursor());
        }

        self.absorb(page);
        if self.checkpoint.is_finished() {
            return Ok(EnumerationState::Complete);
        }

        if self.should_save() {
            self.transition(EnumerationState::Saving);
            self.save(RunStatus::InProgress)?;
        }
        Ok(EnumerationState::Paginating)
    }

    /// Fold a page into the store and the in-memory checkpoint.
    fn absorb(&mut self, page: ListPage) {
        self.tracker.start_page();
        for raw in &page.entries {
            match Entry::from_remote(raw) {
                Ok(Some(entry)) => {
                    let counted = entry.clone();
                    if self.store.offer(entry) == InsertOutcome::Inserted {
                        self.tracker.record_entry(&counted);
                        self.entries_since_save += 1;
                    }
                }
                Ok(None) => {}
                Err(warning) => {
                    warn!(path = %warning.path, kind = ?warning.kind, "{}", warning.message);
                    self.tracker.record_warning();
                    self.warnings.push(warning);
                }
            }
        }

        self.checkpoint.has_more = page.has_more;
        self.checkpoint.cursor = if page.has_more { page.cursor } else { None };
        self.checkpoint.entry_count = self.store.len() as u64;
        self.checkpoint.api_call_count = self.api_calls();

        let progress = self.tracker.snapshot(self.state, self.api_calls());
        debug!(
            page = progress.pages,
            new_entries = progress.new_entries,
            entries = progress.entries_total,
            has_more = page.has_more,
            "Page received"
        );
        let _ = self.progress_tx.send(progress);
    }

    fn should_save(&self) -> bool {
        let every = self.config.save_every_entries;
        self.last_save.elapsed() >= self.config.save_interval()
            || (every > 0 && self.entries_since_save >= every)
    }

    fn save(&mut self, status: RunStatus) -> Result<(), CheckpointError> {
        self.checkpoint.api_call_count = self.api_calls();
        let snapshot = self.store.snapshot(status, self.checkpoint.api_call_count);
        self.checkpoint = self.manager.save(&self.checkpoint, &snapshot)?;
        self.last_save = Instant::now();
        self.entries_since_save = 0;
        info!(
            entries = self.checkpoint.entry_count,
            size_bytes = snapshot.summary.total_size_bytes,
            status = %status,
            "Saved progress"
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<RunReport, EnumerateError> {
        self.checkpoint.cursor = None;
        self.checkpoint.has_more = false;
        self.save(RunStatus::Complete)?;
        self.manager.clear()?;

        let report = self.report(RunStatus::Complete);
        info!(
            entries = report.summary.total_entries,
            files = report.summary.total_files,
            folders = report.summary.total_folders,
            api_calls = report.summary.api_calls_made,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Inventory complete"
        );
        Ok(report)
    }

    /// Persist what we have after a fatal remote error.
    fn fail(&mut self, err: RetryError) -> EnumerateError {
        let checkpoint_saved = self.save_after_failure();
        error!(error = %err, checkpoint_saved, "Enumeration failed");
        EnumerateError::Remote {
            source: err,
            checkpoint_saved,
        }
    }

    /// The page that lacked a cursor is not absorbed; the saved position is
    /// the last one that can be continued from.
    fn fail_missing_cursor(&mut self) -> EnumerateError {
        let checkpoint_saved = self.save_after_failure();
        error!(checkpoint_saved, "Listing reported more pages without a cursor");
        EnumerateError::MissingCursor { checkpoint_saved }
    }

    fn save_after_failure(&mut self) -> bool {
        self.transition(EnumerationState::Failed);
        match self.save(RunStatus::InProgress) {
            Ok(()) => true,
            Err(save_err) => {
                error!(error = %save_err, "Could not save progress after failure");
                false
            }
        }
    }

    fn transition(&mut self, next: EnumerationState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "State change");
            self.state = next;
        }
    }

    fn report(&self, status: RunStatus) -> RunReport {
        RunReport {
            summary: Summary::new(self.store.aggregate(), status, self.api_calls()),
            pages: self.tracker.pages(),
            resumed_from: self.resumed_from.clone(),
            warnings: self.warnings.clone(),
            duplicates: self.store.duplicates(),
            collisions: self.store.collisions().len(),
            elapsed: self.tracker.elapsed(),
        }
    }
}
