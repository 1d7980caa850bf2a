use std::cell::{Cell, RefCell};
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use tallyfile_core::{
    Cursor, EnumerateConfig, ListPage, RemoteEntry, RemoteError, RetryConfig, RunStatus,
};
use tallyfile_remote::{RecordingSleeper, RemoteListing, ReplayRemote, RetryError, RetryPolicy};
use tallyfile_scan::{CancelFlag, EnumerateError, EnumerationState, Enumerator, RunOutcome};
use tallyfile_store::CheckpointManager;

fn config(temp: &TempDir) -> EnumerateConfig {
    EnumerateConfig::builder()
        .output_dir(temp.path().join("out"))
        .save_interval_secs(3600u64)
        .save_every_entries(1000u64)
        .build()
        .unwrap()
}

fn enumerator<R: RemoteListing>(
    remote: R,
    config: EnumerateConfig,
) -> Enumerator<R, RecordingSleeper> {
    let retry = RetryPolicy::with_sleeper(RetryConfig::default(), RecordingSleeper::new());
    Enumerator::with_retry_policy(remote, config, retry)
}

fn two_page_remote() -> ReplayRemote {
    ReplayRemote::from_pages(vec![
        ListPage::more(
            vec![RemoteEntry::folder("/A"), RemoteEntry::file("/A/f.txt", 1024)],
            Cursor::new("c1"),
        ),
        ListPage::last(vec![RemoteEntry::file("/B.txt", 2048)]),
    ])
    .with_usage(3072)
}

fn five_page_remote() -> ReplayRemote {
    ReplayRemote::from_pages(vec![
        ListPage::more(vec![RemoteEntry::folder("/A")], Cursor::new("c1")),
        ListPage::more(vec![RemoteEntry::file("/A/1.txt", 1)], Cursor::new("c2")),
        ListPage::more(vec![RemoteEntry::folder("/B")], Cursor::new("c3")),
        ListPage::more(vec![RemoteEntry::file("/B/2.log", 20)], Cursor::new("c4")),
        ListPage::last(vec![RemoteEntry::file("/C.bin", 300)]),
    ])
}

/// Sets a cancel flag once a number of continuation pages were served.
struct CancelAfter<'a> {
    inner: &'a ReplayRemote,
    flag: CancelFlag,
    after: usize,
    served: Cell<usize>,
}

impl RemoteListing for CancelAfter<'_> {
    fn list_root(&self, recursive: bool, page_limit: u32) -> Result<ListPage, RemoteError> {
        self.inner.list_root(recursive, page_limit)
    }

    fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError> {
        self.served.set(self.served.get() + 1);
        if self.served.get() >= self.after {
            self.flag.cancel();
        }
        self.inner.list_continue(cursor)
    }

    fn list_shallow(&self, path: &str) -> Result<ListPage, RemoteError> {
        self.inner.list_shallow(path)
    }

    fn get_usage(&self) -> Result<u64, RemoteError> {
        self.inner.get_usage()
    }
}

/// Records whether a checkpoint existed at the time of every call.
struct CheckpointProbe<'a> {
    inner: &'a ReplayRemote,
    checkpoint: PathBuf,
    seen: RefCell<Vec<bool>>,
}

impl CheckpointProbe<'_> {
    fn probe(&self) {
        self.seen.borrow_mut().push(self.checkpoint.exists());
    }
}

impl RemoteListing for CheckpointProbe<'_> {
    fn list_root(&self, recursive: bool, page_limit: u32) -> Result<ListPage, RemoteError> {
        self.probe();
        self.inner.list_root(recursive, page_limit)
    }

    fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError> {
        self.probe();
        self.inner.list_continue(cursor)
    }

    fn list_shallow(&self, path: &str) -> Result<ListPage, RemoteError> {
        self.inner.list_shallow(path)
    }

    fn get_usage(&self) -> Result<u64, RemoteError> {
        self.inner.get_usage()
    }
}

#[test]
fn test_end_to_end_two_pages() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let manager = CheckpointManager::from_config(&config);
    let remote = two_page_remote();

    let mut enumerator = enumerator(&remote, config);
    let outcome = enumerator.run().unwrap();

    let summary = &outcome.report().summary;
    assert!(outcome.is_complete());
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.total_folders, 1);
    assert_eq!(summary.total_size_bytes, 3072);
    assert_eq!(summary.status, RunStatus::Complete);
    assert_eq!(summary.api_calls_made, 2);

    assert!(!manager.checkpoint_path().exists());
    let artifact = manager.read_inventory().unwrap();
    assert!(artifact.summary.is_complete());
    assert_eq!(artifact.entries.len(), 3);
    assert!(manager.csv_path().exists());
    assert_eq!(
        remote.calls(),
        vec!["list_root(recursive=true, limit=2000)", "list_continue(c1)"]
    );
}

#[test]
fn test_interrupt_then_resume_matches_single_pass() {
    let temp = TempDir::new().unwrap();

    // Reference: one uninterrupted pass.
    let reference_remote = five_page_remote();
    let reference_dir = TempDir::new().unwrap();
    let mut reference = enumerator(&reference_remote, config(&reference_dir));
    reference.run().unwrap();
    let expected = CheckpointManager::from_config(&config(&reference_dir))
        .read_inventory()
        .unwrap();

    // Interrupted after the second continuation page.
    let remote = five_page_remote();
    let flag = CancelFlag::new();
    let cancelling = CancelAfter {
        inner: &remote,
        flag: flag.clone(),
        after: 2,
        served: Cell::new(0),
    };
    let mut first = enumerator(&cancelling, config(&temp)).with_cancel_flag(flag);
    let outcome = first.run().unwrap();
    assert!(matches!(outcome, RunOutcome::Interrupted(_)));
    assert_eq!(first.state(), EnumerationState::Interrupted);
    assert_eq!(first.store().len(), 3);

    let manager = CheckpointManager::from_config(&config(&temp));
    let saved = manager.load().unwrap().unwrap();
    assert_eq!(saved.checkpoint.cursor, Some(Cursor::new("c3")));
    assert_eq!(saved.checkpoint.api_call_count, 3);

    // Resume skips the root listing and continues from the saved cursor.
    let resumed_remote = five_page_remote();
    let mut second = enumerator(&resumed_remote, config(&temp));
    let outcome = second.run().unwrap();
    assert!(outcome.is_complete());
    assert!(outcome.report().resumed_from.is_some());
    assert_eq!(resumed_remote.calls()[0], "list_continue(c3)");

    let actual = manager.read_inventory().unwrap();
    assert_eq!(actual.entries, expected.entries);
    assert_eq!(actual.summary.total_size_bytes, expected.summary.total_size_bytes);
    assert_eq!(actual.summary.api_calls_made, expected.summary.api_calls_made);
}

#[test]
fn test_fatal_error_saves_progress_then_resumes() {
    let temp = TempDir::new().unwrap();
    let remote = five_page_remote();
    let probe_calls = RefCell::new(0);

    // Fail permanently on the third call.
    struct FailThird<'a> {
        inner: &'a ReplayRemote,
        calls: &'a RefCell<u32>,
    }
    impl RemoteListing for FailThird<'_> {
        fn list_root(&self, recursive: bool, limit: u32) -> Result<ListPage, RemoteError> {
            *self.calls.borrow_mut() += 1;
            self.inner.list_root(recursive, limit)
        }
        fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError> {
            *self.calls.borrow_mut() += 1;
            if *self.calls.borrow() == 3 {
                return Err(RemoteError::Client {
                    status: 400,
                    message: "bad request".into(),
                });
            }
            self.inner.list_continue(cursor)
        }
        fn list_shallow(&self, path: &str) -> Result<ListPage, RemoteError> {
            self.inner.list_shallow(path)
        }
        fn get_usage(&self) -> Result<u64, RemoteError> {
            self.inner.get_usage()
        }
    }

    let failing = FailThird {
        inner: &remote,
        calls: &probe_calls,
    };
    let mut first = enumerator(&failing, config(&temp));
    let err = first.run().unwrap_err();
    match &err {
        EnumerateError::Remote {
            source,
            checkpoint_saved,
        } => {
            assert!(*checkpoint_saved);
            assert!(matches!(source, RetryError::Permanent { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(first.state(), EnumerationState::Failed);

    let manager = CheckpointManager::from_config(&config(&temp));
    let saved = manager.load().unwrap().unwrap();
    assert_eq!(saved.entries.len(), 2);
    assert_eq!(saved.checkpoint.cursor, Some(Cursor::new("c2")));
    assert_eq!(saved.checkpoint.api_call_count, 3);

    let retry_remote = five_page_remote();
    let mut second = enumerator(&retry_remote, config(&temp));
    let outcome = second.run().unwrap();
    assert_eq!(outcome.report().summary.total_entries, 5);
    assert_eq!(outcome.report().summary.api_calls_made, 6);
}

#[test]
fn test_exhausted_retries_are_fatal() {
    let temp = TempDir::new().unwrap();
    let remote = two_page_remote();
    for _ in 0..5 {
        remote.fail_next(RemoteError::Server {
            status: 503,
            message: "unavailable".into(),
        });
    }

    let mut enumerator = enumerator(&remote, config(&temp));
    match enumerator.run().unwrap_err() {
        EnumerateError::Remote { source, .. } => {
            assert!(matches!(source, RetryError::Exhausted { attempts: 5, .. }))
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(enumerator.api_calls(), 5);
}

#[test]
fn test_transient_errors_mid_listing_recover() {
    let temp = TempDir::new().unwrap();
    let remote = two_page_remote();
    let mut enumerator = enumerator(&remote, config(&temp));

    // Consumed by list_root; the continuation then succeeds.
    remote.fail_next(RemoteError::RateLimited { retry_after: None });
    let outcome = enumerator.run().unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.report().summary.api_calls_made, 3);
}

#[test]
fn test_zero_new_entry_pages_and_duplicates() {
    let temp = TempDir::new().unwrap();
    let remote = ReplayRemote::from_pages(vec![
        ListPage::more(vec![RemoteEntry::folder("/A").with_id("id:a")], Cursor::new("c1")),
        ListPage::more(vec![], Cursor::new("c2")),
        ListPage::more(vec![RemoteEntry::folder("/A").with_id("id:a")], Cursor::new("c3")),
        ListPage::last(vec![
            RemoteEntry::folder("/A").with_id("id:other"),
            RemoteEntry::deleted("/gone"),
        ]),
    ]);

    let mut enumerator = enumerator(&remote, config(&temp));
    let outcome = enumerator.run().unwrap();

    let report = outcome.report();
    assert_eq!(report.summary.total_entries, 1);
    assert_eq!(report.pages, 4);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.collisions, 1);
}

#[test]
fn test_malformed_records_become_warnings() {
    let temp = TempDir::new().unwrap();
    let mut sizeless = RemoteEntry::file("/no-size.bin", 0);
    sizeless.size = None;
    let mut odd = RemoteEntry::folder("/link");
    odd.tag = "symlink".into();
    let remote = ReplayRemote::from_pages(vec![ListPage::last(vec![
        RemoteEntry::folder("/ok"),
        sizeless,
        odd,
    ])]);

    let mut enumerator = enumerator(&remote, config(&temp));
    let outcome = enumerator.run().unwrap();

    assert_eq!(outcome.report().summary.total_entries, 1);
    assert_eq!(outcome.report().warnings.len(), 2);
}

#[test]
fn test_count_cadence_triggers_save() {
    let temp = TempDir::new().unwrap();
    let config = EnumerateConfig::builder()
        .output_dir(temp.path().join("out"))
        .save_interval_secs(3600u64)
        .save_every_entries(2u64)
        .build()
        .unwrap();
    let manager = CheckpointManager::from_config(&config);
    let remote = five_page_remote();
    let probe = CheckpointProbe {
        inner: &remote,
        checkpoint: manager.checkpoint_path(),
        seen: RefCell::new(Vec::new()),
    };

    let mut enumerator = enumerator(&probe, config);
    enumerator.run().unwrap();

    // One entry per page: the save lands after the second page.
    assert_eq!(*probe.seen.borrow(), vec![false, false, true, true, true]);
    assert!(!manager.checkpoint_path().exists());
}

#[test]
fn test_time_cadence_saves_every_page_when_zero() {
    let temp = TempDir::new().unwrap();
    let config = EnumerateConfig::builder()
        .output_dir(temp.path().join("out"))
        .save_interval_secs(0u64)
        .build()
        .unwrap();
    let manager = CheckpointManager::from_config(&config);
    let remote = five_page_remote();
    let probe = CheckpointProbe {
        inner: &remote,
        checkpoint: manager.checkpoint_path(),
        seen: RefCell::new(Vec::new()),
    };

    let mut enumerator = enumerator(&probe, config);
    enumerator.run().unwrap();

    assert_eq!(*probe.seen.borrow(), vec![false, true, true, true, true]);
}

#[test]
fn test_finished_checkpoint_completes_without_calls() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let out = config.output_dir.clone();
    fs::create_dir_all(&out).unwrap();

    // Leave behind a saved-but-not-cleared final state.
    let remote = two_page_remote();
    let mut first = enumerator(&remote, config.clone());
    first.run().unwrap();
    let manager = CheckpointManager::from_config(&config);
    let artifact = manager.read_inventory().unwrap();
    fs::write(
        manager.checkpoint_path(),
        format!(
            r#"{{"version":2,"cursor":null,"hasMore":false,"entryCount":{},
                "apiCallCount":2,"savedAt":"2024-05-01T00:00:00Z"}}"#,
            artifact.entries.len()
        ),
    )
    .unwrap();

    let untouched = two_page_remote();
    let mut second = enumerator(&untouched, config);
    let outcome = second.run().unwrap();

    assert!(outcome.is_complete());
    assert_eq!(untouched.call_count(), 0);
    assert_eq!(outcome.report().summary.total_entries, 3);
    assert!(!manager.checkpoint_path().exists());
}

#[test]
fn test_finished_checkpoint_without_entries_lists_root_again() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    fs::create_dir_all(&config.output_dir).unwrap();
    let manager = CheckpointManager::from_config(&config);
    fs::write(
        manager.checkpoint_path(),
        r#"{"version":2,"cursor":null,"hasMore":false,"entryCount":0,
            "apiCallCount":0,"savedAt":"2024-05-01T00:00:00Z"}"#,
    )
    .unwrap();

    let remote = two_page_remote();
    let mut enumerator = enumerator(&remote, config);
    let outcome = enumerator.run().unwrap();

    assert!(outcome.is_complete());
    let calls = remote.calls();
    assert_eq!(calls[0], "list_root(recursive=true, limit=2000)");
    assert_eq!(calls.iter().filter(|c| c.starts_with("list_root")).count(), 1);
    assert_eq!(outcome.report().summary.total_entries, 3);
    assert!(outcome.report().resumed_from.is_none());
    assert!(!manager.checkpoint_path().exists());
}

#[test]
fn test_corrupt_checkpoint_stops_before_listing() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    fs::create_dir_all(&config.output_dir).unwrap();
    let manager = CheckpointManager::from_config(&config);
    fs::write(manager.checkpoint_path(), "not json").unwrap();

    let remote = two_page_remote();
    let mut enumerator = enumerator(&remote, config);
    let err = enumerator.run().unwrap_err();

    assert!(matches!(err, EnumerateError::Checkpoint(ref e) if e.is_corruption()));
    assert_eq!(remote.call_count(), 0);
}

#[test]
fn test_resume_from_legacy_checkpoint() {
    let temp = TempDir::new().unwrap();
    let legacy = temp.path().join("legacy");
    fs::create_dir_all(&legacy).unwrap();
    fs::write(
        legacy.join("checkpoint.json"),
        r#"{"cursor":"c1","has_more":true,"entries_count":2,"api_calls":1,
            "timestamp":"2024-03-09T17:45:12.004417","folders_seen":["/a"]}"#,
    )
    .unwrap();
    fs::write(
        legacy.join("inventory.json"),
        r#"{"summary":{},"entries":[
            {"type":"folder","name":"A","path":"/A","path_lower":"/a","size_bytes":0,"dropbox_id":"id:1"},
            {"type":"file","name":"f.txt","path":"/A/f.txt","path_lower":"/a/f.txt","size_bytes":1024,"dropbox_id":"id:2"}
        ]}"#,
    )
    .unwrap();

    let config = EnumerateConfig::builder()
        .output_dir(temp.path().join("out"))
        .legacy_dir(Some(legacy))
        .build()
        .unwrap();
    let remote = two_page_remote();
    let mut enumerator = enumerator(&remote, config);
    let outcome = enumerator.run().unwrap();

    assert_eq!(remote.calls(), vec!["list_continue(c1)"]);
    assert_eq!(outcome.report().summary.total_entries, 3);
    assert_eq!(outcome.report().summary.total_size_bytes, 3072);
    assert_eq!(outcome.report().summary.api_calls_made, 2);
}
