use tallyfile_core::{
    Aggregate, Checkpoint, Cursor, EnumerateConfig, Entry, EntryKind, InventoryArtifact,
    InventorySnapshot, RemoteEntry, RetryConfig, RunStatus, Summary,
};
use std::path::PathBuf;

#[test]
fn test_entry_kind_round_trips_through_strings() {
    assert_eq!(EntryKind::File.to_string(), "file");
    assert_eq!("folder".parse::<EntryKind>().unwrap(), EntryKind::Folder);
    assert!("symlink".parse::<EntryKind>().is_err());
}

#[test]
fn test_entry_depth_counts_ancestors() {
    let root_child = Entry::new_folder("/Projects");
    let nested = Entry::new_file("/Projects/2024/plan.docx", 10);

    assert_eq!(root_child.depth, 1);
    assert_eq!(root_child.parent_path, "/");
    assert_eq!(nested.depth, 3);
    assert_eq!(nested.parent_path, "/Projects/2024");
    assert_eq!(nested.name.as_str(), "plan.docx");
}

#[test]
fn test_entry_prefers_remote_lowercase_path() {
    // Sources may fold case differently from str::to_lowercase.
    let mut raw = RemoteEntry::folder("/STRASSE");
    raw.path_lower = Some("/straße".to_string());

    let entry = Entry::from_remote(&raw).unwrap().unwrap();
    assert_eq!(entry.path, "/STRASSE");
    assert_eq!(entry.path_lower, "/straße");
}

#[test]
fn test_entry_json_uses_camel_case() {
    let entry = Entry::new_file("/a/b.txt", 5).with_remote_id("id:9");
    let json = serde_json::to_value(&entry).unwrap();

    assert_eq!(json["kind"], "file");
    assert_eq!(json["sizeBytes"], 5);
    assert_eq!(json["pathLower"], "/a/b.txt");
    assert_eq!(json["remoteId"], "id:9");

    let back: Entry = serde_json::from_value(json).unwrap();
    assert_eq!(back, entry);
}

#[test]
fn test_aggregate_invariants() {
    let entries = vec![
        Entry::new_folder("/A"),
        Entry::new_folder("/A/B"),
        Entry::new_file("/A/B/x.jpg", 300),
        Entry::new_file("/A/y.JPG", 200),
        Entry::new_file("/z", 0),
    ];
    let aggregate = Aggregate::from_entries(&entries);

    let file_sum: u64 = entries.iter().filter(|e| e.is_file()).map(|e| e.size_bytes).sum();
    assert_eq!(aggregate.total_size_bytes, file_sum);
    assert_eq!(
        aggregate.total_files + aggregate.total_folders,
        aggregate.total_entries
    );
    assert_eq!(aggregate.file_type_counts[".jpg"], 2);
    assert_eq!(aggregate.file_type_sizes[".jpg"], 500);

    // Pure function of the contents.
    assert_eq!(aggregate, Aggregate::from_entries(&entries));
}

#[test]
fn test_summary_size_in_gb() {
    let entries = vec![Entry::new_file("/disk.img", 3 * 1_073_741_824 / 2)];
    let summary = Summary::new(Aggregate::from_entries(&entries), RunStatus::Complete, 3);

    assert_eq!(summary.total_size_gb, 1.5);
    assert!(summary.is_complete());
    assert_eq!(summary.api_calls_made, 3);
}

#[test]
fn test_snapshot_reads_back_as_artifact() {
    let entries = vec![Entry::new_folder("/A"), Entry::new_file("/A/f.txt", 1024)];
    let snapshot = InventorySnapshot::new(entries.iter().collect(), RunStatus::InProgress, 1);

    let json = serde_json::to_string(&snapshot).unwrap();
    let artifact: InventoryArtifact = serde_json::from_str(&json).unwrap();

    assert_eq!(artifact.entries, entries);
    assert_eq!(artifact.summary.status, RunStatus::InProgress);
    assert_eq!(artifact.recompute().total_size_bytes, 1024);
}

#[test]
fn test_checkpoint_json_shape() {
    let checkpoint = Checkpoint {
        cursor: Some(Cursor::new("c1")),
        has_more: true,
        entry_count: 2,
        api_call_count: 1,
        ..Checkpoint::unstarted()
    };
    let json = serde_json::to_value(&checkpoint).unwrap();

    assert_eq!(json["cursor"], "c1");
    assert_eq!(json["hasMore"], true);
    assert_eq!(json["entryCount"], 2);
    assert_eq!(json["apiCallCount"], 1);
    assert!(json["savedAt"].is_string());
}

#[test]
fn test_enumerate_config_from_partial_toml_like_json() {
    let config: EnumerateConfig =
        serde_json::from_str(r#"{"output_dir": "out", "retry": {"max_attempts": 3}}"#).unwrap();

    assert_eq!(config.output_dir, PathBuf::from("out"));
    assert_eq!(config.page_limit, 2000);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, RetryConfig::default().base_delay_ms);
}
