//! Scripted remote that replays recorded listing pages.
//!
//! A script lists the pages of the recursive root listing in order; page `i`
//! carries the cursor that [`list_continue`](RemoteListing::list_continue)
//! accepts to produce page `i + 1`. Shallow listings come from the script's
//! `shallow` map, or are derived from the recursive pages when a folder is
//! not in the map. Failures can be queued to exercise retry paths.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tallyfile_core::{Cursor, ListPage, RemoteEntry, RemoteError, split_path};

use crate::remote::{RemoteListing, normalize_folder};

const SHALLOW_PREFIX: &str = "shallow:";

/// A recorded listing session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    /// Pages of the recursive root listing, in order.
    pub pages: Vec<ListPage>,

    /// Shallow listings keyed by folder path (`""` for the root).
    #[serde(default)]
    pub shallow: BTreeMap<String, Vec<RemoteEntry>>,

    /// Account-level usage in bytes.
    #[serde(default)]
    pub usage_bytes: u64,

    /// Split shallow listings into pages of this size.
    #[serde(default)]
    pub shallow_page_size: Option<usize>,
}

/// Errors loading a replay script.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The script file could not be read.
    #[error("Cannot read replay script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The script file is not valid JSON for a script.
    #[error("Invalid replay script {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A [`RemoteListing`] backed by a [`ReplayScript`].
#[derive(Debug, Default)]
pub struct ReplayRemote {
    script: ReplayScript,
    failures: Mutex<VecDeque<RemoteError>>,
    calls: Mutex<Vec<String>>,
}

impl ReplayRemote {
    /// Create a remote from a script.
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script,
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Build a script from pages alone.
    pub fn from_pages(pages: Vec<ListPage>) -> Self {
        Self::new(ReplayScript {
            pages,
            ..ReplayScript::default()
        })
    }

    /// Load a JSON script from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let script = serde_json::from_str(&raw).map_err(|source| ReplayError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(script))
    }

    /// Set the usage figure.
    pub fn with_usage(mut self, bytes: u64) -> Self {
        self.script.usage_bytes = bytes;
        self
    }

    /// Set an explicit shallow listing for a folder.
    pub fn with_shallow(mut self, folder: &str, entries: Vec<RemoteEntry>) -> Self {
        self.script
            .shallow
            .insert(normalize_folder(folder).to_string(), entries);
        self
    }

    /// Split shallow listings into pages.
    pub fn with_shallow_page_size(mut self, size: usize) -> Self {
        self.script.shallow_page_size = Some(size.max(1));
        self
    }

    /// Make the next call fail with `err`. Queued failures are consumed in
    /// order, one per call, before any scripted response.
    pub fn fail_next(&self, err: RemoteError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(err);
        }
    }

    /// Calls made so far, e.g. `list_root`, `list_continue(c1)`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn record(&self, call: String) -> Result<(), RemoteError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match self.failures.lock().ok().and_then(|mut f| f.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn shallow_children(&self, folder: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        if let Some(entries) = self.script.shallow.get(folder) {
            return Ok(entries.clone());
        }

        let folder_lower = folder.to_lowercase();
        let records = self.script.pages.iter().flat_map(|p| p.entries.iter());
        let mut folder_exists = folder.is_empty();
        let mut children = Vec::new();
        for record in records {
            if record.tag == "deleted" {
                continue;
            }
            let lower = record
                .path_lower
                .clone()
                .unwrap_or_else(|| record.display_path().to_lowercase());
            if record.is_folder() && lower == folder_lower {
                folder_exists = true;
            }
            let (parent, _, _) = split_path(&lower);
            if normalize_folder(&parent) == folder_lower {
                children.push(record.clone());
            }
        }

        if folder_exists {
            Ok(children)
        } else {
            Err(RemoteError::Client {
                status: 409,
                message: format!("path/not_found: {folder}"),
            })
        }
    }

    fn shallow_page(&self, folder: &str, offset: usize) -> Result<ListPage, RemoteError> {
        let children = self.shallow_children(folder)?;
        if offset > children.len() {
            return Err(RemoteError::CursorReset {
                message: format!("offset {offset} is past the end of {folder:?}"),
            });
        }
        let size = self.script.shallow_page_size.unwrap_or(usize::MAX);
        let end = offset.saturating_add(size).min(children.len());
        let has_more = end < children.len();
        Ok(ListPage {
            entries: children[offset..end].to_vec(),
            cursor: has_more.then(|| Cursor::new(format!("{SHALLOW_PREFIX}{end}:{folder}"))),
            has_more,
        })
    }
}

impl RemoteListing for ReplayRemote {
    fn list_root(&self, recursive: bool, page_limit: u32) -> Result<ListPage, RemoteError> {
        self.record(format!("list_root(recursive={recursive}, limit={page_limit})"))?;
        if !recursive {
            return self.shallow_page("", 0);
        }
        Ok(self
            .script
            .pages
            .first()
            .cloned()
            .unwrap_or_else(|| ListPage::last(Vec::new())))
    }

    fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError> {
        self.record(format!("list_continue({})", cursor.as_str()))?;

        if let Some(rest) = cursor.as_str().strip_prefix(SHALLOW_PREFIX) {
            let parsed = rest
                .split_once(':')
                .and_then(|(offset, folder)| Some((offset.parse::<usize>().ok()?, folder)));
            return match parsed {
                Some((offset, folder)) => self.shallow_page(folder, offset),
                None => Err(RemoteError::CursorReset {
                    message: format!("malformed cursor {cursor}"),
                }),
            };
        }

        let position = self
            .script
            .pages
            .iter()
            .position(|page| page.cursor.as_ref() == Some(cursor));
        match position.and_then(|idx| self.script.pages.get(idx + 1)) {
            Some(page) => Ok(page.clone()),
            None => Err(RemoteError::CursorReset {
                message: format!("unknown cursor {cursor}"),
            }),
        }
    }

    fn list_shallow(&self, path: &str) -> Result<ListPage, RemoteError> {
        let folder = normalize_folder(path);
        self.record(format!("list_shallow({folder})"))?;
        self.shallow_page(folder, 0)
    }

    fn get_usage(&self) -> Result<u64, RemoteError> {
        self.record("get_usage".to_string())?;
        Ok(self.script.usage_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_page_remote() -> ReplayRemote {
        ReplayRemote::from_pages(vec![
            ListPage::more(
                vec![RemoteEntry::folder("/A"), RemoteEntry::file("/A/f.txt", 1024)],
                Cursor::new("c1"),
            ),
            ListPage::last(vec![RemoteEntry::file("/B.txt", 2048)]),
        ])
    }

    #[test]
    fn test_replays_pages_in_order() {
        let remote = two_page_remote();

        let first = remote.list_root(true, 2000).unwrap();
        assert!(first.has_more);
        let second = remote.list_continue(first.cursor.as_ref().unwrap()).unwrap();
        assert!(!second.has_more);
        assert_eq!(
            remote.calls(),
            vec!["list_root(recursive=true, limit=2000)", "list_continue(c1)"]
        );
    }

    #[test]
    fn test_unknown_cursor_is_reset() {
        let remote = two_page_remote();
        let err = remote.list_continue(&Cursor::new("zzz")).unwrap_err();
        assert!(matches!(err, RemoteError::CursorReset { .. }));
    }

    #[test]
    fn test_queued_failures_come_first() {
        let remote = two_page_remote();
        remote.fail_next(RemoteError::RateLimited { retry_after: None });

        assert!(remote.list_root(true, 10).is_err());
        assert!(remote.list_root(true, 10).is_ok());
        assert_eq!(remote.call_count(), 2);
    }

    #[test]
    fn test_shallow_derived_from_pages() {
        let remote = two_page_remote();

        let root = remote.list_shallow("/").unwrap();
        let paths: Vec<_> = root.entries.iter().map(|e| e.display_path().to_string()).collect();
        assert_eq!(paths, vec!["/A", "/B.txt"]);

        assert_eq!(remote.list_shallow("/a").unwrap().entries.len(), 1);
        assert!(remote.list_shallow("/missing").is_err());
    }

    #[test]
    fn test_shallow_pagination() {
        let remote = two_page_remote()
            .with_shallow(
                "",
                vec![
                    RemoteEntry::folder("/A"),
                    RemoteEntry::folder("/B"),
                    RemoteEntry::folder("/C"),
                ],
            )
            .with_shallow_page_size(2);

        let first = remote.list_shallow("").unwrap();
        assert_eq!(first.entries.len(), 2);
        assert!(first.has_more);
        let second = remote.list_continue(first.cursor.as_ref().unwrap()).unwrap();
        assert_eq!(second.entries.len(), 1);
        assert!(!second.has_more);
    }

    #[test]
    fn test_script_from_json() {
        let json = r#"{
            "pages": [
                {"entries": [{".tag": "folder", "path_display": "/X"}], "cursor": null, "has_more": false}
            ],
            "usage_bytes": 99
        }"#;
        let script: ReplayScript = serde_json::from_str(json).unwrap();
        let remote = ReplayRemote::new(script);

        assert_eq!(remote.get_usage().unwrap(), 99);
        assert_eq!(remote.list_root(true, 1).unwrap().entries.len(), 1);
    }
}
