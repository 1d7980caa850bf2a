//! A local directory presented as a paginated listing API.
//!
//! The tree is walked once per process with jwalk in sorted order, so page
//! boundaries are stable across restarts as long as the tree is unchanged.
//! Cursors encode an offset into that order and stay valid across restarts.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use chrono::{DateTime, Utc};
use jwalk::WalkDir;
use tracing::{debug, info, warn};

use tallyfile_core::{Cursor, ListPage, RemoteEntry, RemoteError, split_path};

use crate::remote::{RemoteListing, normalize_folder};

/// Records per page for shallow listings.
pub const SHALLOW_PAGE_LIMIT: usize = 2000;

const CURSOR_PREFIX: &str = "local";

/// Position within a listing, encoded into an opaque cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Recursive { offset: usize, limit: usize },
    Shallow { offset: usize, folder: String },
}

impl Position {
    fn encode(&self) -> Cursor {
        match self {
            Self::Recursive { offset, limit } => {
                Cursor::new(format!("{CURSOR_PREFIX}:r:{offset}:{limit}"))
            }
            Self::Shallow { offset, folder } => {
                Cursor::new(format!("{CURSOR_PREFIX}:s:{offset}:{SHALLOW_PAGE_LIMIT}:{folder}"))
            }
        }
    }

    fn decode(cursor: &Cursor) -> Option<Self> {
        let mut parts = cursor.as_str().splitn(5, ':');
        if parts.next()? != CURSOR_PREFIX {
            return None;
        }
        let scope = parts.next()?;
        let offset = parts.next()?.parse().ok()?;
        let limit: usize = parts.next()?.parse().ok()?;
        match scope {
            "r" if limit > 0 => Some(Self::Recursive { offset, limit }),
            "s" => Some(Self::Shallow {
                offset,
                folder: parts.next()?.to_string(),
            }),
            _ => None,
        }
    }
}

/// Serves listings of a local directory tree.
pub struct LocalTreeRemote {
    root: PathBuf,
    listing: Mutex<Option<Arc<Vec<RemoteEntry>>>>,
}

impl LocalTreeRemote {
    /// Create a remote rooted at `root`. Nothing is read until the first call.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listing: Mutex::new(None),
        }
    }

    /// Root directory being served.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn listing(&self) -> Result<Arc<Vec<RemoteEntry>>, RemoteError> {
        let mut cached = self.listing.lock().map_err(|_| RemoteError::Transport {
            message: "listing cache poisoned".to_string(),
        })?;
        if let Some(listing) = cached.as_ref() {
            return Ok(Arc::clone(listing));
        }
        let listing = Arc::new(self.walk()?);
        *cached = Some(Arc::clone(&listing));
        Ok(listing)
    }

    /// Walk the tree in sorted depth-first order.
    fn walk(&self) -> Result<Vec<RemoteEntry>, RemoteError> {
        if !self.root.is_dir() {
            return Err(RemoteError::Client {
                status: 409,
                message: format!("path/not_found: {}", self.root.display()),
            });
        }

        let walker = WalkDir::new(&self.root)
            .sort(true)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(1);

        let mut entries = Vec::new();
        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "Skipping unreadable entry");
                    continue;
                }
            };

            let path = entry.path();
            let Some(display_path) = remote_path(&self.root, &path) else {
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                let mut record = RemoteEntry::folder(&display_path);
                if let Ok(metadata) = entry.metadata() {
                    record = record.with_id(stable_id(&metadata, &display_path));
                }
                entries.push(record);
            } else if file_type.is_file() {
                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(err) => {
                        warn!(path = %display_path, error = %err, "Skipping file without metadata");
                        continue;
                    }
                };
                let mut record =
                    RemoteEntry::file(&display_path, metadata.len()).with_id(stable_id(&metadata, &display_path));
                if let Ok(modified) = metadata.modified() {
                    record = record.with_modified(DateTime::<Utc>::from(modified));
                }
                entries.push(record);
            } else {
                debug!(path = %display_path, "Skipping non-regular entry");
            }
        }

        info!(root = %self.root.display(), entries = entries.len(), "Indexed local tree");
        Ok(entries)
    }

    fn page(&self, position: Position) -> Result<ListPage, RemoteError> {
        let listing = self.listing()?;
        match position {
            Position::Recursive { offset, limit } => {
                if offset > listing.len() {
                    return Err(cursor_reset(offset));
                }
                let end = offset.saturating_add(limit).min(listing.len());
                Ok(ListPage {
                    entries: listing[offset..end].to_vec(),
                    cursor: Some(Position::Recursive { offset: end, limit }.encode()),
                    has_more: end < listing.len(),
                })
            }
            Position::Shallow { offset, folder } => {
                let children: Vec<&RemoteEntry> = listing
                    .iter()
                    .filter(|e| parent_lower(e) == folder)
                    .collect();
                if offset > children.len() {
                    return Err(cursor_reset(offset));
                }
                if offset == 0
                    && children.is_empty()
                    && !folder.is_empty()
                    && !listing
                        .iter()
                        .any(|e| e.is_folder() && e.path_lower.as_deref() == Some(folder.as_str()))
                {
                    return Err(RemoteError::Client {
                        status: 409,
                        message: format!("path/not_found: {folder}"),
                    });
                }
                let end = offset.saturating_add(SHALLOW_PAGE_LIMIT).min(children.len());
                Ok(ListPage {
                    entries: children[offset..end].iter().map(|e| (*e).clone()).collect(),
                    cursor: Some(Position::Shallow { offset: end, folder }.encode()),
                    has_more: end < children.len(),
                })
            }
        }
    }
}

impl RemoteListing for LocalTreeRemote {
    fn list_root(&self, recursive: bool, page_limit: u32) -> Result<ListPage, RemoteError> {
        if recursive {
            self.page(Position::Recursive {
                offset: 0,
                limit: page_limit.max(1) as usize,
            })
        } else {
            self.list_shallow("")
        }
    }

    fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError> {
        let position = Position::decode(cursor).ok_or_else(|| RemoteError::CursorReset {
            message: format!("unrecognized cursor {cursor}"),
        })?;
        self.page(position)
    }

    fn list_shallow(&self, path: &str) -> Result<ListPage, RemoteError> {
        self.page(Position::Shallow {
            offset: 0,
            folder: normalize_folder(path).to_lowercase(),
        })
    }

    fn get_usage(&self) -> Result<u64, RemoteError> {
        let listing = self.listing()?;
        Ok(listing.iter().filter_map(|e| e.size).sum())
    }
}

fn cursor_reset(offset: usize) -> RemoteError {
    RemoteError::CursorReset {
        message: format!("offset {offset} is past the end of the listing"),
    }
}

/// Lower-cased parent folder of a record, with the root as `""`.
fn parent_lower(entry: &RemoteEntry) -> String {
    let lower = entry.path_lower.as_deref().unwrap_or_default();
    let (parent, _, _) = split_path(lower);
    normalize_folder(&parent).to_string()
}

/// `/`-separated path of `path` relative to `root`.
fn remote_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in relative.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Identifier that survives renames where the platform allows it.
#[cfg(unix)]
fn stable_id(metadata: &std::fs::Metadata, _path: &str) -> String {
    format!("id:{}:{}", metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn stable_id(_metadata: &std::fs::Metadata, path: &str) -> String {
    format!("id:{}", path.to_lowercase())
}
