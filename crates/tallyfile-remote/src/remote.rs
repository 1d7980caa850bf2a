//! The listing API seam.

use tallyfile_core::{Cursor, ListPage, RemoteError};

/// A paginated, hierarchical listing API.
///
/// Implementations perform exactly one request per call; retrying is the
/// caller's business (see [`RetryPolicy`](crate::RetryPolicy)).
pub trait RemoteListing {
    /// Start listing from the root. With `recursive` set, the pages cover the
    /// whole tree; `page_limit` caps the number of records per page.
    fn list_root(&self, recursive: bool, page_limit: u32) -> Result<ListPage, RemoteError>;

    /// Fetch the page following `cursor`.
    fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError>;

    /// Start a non-recursive listing of one folder (`""` is the root).
    /// Continue it with [`list_continue`](Self::list_continue).
    fn list_shallow(&self, path: &str) -> Result<ListPage, RemoteError>;

    /// Account-level bytes in use.
    fn get_usage(&self) -> Result<u64, RemoteError>;
}

impl<R: RemoteListing + ?Sized> RemoteListing for &R {
    fn list_root(&self, recursive: bool, page_limit: u32) -> Result<ListPage, RemoteError> {
        (**self).list_root(recursive, page_limit)
    }

    fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError> {
        (**self).list_continue(cursor)
    }

    fn list_shallow(&self, path: &str) -> Result<ListPage, RemoteError> {
        (**self).list_shallow(path)
    }

    fn get_usage(&self) -> Result<u64, RemoteError> {
        (**self).get_usage()
    }
}

impl<R: RemoteListing + ?Sized> RemoteListing for Box<R> {
    fn list_root(&self, recursive: bool, page_limit: u32) -> Result<ListPage, RemoteError> {
        (**self).list_root(recursive, page_limit)
    }

    fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError> {
        (**self).list_continue(cursor)
    }

    fn list_shallow(&self, path: &str) -> Result<ListPage, RemoteError> {
        (**self).list_shallow(path)
    }

    fn get_usage(&self) -> Result<u64, RemoteError> {
        (**self).get_usage()
    }
}

/// Normalize a folder path for shallow listings: the root is `""`, and
/// trailing slashes are dropped.
pub fn normalize_folder(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folder() {
        assert_eq!(normalize_folder(""), "");
        assert_eq!(normalize_folder("/"), "");
        assert_eq!(normalize_folder("/A/"), "/A");
        assert_eq!(normalize_folder("/A/b"), "/A/b");
    }
}
