//! The backing filesystem contract.

use crate::{FilesError, FilesResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Read;

/// Whether a listed entry is a file or a directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry yielded by [`Filesystem::list_contents`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FsEntry {
    /// Path relative to the filesystem root, `/`-separated.
    pub path: String,
    pub kind: EntryKind,
}

impl FsEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Lazy, finite listing of a directory.
///
/// Not restartable: list again to enumerate again. Entry order is whatever the storage returns.
pub type FsEntries<'a> = Box<dyn Iterator<Item = FilesResult<FsEntry>> + 'a>;

/// A key-value style store of bytes addressed by relative file IDs.
///
/// Implementations must be safe to share between threads; the asset store holds them behind
/// `Arc<dyn Filesystem>`.
pub trait Filesystem: Send + Sync + fmt::Debug {
    /// Stable name of this filesystem, used to key cached hashes.
    fn identity(&self) -> &str;

    /// Whether a file (not a directory) is stored at `path`.
    fn has(&self, path: &str) -> FilesResult<bool>;

    /// Opens `path` for streaming reads.
    fn read_stream(&self, path: &str) -> FilesResult<Box<dyn Read + Send>>;

    /// Streams `reader` into `path`, replacing any existing file. Returns bytes written.
    fn write_stream(&self, path: &str, reader: &mut dyn Read) -> FilesResult<u64>;

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] if nothing is stored there.
    fn delete(&self, path: &str) -> FilesResult<()>;

    /// Removes the directory at `path` if it exists and is empty. Returns whether it was removed.
    fn delete_dir_if_empty(&self, path: &str) -> FilesResult<bool>;

    /// Lists the entries under `dir` (use `""` for the root).
    ///
    /// A missing directory lists as empty.
    fn list_contents(&self, dir: &str, recursive: bool) -> FilesResult<FsEntries<'_>>;

    /// Last-modified timestamp of the file at `path`.
    fn last_modified(&self, path: &str) -> FilesResult<DateTime<Utc>>;

    /// Size in bytes of the file at `path`.
    fn size(&self, path: &str) -> FilesResult<u64>;

    /// Base URL content in this filesystem is served from, if the adapter can serve directly.
    fn public_url_base(&self) -> Option<&str> {
        None
    }

    /// Public URL of `path`, if this adapter has the public-URL capability.
    fn public_url(&self, path: &str) -> Option<String> {
        self.public_url_base()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), path))
    }

    /// Copies `from` to `to` within this filesystem by streaming.
    fn copy(&self, from: &str, to: &str) -> FilesResult<u64> {
        let mut reader = self.read_stream(from)?;
        self.write_stream(to, &mut reader)
    }

    /// Moves `from` to `to` within this filesystem.
    ///
    /// The default streams a copy then deletes the source; adapters with a native rename should
    /// override it.
    fn rename(&self, from: &str, to: &str) -> FilesResult<()> {
        if from == to {
            return Ok(());
        }
        self.copy(from, to)?;
        self.delete(from)
    }
}

/// Parent directory of a file ID (`""` for files at the root).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Rejects paths that could escape a filesystem root.
pub fn validate_relative(path: &str) -> FilesResult<()> {
    if path.is_empty() {
        return Err(FilesError::InvalidPath("path cannot be empty".into()));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(FilesError::InvalidPath(format!(
            "path must be relative and '/'-separated: {}",
            path
        )));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(FilesError::InvalidPath(format!(
            "path contains empty, '.' or '..' segments: {}",
            path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("folder/abcdef1234/sam.jpg"), "folder/abcdef1234");
        assert_eq!(parent_dir("sam.jpg"), "");
    }

    #[test]
    fn test_validate_relative_rejects_traversal() {
        assert!(validate_relative("folder/sam.jpg").is_ok());
        assert!(matches!(
            validate_relative("../etc/passwd"),
            Err(FilesError::InvalidPath(_))
        ));
        assert!(validate_relative("/abs/path").is_err());
        assert!(validate_relative("a//b").is_err());
        assert!(validate_relative("a\\b").is_err());
        assert!(validate_relative("").is_err());
    }
}
