//! Local-disk backing filesystem.
//!
//! [`LocalFilesystem`] stores each file ID as a regular file under a canonicalised root
//! directory:
//!
//! ```text
//! <root>/
//! ├── folder/
//! │   └── abcdef1234/          # hash segment, if the file-ID scheme uses one
//! │       ├── sam.jpg
//! │       └── sam__FitWzYwXQ.jpg
//! └── other.pdf
//! ```
//!
//! # Security Model
//!
//! - The root is canonicalised at construction time
//! - Every file ID is validated as a relative, `/`-separated path without `.` or `..` segments
//! - Symlinks are not followed when listing
//!
//! # Implementation Notes
//!
//! - Writes go to a temporary file in the destination directory which is then persisted over
//!   the target, so readers never observe a half-written file
//! - Parent directories are created lazily on write
//! - `rename` uses `std::fs::rename`, which is atomic within one root

use crate::filesystem::{validate_relative, EntryKind, FsEntries, FsEntry};
use crate::{FilesError, FilesResult, Filesystem};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Backing filesystem rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    /// Canonicalised root directory
    root: PathBuf,

    /// Name used to key cached hashes
    identity: String,

    /// Base URL the root is served from, if it is web-accessible
    public_url_base: Option<String>,
}

impl LocalFilesystem {
    /// Creates a new `LocalFilesystem` rooted at `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Existing directory holding the stored files
    /// * `identity` - Stable name for this filesystem (for example `public` or `protected`)
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if:
    /// - The root directory does not exist or is not a directory
    /// - Path canonicalisation fails
    pub fn new(root: &Path, identity: impl Into<String>) -> FilesResult<Self> {
        if !root.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root.display()
            )));
        }

        if !root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        let root = root.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            root,
            identity: identity.into(),
            public_url_base: None,
        })
    }

    /// Marks this filesystem as web-accessible under `base`.
    #[must_use]
    pub fn with_public_url_base(mut self, base: impl Into<String>) -> Self {
        self.public_url_base = Some(base.into());
        self
    }

    /// Returns the canonicalised root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a file ID onto an absolute path under the root.
    fn resolve(&self, path: &str) -> FilesResult<PathBuf> {
        validate_relative(path)?;
        Ok(self.root.join(path))
    }

    /// Maps a directory ID onto an absolute path; `""` is the root itself.
    fn resolve_dir(&self, dir: &str) -> FilesResult<PathBuf> {
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            return Ok(self.root.clone());
        }
        self.resolve(dir)
    }

    /// Converts an absolute path below the root back into a `/`-separated file ID.
    fn relative_id(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_str()?.to_owned()),
                _ => return None,
            }
        }
        Some(segments.join("/"))
    }

    fn not_found(path: &str, e: io::Error) -> FilesError {
        if e.kind() == ErrorKind::NotFound {
            FilesError::NotFound(path.to_owned())
        } else {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Failed to access {}: {}", path, e),
            ))
        }
    }
}

impl Filesystem for LocalFilesystem {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn has(&self, path: &str) -> FilesResult<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn read_stream(&self, path: &str) -> FilesResult<Box<dyn Read + Send>> {
        let file = fs::File::open(self.resolve(path)?).map_err(|e| Self::not_found(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn write_stream(&self, path: &str, reader: &mut dyn Read) -> FilesResult<u64> {
        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| FilesError::InvalidPath(format!("no parent directory: {}", path)))?;

        fs::create_dir_all(parent).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!(
                    "Failed to create storage directory {}: {}",
                    parent.display(),
                    e
                ),
            ))
        })?;

        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        let written = io::copy(reader, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(&target).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.error.kind(),
                format!("Failed to write file to {}: {}", target.display(), e.error),
            ))
        })?;

        tracing::debug!(filesystem = %self.identity, path, bytes = written, "wrote file");
        Ok(written)
    }

    fn delete(&self, path: &str) -> FilesResult<()> {
        fs::remove_file(self.resolve(path)?).map_err(|e| Self::not_found(path, e))
    }

    fn delete_dir_if_empty(&self, path: &str) -> FilesResult<bool> {
        let dir = self.resolve(path)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        if fs::read_dir(&dir)?.next().is_some() {
            return Ok(false);
        }
        match fs::remove_dir(&dir) {
            Ok(()) => Ok(true),
            // Someone wrote into it between the check and the removal.
            Err(_) if fs::read_dir(&dir)?.next().is_some() => Ok(false),
            Err(e) => Err(FilesError::Io(e)),
        }
    }

    fn list_contents(&self, dir: &str, recursive: bool) -> FilesResult<FsEntries<'_>> {
        let base = self.resolve_dir(dir)?;
        if !base.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }

        let walker = WalkDir::new(base)
            .min_depth(1)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .follow_links(false);

        Ok(Box::new(walker.into_iter().filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(FilesError::Walk(e))),
            };
            let kind = if entry.file_type().is_dir() {
                EntryKind::Dir
            } else if entry.file_type().is_file() {
                EntryKind::File
            } else {
                return None;
            };
            let path = self.relative_id(entry.path())?;
            Some(Ok(FsEntry { path, kind }))
        })))
    }

    fn last_modified(&self, path: &str) -> FilesResult<DateTime<Utc>> {
        let metadata = fs::metadata(self.resolve(path)?).map_err(|e| Self::not_found(path, e))?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }

    fn size(&self, path: &str) -> FilesResult<u64> {
        let metadata = fs::metadata(self.resolve(path)?).map_err(|e| Self::not_found(path, e))?;
        Ok(metadata.len())
    }

    fn public_url_base(&self) -> Option<&str> {
        self.public_url_base.as_deref()
    }

    fn rename(&self, from: &str, to: &str) -> FilesResult<()> {
        if from == to {
            return Ok(());
        }
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if !source.is_file() {
            return Err(FilesError::NotFound(from.to_owned()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source, &target)?;
        Ok(())
    }
}
