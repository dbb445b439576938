//! Asset Backing Filesystems
//!
//! This crate provides the key-value style filesystem abstraction the asset store writes
//! through. A backing filesystem maps a relative, `/`-separated *file ID* onto stored bytes and
//! knows nothing about hashes, variants or visibility.
//!
//! ## Design Principles
//!
//! - Paths are always relative to the filesystem root and use `/` separators
//! - Reads and writes are streamed; no operation requires a whole file in memory
//! - Writes land atomically (temporary file in the target directory, then persist)
//! - Listing is lazy and ordered however the underlying storage returns entries
//! - Capabilities that only some adapters have (public URLs) are advertised, not assumed
//!
//! ## Example Usage
//!
//! ```no_run
//! use assets_files::{Filesystem, LocalFilesystem};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let public = LocalFilesystem::new(Path::new("public/assets"), "public")?
//!     .with_public_url_base("/assets");
//!
//! public.write_stream("folder/sam.jpg", &mut &b"bytes"[..])?;
//! assert!(public.has("folder/sam.jpg")?);
//! # Ok(())
//! # }
//! ```

mod filesystem;
mod local;

pub use filesystem::{parent_dir, validate_relative, EntryKind, FsEntry, Filesystem, FsEntries};
pub use local::LocalFilesystem;

/// Errors that can occur during backing filesystem operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Path validation failed (potential directory traversal or unsafe path)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No file is stored under the requested path
    #[error("File not found: {0}")]
    NotFound(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised while walking a directory tree
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type for backing filesystem operations.
pub type FilesResult<T> = Result<T, FilesError>;
