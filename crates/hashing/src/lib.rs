//! Asset Content Hashing
//!
//! Computes content hashes for stored files and caches them so large files are not re-read on
//! every resolution.
//!
//! ## Cache validity
//!
//! Entries are keyed by filesystem identity plus file ID and remember the file's last-modified
//! timestamp at the time the hash was taken. A hit is only honoured while the timestamp still
//! matches, so files changed behind the store's back are rehashed. Entries never expire on
//! their own.
//!
//! ## Example Usage
//!
//! ```no_run
//! use assets_hashing::{FileHashingService, HashAlgorithm};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hasher = FileHashingService::in_memory(HashAlgorithm::Sha1);
//! let hash = hasher.compute_from_stream(&mut &b"A"[..])?;
//! assert!(hasher.compare(&hash, "6dcd4ce23d")?);
//! # Ok(())
//! # }
//! ```

mod cache;
mod service;

pub use cache::{cache_key, CachedHash, HashCache, InMemoryHashCache};
pub use service::{FileHashingService, HashAlgorithm};

use assets_files::FilesError;

/// Errors that can occur while hashing content
#[derive(Debug, thiserror::Error)]
pub enum HashingError {
    /// Caller passed an argument the operation cannot work with
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown hash algorithm name
    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Backing filesystem failure
    #[error(transparent)]
    Files(#[from] FilesError),

    /// I/O error while streaming content
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HashingResult<T> = std::result::Result<T, HashingError>;
