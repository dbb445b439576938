//! The hashing service.

use crate::cache::{cache_key, CachedHash, HashCache, InMemoryHashCache};
use crate::{HashingError, HashingResult};
use assets_files::Filesystem;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

const BUFFER_SIZE: usize = 64 * 1024;

/// Digest used for content hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashingError;

    fn from_str(s: &str) -> HashingResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(HashingError::UnknownAlgorithm(other.to_owned())),
        }
    }
}

/// Streams `reader` through digest `D`, optionally teeing every chunk into `sink`.
fn digest_stream<D: Digest>(
    reader: &mut dyn Read,
    mut sink: Option<&mut dyn Write>,
) -> HashingResult<(String, u64)> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        if let Some(sink) = sink.as_mut() {
            sink.write_all(&buffer[..read])?;
        }
        total += read as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

/// Computes content hashes and caches them per `(filesystem, file ID)`.
#[derive(Debug, Clone)]
pub struct FileHashingService {
    cache: Arc<dyn HashCache>,
    algorithm: HashAlgorithm,
}

impl FileHashingService {
    pub fn new(cache: Arc<dyn HashCache>, algorithm: HashAlgorithm) -> Self {
        Self { cache, algorithm }
    }

    /// A service with a fresh process-local cache.
    pub fn in_memory(algorithm: HashAlgorithm) -> Self {
        Self::new(Arc::new(InMemoryHashCache::new()), algorithm)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn cache(&self) -> &Arc<dyn HashCache> {
        &self.cache
    }

    /// Hashes everything `reader` yields. Always reads the full stream; never cached.
    pub fn compute_from_stream(&self, reader: &mut dyn Read) -> HashingResult<String> {
        self.digest(reader, None).map(|(hash, _)| hash)
    }

    /// Hashes `reader` while copying it into `sink`, returning the hash and bytes copied.
    ///
    /// Used to buffer non-seekable input into a temporary file in a single pass.
    pub fn compute_while_copying(
        &self,
        reader: &mut dyn Read,
        sink: &mut dyn Write,
    ) -> HashingResult<(String, u64)> {
        self.digest(reader, Some(sink))
    }

    fn digest(
        &self,
        reader: &mut dyn Read,
        sink: Option<&mut dyn Write>,
    ) -> HashingResult<(String, u64)> {
        match self.algorithm {
            HashAlgorithm::Sha1 => digest_stream::<Sha1>(reader, sink),
            HashAlgorithm::Sha256 => digest_stream::<Sha256>(reader, sink),
        }
    }

    /// Hash of `file_id` in `fs`, served from the cache while the file's timestamp is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`HashingError::Files`] if the file is missing or unreadable.
    pub fn compute_from_file(&self, file_id: &str, fs: &dyn Filesystem) -> HashingResult<String> {
        let key = cache_key(fs, file_id);
        let timestamp = fs.last_modified(file_id)?;

        if let Some(cached) = self.cache.get(&key) {
            if cached.timestamp == timestamp {
                return Ok(cached.hash);
            }
            tracing::debug!(file_id, fs = fs.identity(), "cached hash is stale; rehashing");
        }

        let mut reader = fs.read_stream(file_id)?;
        let hash = self.compute_from_stream(&mut reader)?;
        self.cache.set(
            &key,
            CachedHash {
                timestamp,
                hash: hash.clone(),
            },
        );
        Ok(hash)
    }

    /// Whether one hash is a prefix of the other, so a full hash matches its truncated form.
    ///
    /// # Errors
    ///
    /// Returns [`HashingError::InvalidArgument`] if either hash is empty.
    pub fn compare(&self, one: &str, two: &str) -> HashingResult<bool> {
        if one.is_empty() || two.is_empty() {
            return Err(HashingError::InvalidArgument(
                "cannot compare an empty hash".into(),
            ));
        }
        Ok(one.starts_with(two) || two.starts_with(one))
    }

    /// Records `hash` for `file_id` at the file's current timestamp, e.g. right after a write.
    pub fn set(&self, file_id: &str, fs: &dyn Filesystem, hash: &str) -> HashingResult<()> {
        let timestamp = fs.last_modified(file_id)?;
        self.cache.set(
            &cache_key(fs, file_id),
            CachedHash {
                timestamp,
                hash: hash.to_owned(),
            },
        );
        Ok(())
    }

    /// Forgets any cached hash for `file_id`.
    pub fn invalidate(&self, file_id: &str, fs: &dyn Filesystem) {
        self.cache.remove(&cache_key(fs, file_id));
    }

    /// Moves a cached hash to a new location without rehashing.
    ///
    /// Call after the file itself has moved: the entry is re-stamped with the destination's
    /// timestamp. Returns `false` when there was nothing cached to move.
    pub fn move_hash(
        &self,
        from_fs: &dyn Filesystem,
        from_id: &str,
        to_fs: &dyn Filesystem,
        to_id: &str,
    ) -> HashingResult<bool> {
        let Some(cached) = self.cache.remove(&cache_key(from_fs, from_id)) else {
            return Ok(false);
        };
        self.set(to_id, to_fs, &cached.hash)?;
        Ok(true)
    }

    /// Like [`move_hash`](Self::move_hash) but keeps the source entry.
    pub fn copy_hash(
        &self,
        from_fs: &dyn Filesystem,
        from_id: &str,
        to_fs: &dyn Filesystem,
        to_id: &str,
    ) -> HashingResult<bool> {
        let Some(cached) = self.cache.get(&cache_key(from_fs, from_id)) else {
            return Ok(false);
        };
        self.set(to_id, to_fs, &cached.hash)?;
        Ok(true)
    }
}
