//! The asset store: a public and a protected filesystem, each with its own resolution strategy.
//!
//! Physical presence is the only visibility state. A tuple is public because its file ID exists
//! in the public filesystem, and protected because it exists in the protected one. Moving between
//! the two streams bytes across and is not atomic.

use crate::config::AssetsConfig;
use crate::constants::{DEFAULT_MIME_TYPE, PROTECTED_CACHE_CONTROL};
use crate::grants::{GrantStore, InMemoryGrantStore, SessionId};
use crate::name_generator::AssetNameGenerator;
use crate::records::RecordStore;
use crate::response::AssetResponse;
use crate::strategy::FileResolutionStrategy;
use crate::{AssetError, AssetResult};
use assets_fileid::naming::{hashes_match, join_dir};
use assets_fileid::ParsedFileId;
use assets_files::{parent_dir, validate_relative, Filesystem, LocalFilesystem};
use assets_hashing::FileHashingService;
use assets_types::{AssetTuple, ConflictResolution, Stage, Visibility};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes read from the start of a file for content-based MIME detection.
const MIME_SNIFF_BYTES: u64 = 8192;

/// Per-write options. Unset fields fall back to the store's defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteConfig {
    pub conflict: Option<ConflictResolution>,
    pub visibility: Option<Visibility>,
}

impl WriteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conflict(mut self, conflict: ConflictResolution) -> Self {
        self.conflict = Some(conflict);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssetMetadata {
    pub file_id: String,
    pub visibility: Visibility,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub mime_type: String,
}

/// Modes the store supports, for callers that negotiate features.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreCapabilities {
    pub visibility: Vec<Visibility>,
    pub conflict: Vec<ConflictResolution>,
}

/// Result of moving a tuple to its canonical file IDs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NormaliseOutcome {
    pub tuple: AssetTuple,
    pub visibility: Visibility,
    /// Canonical file ID of the original after normalisation.
    pub file_id: String,
    /// Files moved, the original included.
    pub moved: usize,
}

#[derive(Debug)]
pub struct AssetStore {
    config: AssetsConfig,
    public: Arc<dyn Filesystem>,
    protected: Arc<dyn Filesystem>,
    public_strategy: FileResolutionStrategy,
    protected_strategy: FileResolutionStrategy,
    hasher: Arc<FileHashingService>,
    records: Option<Arc<dyn RecordStore>>,
    grants: Arc<dyn GrantStore>,
}

impl AssetStore {
    /// Wire a store from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::Misconfiguration`] if `config` is invalid or the public filesystem
    /// cannot produce public URLs.
    pub fn new(
        config: AssetsConfig,
        public: Arc<dyn Filesystem>,
        protected: Arc<dyn Filesystem>,
        hasher: Arc<FileHashingService>,
        records: Option<Arc<dyn RecordStore>>,
        grants: Arc<dyn GrantStore>,
    ) -> AssetResult<Self> {
        config.validate()?;
        if public.public_url_base().is_none() {
            return Err(AssetError::Misconfiguration(format!(
                "public filesystem '{}' has no public URL base",
                public.identity()
            )));
        }

        let mut public_strategy = FileResolutionStrategy::from_schemes(
            config.schemes(Visibility::Public),
            Arc::clone(&hasher),
        );
        let mut protected_strategy = FileResolutionStrategy::from_schemes(
            config.schemes(Visibility::Protected),
            Arc::clone(&hasher),
        );
        if let Some(records) = &records {
            public_strategy = public_strategy.with_records(Arc::clone(records));
            protected_strategy = protected_strategy.with_records(Arc::clone(records));
        }

        Ok(Self {
            config,
            public,
            protected,
            public_strategy,
            protected_strategy,
            hasher,
            records,
            grants,
        })
    }

    /// Local-disk store rooted at the configured directories, which are created if missing.
    ///
    /// Hashes are cached and grants held in memory for the lifetime of the store.
    pub fn from_config(
        config: AssetsConfig,
        records: Option<Arc<dyn RecordStore>>,
    ) -> AssetResult<Self> {
        config.validate()?;
        fs::create_dir_all(config.public_dir())?;
        fs::create_dir_all(config.protected_dir())?;

        let public = LocalFilesystem::new(config.public_dir(), Visibility::Public.as_str())?
            .with_public_url_base(config.public_url_base());
        let protected = LocalFilesystem::new(config.protected_dir(), Visibility::Protected.as_str())?;
        let hasher = Arc::new(FileHashingService::in_memory(config.hash_algorithm()));

        info!(
            public = %config.public_dir().display(),
            protected = %config.protected_dir().display(),
            "asset store opened"
        );
        Self::new(
            config,
            Arc::new(public),
            Arc::new(protected),
            hasher,
            records,
            Arc::new(InMemoryGrantStore::new()),
        )
    }

    pub fn config(&self) -> &AssetsConfig {
        &self.config
    }

    pub fn filesystem(&self, visibility: Visibility) -> &Arc<dyn Filesystem> {
        match visibility {
            Visibility::Public => &self.public,
            Visibility::Protected => &self.protected,
        }
    }

    pub fn strategy(&self, visibility: Visibility) -> &FileResolutionStrategy {
        match visibility {
            Visibility::Public => &self.public_strategy,
            Visibility::Protected => &self.protected_strategy,
        }
    }

    pub fn hasher(&self) -> &Arc<FileHashingService> {
        &self.hasher
    }

    pub fn records(&self) -> Option<&Arc<dyn RecordStore>> {
        self.records.as_ref()
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            visibility: Visibility::ALL.to_vec(),
            conflict: ConflictResolution::ALL.to_vec(),
        }
    }

    // Where the tuple is stored, public first. Strict: the original's bytes must match the hash.
    fn locate(
        &self,
        filename: &str,
        hash: &str,
        variant: &str,
    ) -> AssetResult<Option<(Visibility, ParsedFileId)>> {
        let tuple = ParsedFileId::tuple(filename, hash, variant);
        for visibility in Visibility::ALL {
            let fs = self.filesystem(visibility);
            let found = self
                .strategy(visibility)
                .search_for_tuple(&tuple, fs.as_ref(), true)?;
            if let Some(found) = found {
                return Ok(Some((visibility, found)));
            }
        }
        Ok(None)
    }

    fn locate_required(
        &self,
        filename: &str,
        hash: &str,
        variant: &str,
    ) -> AssetResult<(Visibility, ParsedFileId)> {
        self.locate(filename, hash, variant)?.ok_or_else(|| {
            AssetError::NotFound(ParsedFileId::tuple(filename, hash, variant).to_string())
        })
    }

    // Visibility and file ID of whichever filesystem already holds the canonical ID of an
    // original. This is what a write would collide with.
    fn holder_of(&self, filename: &str, hash: &str) -> AssetResult<Option<(Visibility, String)>> {
        let tuple = ParsedFileId::tuple(filename, hash, "");
        for visibility in Visibility::ALL {
            let file_id = self.strategy(visibility).build_file_id(&tuple);
            if self.filesystem(visibility).has(&file_id)? {
                return Ok(Some((visibility, file_id)));
            }
        }
        Ok(None)
    }

    pub fn exists(&self, filename: &str, hash: &str, variant: &str) -> AssetResult<bool> {
        Ok(self.locate(filename, hash, variant)?.is_some())
    }

    /// Which filesystem holds the original, if any.
    pub fn get_visibility(&self, filename: &str, hash: &str) -> AssetResult<Option<Visibility>> {
        Ok(self.locate(filename, hash, "")?.map(|(visibility, _)| visibility))
    }

    pub fn get_as_stream(
        &self,
        filename: &str,
        hash: &str,
        variant: &str,
    ) -> AssetResult<Box<dyn Read + Send>> {
        let (visibility, found) = self.locate_required(filename, hash, variant)?;
        Ok(self.filesystem(visibility).read_stream(found.file_id())?)
    }

    pub fn get_as_bytes(&self, filename: &str, hash: &str, variant: &str) -> AssetResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.get_as_stream(filename, hash, variant)?
            .read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub fn get_as_string(&self, filename: &str, hash: &str, variant: &str) -> AssetResult<String> {
        String::from_utf8(self.get_as_bytes(filename, hash, variant)?).map_err(|e| {
            AssetError::InvalidInput(format!("{filename} is not valid UTF-8: {e}"))
        })
    }

    /// URL a browser can fetch the tuple from.
    ///
    /// Public files use the public filesystem's URL. Protected files are served under the
    /// protected URL base; with `grant` the session is granted access as a side effect.
    pub fn get_as_url(
        &self,
        session: Option<&SessionId>,
        filename: &str,
        hash: &str,
        variant: &str,
        grant: bool,
    ) -> AssetResult<String> {
        let (visibility, found) = self.locate_required(filename, hash, variant)?;
        match visibility {
            Visibility::Public => self.public_url(found.file_id()),
            Visibility::Protected => {
                if grant {
                    if let Some(session) = session {
                        self.grant(session, filename, found.hash())?;
                    }
                }
                Ok(self.protected_url(found.file_id()))
            }
        }
    }

    fn public_url(&self, file_id: &str) -> AssetResult<String> {
        self.public.public_url(file_id).ok_or_else(|| {
            AssetError::Misconfiguration("public filesystem has no public URL base".into())
        })
    }

    fn protected_url(&self, file_id: &str) -> String {
        format!(
            "{}/{}",
            self.config.protected_url_base().trim_end_matches('/'),
            file_id
        )
    }

    pub fn get_metadata(
        &self,
        filename: &str,
        hash: &str,
        variant: &str,
    ) -> AssetResult<Option<AssetMetadata>> {
        let Some((visibility, found)) = self.locate(filename, hash, variant)? else {
            return Ok(None);
        };
        let fs = self.filesystem(visibility);
        Ok(Some(AssetMetadata {
            file_id: found.file_id().to_owned(),
            visibility,
            size: fs.size(found.file_id())?,
            last_modified: fs.last_modified(found.file_id())?,
            mime_type: detect_mime(fs.as_ref(), found.file_id())?,
        }))
    }

    pub fn set_from_string(
        &self,
        data: &str,
        filename: &str,
        hash: Option<&str>,
        variant: Option<&str>,
        config: WriteConfig,
    ) -> AssetResult<AssetTuple> {
        self.set_from_stream(&mut data.as_bytes(), filename, hash, variant, config)
    }

    /// Store a file from local disk. Without `filename` the local file's name is used.
    pub fn set_from_local_file(
        &self,
        path: &Path,
        filename: Option<&str>,
        hash: Option<&str>,
        variant: Option<&str>,
        config: WriteConfig,
    ) -> AssetResult<AssetTuple> {
        if !path.is_file() {
            return Err(AssetError::InvalidInput(format!(
                "local file does not exist: {}",
                path.display()
            )));
        }
        let filename = match filename {
            Some(filename) => filename.to_owned(),
            None => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
                .ok_or_else(|| {
                    AssetError::InvalidInput(format!("no usable filename in {}", path.display()))
                })?,
        };
        let mut file = fs::File::open(path)?;
        self.set_from_stream(&mut file, &filename, hash, variant, config)
    }

    /// Store bytes read from `reader` and return the tuple they were stored under.
    ///
    /// Originals are hashed while being buffered to a temporary file, so `reader` is read once.
    /// A supplied `hash` must match the content. Variants need the original's hash and are
    /// written beside it without rehashing.
    ///
    /// # Errors
    ///
    /// - [`AssetError::InvalidInput`] for an empty filename, a variant without a hash, a
    ///   `rename` conflict mode on a variant, or a supplied hash that does not match.
    /// - [`AssetError::FileAlreadyExists`] under the `exception` conflict mode.
    /// - [`AssetError::NamingExhausted`] when `rename` runs out of candidates.
    pub fn set_from_stream(
        &self,
        reader: &mut dyn Read,
        filename: &str,
        hash: Option<&str>,
        variant: Option<&str>,
        config: WriteConfig,
    ) -> AssetResult<AssetTuple> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(AssetError::InvalidInput("filename cannot be empty".into()));
        }
        let filename = self.public_strategy.default_helper().clean_filename(filename);
        let hash = hash.map(str::trim).filter(|h| !h.is_empty());
        let variant = variant.map(str::trim).unwrap_or_default();

        if variant.is_empty() {
            self.write_original(reader, &filename, hash, config)
        } else {
            self.write_variant(reader, &filename, hash, variant, config)
        }
    }

    fn write_variant(
        &self,
        reader: &mut dyn Read,
        filename: &str,
        hash: Option<&str>,
        variant: &str,
        config: WriteConfig,
    ) -> AssetResult<AssetTuple> {
        let hash = hash.ok_or_else(|| {
            AssetError::InvalidInput(format!("variant {variant} of {filename} needs a hash"))
        })?;
        let conflict = config
            .conflict
            .unwrap_or(ConflictResolution::default_for(true));
        if conflict == ConflictResolution::Rename {
            return Err(AssetError::InvalidInput(
                "conflict mode 'rename' only applies to original files".into(),
            ));
        }

        let (visibility, mut original) = self.locate_required(filename, hash, "")?;
        let strategy = self.strategy(visibility);
        if original.file_id() != strategy.build_file_id(&original) {
            // Variants are written under the default helper, so the original must live there too.
            self.normalise_located(visibility, &original)?;
            original = original.with_file_id(strategy.build_file_id(&original));
        }

        let tuple = original.with_variant(variant);
        let file_id = strategy.build_file_id(&tuple);
        let fs = self.filesystem(visibility);
        if fs.has(&file_id)? {
            match conflict {
                ConflictResolution::Exception => {
                    return Err(AssetError::FileAlreadyExists(file_id));
                }
                ConflictResolution::UseExisting => return Ok(tuple.to_tuple()),
                ConflictResolution::Overwrite | ConflictResolution::Rename => {}
            }
        }

        let written = fs.write_stream(&file_id, reader)?;
        debug!(file_id, %visibility, bytes = written, "wrote variant");
        Ok(tuple.to_tuple())
    }

    fn write_original(
        &self,
        reader: &mut dyn Read,
        filename: &str,
        hash: Option<&str>,
        config: WriteConfig,
    ) -> AssetResult<AssetTuple> {
        let conflict = config
            .conflict
            .unwrap_or(ConflictResolution::default_for(false));

        let mut staged = tempfile::tempfile()?;
        let (computed, size) = self.hasher.compute_while_copying(reader, &mut staged)?;
        if let Some(expected) = hash {
            if !self.hasher.compare(&computed, expected)? {
                return Err(AssetError::InvalidInput(format!(
                    "hash {expected} does not match content hash {computed} of {filename}"
                )));
            }
        }

        let filename = match conflict {
            ConflictResolution::Rename => self.free_filename(filename, &computed, None)?,
            _ => filename.to_owned(),
        };

        let holder = self.holder_of(&filename, &computed)?;
        if let Some((visibility, file_id)) = &holder {
            match conflict {
                ConflictResolution::Exception => {
                    return Err(AssetError::FileAlreadyExists(file_id.clone()));
                }
                ConflictResolution::UseExisting => {
                    let fs = self.filesystem(*visibility);
                    let existing = self.hasher.compute_from_file(file_id, fs.as_ref())?;
                    debug!(file_id, "keeping existing file");
                    return Ok(AssetTuple::new(filename, existing, ""));
                }
                ConflictResolution::Overwrite | ConflictResolution::Rename => {}
            }
        }

        let visibility = holder
            .as_ref()
            .map(|(visibility, _)| *visibility)
            .or(config.visibility)
            .unwrap_or(self.config.default_visibility());
        let stale = match &holder {
            Some((visibility, file_id)) => {
                self.stale_variants(*visibility, file_id, &filename, &computed)?
            }
            None => Vec::new(),
        };

        let fs = self.filesystem(visibility);
        let tuple = ParsedFileId::tuple(&filename, &computed, "");
        let file_id = self.strategy(visibility).build_file_id(&tuple);
        staged.seek(SeekFrom::Start(0))?;
        fs.write_stream(&file_id, &mut staged)?;
        self.hasher.set(&file_id, fs.as_ref(), &computed)?;
        info!(file_id, %visibility, bytes = size, "stored file");

        for stale_id in &stale {
            fs.delete(stale_id)?;
            self.hasher.invalidate(stale_id, fs.as_ref());
            self.prune_dirs(fs.as_ref(), stale_id)?;
            debug!(file_id = stale_id, "deleted variant of replaced content");
        }

        if let Some(wanted) = config.visibility {
            if wanted != visibility {
                self.move_visibility(&filename, &computed, visibility, wanted)?;
            }
        }
        Ok(tuple.to_tuple())
    }

    // Variants of the content currently at `file_id`, if that content is about to be replaced
    // by something with a different hash.
    fn stale_variants(
        &self,
        visibility: Visibility,
        file_id: &str,
        filename: &str,
        new_hash: &str,
    ) -> AssetResult<Vec<String>> {
        let fs = self.filesystem(visibility);
        let old_hash = self.hasher.compute_from_file(file_id, fs.as_ref())?;
        if hashes_match(&old_hash, new_hash) {
            return Ok(Vec::new());
        }
        let old = ParsedFileId::tuple(filename, old_hash, "");
        self.strategy(visibility)
            .find_variants(&old, fs.as_ref())?
            .filter_map(|entry| match entry {
                Ok(entry) if entry.is_variant() => Some(Ok(entry.file_id().to_owned())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .collect()
    }

    // First name from the generator that no stored original with `hash` already uses.
    // `current` is the name being moved away from, which never counts as taken.
    fn free_filename(
        &self,
        filename: &str,
        hash: &str,
        current: Option<&str>,
    ) -> AssetResult<String> {
        let generator = AssetNameGenerator::new(
            filename,
            self.config.version_prefix(),
            self.config.rename_attempts(),
        );
        for candidate in generator.candidates() {
            if current.is_some_and(|current| current.eq_ignore_ascii_case(&candidate)) {
                return Ok(candidate);
            }
            if self.holder_of(&candidate, hash)?.is_none() {
                return Ok(candidate);
            }
            debug!(candidate, "filename taken");
        }
        Err(AssetError::NamingExhausted {
            filename: filename.to_owned(),
            attempts: generator.max_tries(),
        })
    }

    /// Move a protected tuple and all of its variants to the public filesystem.
    ///
    /// Returns the number of files moved; zero when nothing protected matched.
    pub fn publish(&self, filename: &str, hash: &str) -> AssetResult<usize> {
        self.move_visibility(filename, hash, Visibility::Protected, Visibility::Public)
    }

    /// Move a public tuple and all of its variants to the protected filesystem.
    pub fn protect(&self, filename: &str, hash: &str) -> AssetResult<usize> {
        self.move_visibility(filename, hash, Visibility::Public, Visibility::Protected)
    }

    fn move_visibility(
        &self,
        filename: &str,
        hash: &str,
        from: Visibility,
        to: Visibility,
    ) -> AssetResult<usize> {
        let (from_fs, to_fs) = (self.filesystem(from), self.filesystem(to));
        let original = ParsedFileId::tuple(filename, hash, "");
        let Some(found) = self
            .strategy(from)
            .search_for_tuple(&original, from_fs.as_ref(), true)?
        else {
            debug!(filename, hash, %from, "nothing to move");
            return Ok(0);
        };

        let entries = self
            .strategy(from)
            .find_variants(&found, from_fs.as_ref())?
            .collect::<AssetResult<Vec<_>>>()?;
        for entry in &entries {
            let target = self.strategy(to).build_file_id(entry);
            let mut reader = from_fs.read_stream(entry.file_id())?;
            to_fs.write_stream(&target, &mut reader)?;
            drop(reader);
            from_fs.delete(entry.file_id())?;
            self.hasher
                .move_hash(from_fs.as_ref(), entry.file_id(), to_fs.as_ref(), &target)?;
            self.prune_dirs(from_fs.as_ref(), entry.file_id())?;
            debug!(from = entry.file_id(), to = target, "moved file");
        }

        info!(filename, %from, %to, moved = entries.len(), "changed visibility");
        Ok(entries.len())
    }

    /// Delete the original and every variant from whichever filesystem holds them.
    ///
    /// Returns whether anything was deleted; deleting a missing tuple is not an error.
    pub fn delete(&self, filename: &str, hash: &str) -> AssetResult<bool> {
        Ok(self.delete_matching(filename, hash, false)? > 0)
    }

    /// Delete every variant of a tuple but keep the original. Returns the number deleted.
    pub fn delete_variants(&self, filename: &str, hash: &str) -> AssetResult<usize> {
        self.delete_matching(filename, hash, true)
    }

    fn delete_matching(
        &self,
        filename: &str,
        hash: &str,
        variants_only: bool,
    ) -> AssetResult<usize> {
        let original = ParsedFileId::tuple(filename, hash, "");
        let mut deleted = 0;
        for visibility in Visibility::ALL {
            let fs = self.filesystem(visibility);
            let strategy = self.strategy(visibility);
            let Some(found) = strategy.search_for_tuple(&original, fs.as_ref(), true)? else {
                continue;
            };
            let entries = strategy
                .find_variants(&found, fs.as_ref())?
                .collect::<AssetResult<Vec<_>>>()?;
            for entry in entries
                .iter()
                .filter(|entry| !variants_only || entry.is_variant())
            {
                fs.delete(entry.file_id())?;
                self.hasher.invalidate(entry.file_id(), fs.as_ref());
                self.prune_dirs(fs.as_ref(), entry.file_id())?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(filename, hash, deleted, variants_only, "deleted files");
        }
        Ok(deleted)
    }

    /// Re-key a tuple and its variants under `new_filename`. Returns the name actually used.
    ///
    /// A taken name is resolved with the same `-vN` generator as the `rename` conflict mode.
    /// Records at both stages follow the move.
    pub fn rename(&self, filename: &str, hash: &str, new_filename: &str) -> AssetResult<String> {
        self.rekey(filename, hash, new_filename, false)
    }

    /// Like [`rename`](Self::rename) but leaves the source in place.
    pub fn copy(&self, filename: &str, hash: &str, new_filename: &str) -> AssetResult<String> {
        self.rekey(filename, hash, new_filename, true)
    }

    fn rekey(
        &self,
        filename: &str,
        hash: &str,
        new_filename: &str,
        keep_source: bool,
    ) -> AssetResult<String> {
        let new_filename = new_filename.trim();
        if new_filename.is_empty() {
            return Err(AssetError::InvalidInput("new filename cannot be empty".into()));
        }
        let new_filename = self
            .public_strategy
            .default_helper()
            .clean_filename(new_filename);
        if new_filename == filename {
            return Ok(new_filename);
        }

        let (visibility, found) = self.locate_required(filename, hash, "")?;
        let current = (!keep_source).then_some(filename);
        let chosen = self.free_filename(&new_filename, found.hash(), current)?;

        let fs = self.filesystem(visibility);
        let strategy = self.strategy(visibility);
        let entries = strategy
            .find_variants(&found, fs.as_ref())?
            .collect::<AssetResult<Vec<_>>>()?;
        for entry in &entries {
            let target = strategy.build_file_id(&entry.with_filename(chosen.as_str()));
            if keep_source {
                fs.copy(entry.file_id(), &target)?;
                self.hasher
                    .copy_hash(fs.as_ref(), entry.file_id(), fs.as_ref(), &target)?;
            } else {
                move_within(fs.as_ref(), entry.file_id(), &target)?;
                self.hasher
                    .move_hash(fs.as_ref(), entry.file_id(), fs.as_ref(), &target)?;
                self.prune_dirs(fs.as_ref(), entry.file_id())?;
            }
            debug!(from = entry.file_id(), to = target, keep_source, "re-keyed file");
        }

        if !keep_source {
            if let Some(records) = &self.records {
                for stage in [Stage::Draft, Stage::Live] {
                    records.rename(stage, filename, &chosen)?;
                }
            }
        }
        info!(from = filename, to = chosen, keep_source, "re-keyed tuple");
        Ok(chosen)
    }

    // Grants are keyed by the original's canonical protected file ID, so any variant or any
    // spelling of the hash maps to the same entry.
    fn grant_key(&self, filename: &str, hash: &str) -> String {
        self.protected_strategy
            .build_file_id(&ParsedFileId::tuple(filename, hash, ""))
    }

    pub fn grant(&self, session: &SessionId, filename: &str, hash: &str) -> AssetResult<()> {
        if filename.trim().is_empty() {
            return Err(AssetError::InvalidInput("filename cannot be empty".into()));
        }
        let key = self.grant_key(filename, hash);
        debug!(%session, file_id = key, "granted");
        self.grants.grant(session, &key);
        Ok(())
    }

    pub fn revoke(&self, session: &SessionId, filename: &str, hash: &str) {
        self.grants.revoke(session, &self.grant_key(filename, hash));
    }

    pub fn is_granted(&self, session: &SessionId, filename: &str, hash: &str) -> bool {
        self.grants
            .is_granted(session, &self.grant_key(filename, hash))
    }

    /// Public files are always viewable; protected files only with a grant for `session`.
    pub fn can_view(
        &self,
        session: Option<&SessionId>,
        filename: &str,
        hash: &str,
    ) -> AssetResult<bool> {
        Ok(match self.get_visibility(filename, hash)? {
            Some(Visibility::Public) => true,
            Some(Visibility::Protected) => {
                session.is_some_and(|session| self.is_granted(session, filename, hash))
            }
            None => false,
        })
    }

    /// Move a stored tuple and its variants to the default helper's file IDs.
    ///
    /// Returns `None` when the tuple is not stored anywhere.
    pub fn normalise(&self, filename: &str, hash: &str) -> AssetResult<Option<NormaliseOutcome>> {
        let Some((visibility, found)) = self.locate(filename, hash, "")? else {
            return Ok(None);
        };
        let moved = self.normalise_located(visibility, &found)?;
        Ok(Some(NormaliseOutcome {
            tuple: found.to_tuple(),
            visibility,
            file_id: self.strategy(visibility).build_file_id(&found),
            moved,
        }))
    }

    /// Normalise whatever tuple a raw file ID resolves to.
    pub fn normalise_path(&self, file_id: &str) -> AssetResult<Option<NormaliseOutcome>> {
        validate_relative(file_id)?;
        for visibility in Visibility::ALL {
            let fs = self.filesystem(visibility);
            if let Some(resolved) = self
                .strategy(visibility)
                .resolve_file_id(file_id, fs.as_ref())?
            {
                return self.normalise(resolved.filename(), resolved.hash());
            }
        }
        Ok(None)
    }

    fn normalise_located(&self, visibility: Visibility, found: &ParsedFileId) -> AssetResult<usize> {
        let fs = self.filesystem(visibility);
        let strategy = self.strategy(visibility);
        let entries = strategy
            .find_variants(found, fs.as_ref())?
            .collect::<AssetResult<Vec<_>>>()?;

        let mut moved = 0;
        for entry in &entries {
            let target = strategy.build_file_id(entry);
            if target == entry.file_id() {
                continue;
            }
            if fs.has(&target)? && !target.eq_ignore_ascii_case(entry.file_id()) {
                warn!(
                    from = entry.file_id(),
                    to = target,
                    "canonical copy already exists; dropping duplicate"
                );
                fs.delete(entry.file_id())?;
                self.hasher.invalidate(entry.file_id(), fs.as_ref());
            } else {
                move_within(fs.as_ref(), entry.file_id(), &target)?;
                self.hasher
                    .move_hash(fs.as_ref(), entry.file_id(), fs.as_ref(), &target)?;
                moved += 1;
            }
            self.prune_dirs(fs.as_ref(), entry.file_id())?;
            debug!(from = entry.file_id(), to = target, "normalised file");
        }
        Ok(moved)
    }

    // Remove now-empty directories from the parent of `file_id` upwards.
    pub(crate) fn prune_dirs(&self, fs: &dyn Filesystem, file_id: &str) -> AssetResult<()> {
        if self.config.keep_empty_dirs() {
            return Ok(());
        }
        let mut dir = parent_dir(file_id);
        while !dir.is_empty() {
            if !fs.delete_dir_if_empty(dir)? {
                break;
            }
            dir = parent_dir(dir);
        }
        Ok(())
    }

    /// Decide the HTTP answer for a raw file ID requested by `session`.
    ///
    /// In order: a public file is streamed; a protected file is streamed if granted; a file ID
    /// that resolves (or soft-resolves against live records) to another public file redirects;
    /// one that resolves to a granted protected file redirects; an ungranted protected match is
    /// denied; anything else is missing. Denied and missing share a code unless configured
    /// otherwise, so protected files do not leak their existence.
    pub fn get_response_for(
        &self,
        session: Option<&SessionId>,
        file_id: &str,
    ) -> AssetResult<AssetResponse> {
        let file_id = file_id.trim_start_matches('/');
        if validate_relative(file_id).is_err() {
            debug!(file_id, "rejected unsafe file ID");
            return Ok(AssetResponse::error(self.config.missing_code()));
        }

        if self.public.has(file_id)? {
            return self.stream_response(Visibility::Public, file_id);
        }

        let protected_fs = self.protected.as_ref();
        let mut denied = false;
        if protected_fs.has(file_id)? {
            let tuple = match self.protected_strategy.resolve_file_id(file_id, protected_fs)? {
                Some(resolved) => Some(resolved),
                None => self.protected_strategy.parse_file_id(file_id),
            };
            if tuple.is_some_and(|tuple| self.session_may_view(session, &tuple)) {
                return Ok(self
                    .stream_response(Visibility::Protected, file_id)?
                    .with_header("Cache-Control", PROTECTED_CACHE_CONTROL));
            }
            denied = true;
        }

        let public_fs = self.public.as_ref();
        let public_match = match self.public_strategy.resolve_file_id(file_id, public_fs)? {
            Some(found) => Some(found),
            None => self
                .public_strategy
                .with_stage(Stage::Live, |s| s.soft_resolve_file_id(file_id, public_fs))?,
        };
        if let Some(found) = public_match.filter(|found| found.file_id() != file_id) {
            debug!(from = file_id, to = found.file_id(), "redirecting to public file");
            return Ok(AssetResponse::redirect(
                self.config.redirect_code(),
                self.public_url(found.file_id())?,
            ));
        }

        let protected_match = match self
            .protected_strategy
            .resolve_file_id(file_id, protected_fs)?
        {
            Some(found) => Some(found),
            None => self
                .protected_strategy
                .with_stage(Stage::Draft, |s| s.soft_resolve_file_id(file_id, protected_fs))?,
        };
        if let Some(found) = protected_match.filter(|found| found.file_id() != file_id) {
            if self.session_may_view(session, &found) {
                debug!(from = file_id, to = found.file_id(), "redirecting to protected file");
                return Ok(AssetResponse::redirect(
                    self.config.redirect_code(),
                    self.protected_url(found.file_id()),
                ));
            }
            denied = true;
        }

        let status = if denied {
            self.config.denied_code()
        } else {
            self.config.missing_code()
        };
        debug!(file_id, status, denied, "no servable file");
        Ok(AssetResponse::error(status))
    }

    fn session_may_view(&self, session: Option<&SessionId>, tuple: &ParsedFileId) -> bool {
        session.is_some_and(|session| self.is_granted(session, tuple.filename(), tuple.hash()))
    }

    fn stream_response(&self, visibility: Visibility, file_id: &str) -> AssetResult<AssetResponse> {
        let fs = self.filesystem(visibility);
        let size = fs.size(file_id)?;
        let body = fs.read_stream(file_id)?;
        Ok(AssetResponse::stream(body, mime_from_extension(file_id))
            .with_header("Content-Length", size.to_string()))
    }
}

// Rename inside one filesystem. Moves that only change letter case go through a temporary name
// so case-insensitive filesystems do not treat them as a no-op.
fn move_within(fs: &dyn Filesystem, from: &str, to: &str) -> AssetResult<()> {
    if from == to {
        return Ok(());
    }
    if from.eq_ignore_ascii_case(to) {
        let temporary = join_dir(
            parent_dir(to),
            &format!(".{}.tmp", uuid::Uuid::new_v4().simple()),
        );
        fs.rename(from, &temporary)?;
        fs.rename(&temporary, to)?;
    } else {
        fs.rename(from, to)?;
    }
    Ok(())
}

fn detect_mime(fs: &dyn Filesystem, file_id: &str) -> AssetResult<String> {
    let mut head = Vec::new();
    fs.read_stream(file_id)?
        .take(MIME_SNIFF_BYTES)
        .read_to_end(&mut head)?;
    Ok(infer::get(&head)
        .map(|kind| kind.mime_type().to_owned())
        .unwrap_or_else(|| mime_from_extension(file_id).to_owned()))
}

/// MIME type guessed from a file ID's last extension.
pub fn mime_from_extension(file_id: &str) -> &'static str {
    let basename = file_id.rsplit('/').next().unwrap_or(file_id);
    let extension = basename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => DEFAULT_MIME_TYPE,
    }
}
