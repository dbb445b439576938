//! Boundary to the external record store (the ORM and its draft/live versioning).
//!
//! The asset store never owns file records. It only asks which hash is current for a filename
//! at a stage, and whether an older hash was ever part of that record's history.

use crate::{AssetError, AssetResult};
use assets_fileid::naming::hashes_match;
use assets_types::{Stage, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

/// One historical version of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordVersion {
    pub hash: String,
    #[serde(default)]
    pub was_published: bool,
}

/// A file record as seen at one stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub hash: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[serde(default)]
    pub was_published: bool,
    /// Earlier versions, oldest first.
    #[serde(default)]
    pub history: Vec<RecordVersion>,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            hash: hash.into(),
            variant: String::new(),
            visibility: Visibility::Public,
            was_published: false,
            history: Vec::new(),
        }
    }

    /// Whether `hash` (full or truncated) is the current hash or appears in the history.
    ///
    /// With `require_published`, historical matches only count if that version went live.
    pub fn had_hash(&self, hash: &str, require_published: bool) -> bool {
        if hashes_match(&self.hash, hash) {
            return !require_published || self.was_published;
        }
        self.history.iter().any(|version| {
            hashes_match(&version.hash, hash) && (!require_published || version.was_published)
        })
    }

    /// Replace the current hash, pushing the old one onto the history.
    pub fn push_version(&mut self, hash: impl Into<String>, published: bool) {
        let previous = RecordVersion {
            hash: std::mem::take(&mut self.hash),
            was_published: self.was_published,
        };
        if !previous.hash.is_empty() {
            self.history.push(previous);
        }
        self.hash = hash.into();
        self.was_published = published;
    }
}

/// Read access to file records, plus the writes migration needs.
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// The record for `filename` at `stage`, if any.
    fn lookup_by_filename(&self, filename: &str, stage: Stage) -> AssetResult<Option<FileRecord>>;

    /// Every record at `stage`, in filename order.
    fn list(&self, stage: Stage) -> AssetResult<Vec<FileRecord>>;

    /// Insert or replace the record keyed by `record.filename`.
    fn save(&self, stage: Stage, record: FileRecord) -> AssetResult<()>;

    /// Re-key a record after its file was renamed. Returns whether a record was moved.
    fn rename(&self, stage: Stage, from: &str, to: &str) -> AssetResult<bool>;
}

/// JSON shape of [`InMemoryRecordStore::load_json`] and [`InMemoryRecordStore::save_json`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordSnapshot {
    #[serde(default)]
    draft: Vec<FileRecord>,
    #[serde(default)]
    live: Vec<FileRecord>,
}

/// Records held in memory, optionally loaded from and saved to a JSON file.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    draft: RwLock<BTreeMap<String, FileRecord>>,
    live: RwLock<BTreeMap<String, FileRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records from a JSON file of the form `{"draft": [...], "live": [...]}`.
    ///
    /// A missing file yields an empty store.
    pub fn load_json(path: &Path) -> AssetResult<Self> {
        let store = Self::new();
        if !path.exists() {
            return Ok(store);
        }
        let snapshot: RecordSnapshot = serde_json::from_slice(&fs::read(path)?)?;
        for record in snapshot.draft {
            store.save(Stage::Draft, record)?;
        }
        for record in snapshot.live {
            store.save(Stage::Live, record)?;
        }
        Ok(store)
    }

    /// Write every record back out as pretty JSON.
    pub fn save_json(&self, path: &Path) -> AssetResult<()> {
        let snapshot = RecordSnapshot {
            draft: self.list(Stage::Draft)?,
            live: self.list(Stage::Live)?,
        };
        fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;
        Ok(())
    }

    fn stage(&self, stage: Stage) -> &RwLock<BTreeMap<String, FileRecord>> {
        match stage {
            Stage::Draft => &self.draft,
            Stage::Live => &self.live,
        }
    }

    fn poisoned(stage: Stage) -> AssetError {
        AssetError::Records(format!("{stage} record lock poisoned"))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn lookup_by_filename(&self, filename: &str, stage: Stage) -> AssetResult<Option<FileRecord>> {
        let records = self.stage(stage).read().map_err(|_| Self::poisoned(stage))?;
        Ok(records.get(filename).cloned())
    }

    fn list(&self, stage: Stage) -> AssetResult<Vec<FileRecord>> {
        let records = self.stage(stage).read().map_err(|_| Self::poisoned(stage))?;
        Ok(records.values().cloned().collect())
    }

    fn save(&self, stage: Stage, record: FileRecord) -> AssetResult<()> {
        if record.filename.trim().is_empty() {
            return Err(AssetError::InvalidInput(
                "record filename cannot be empty".into(),
            ));
        }
        let mut records = self.stage(stage).write().map_err(|_| Self::poisoned(stage))?;
        records.insert(record.filename.clone(), record);
        Ok(())
    }

    fn rename(&self, stage: Stage, from: &str, to: &str) -> AssetResult<bool> {
        let mut records = self.stage(stage).write().map_err(|_| Self::poisoned(stage))?;
        let Some(mut record) = records.remove(from) else {
            return Ok(false);
        };
        record.filename = to.to_owned();
        records.insert(to.to_owned(), record);
        Ok(true)
    }
}
