//! Bulk maintenance driven by the record store.
//!
//! Both helpers walk every record at one stage and keep going past individual failures; the
//! report says how many records fell into each bucket.

use crate::records::{FileRecord, RecordStore};
use crate::store::AssetStore;
use crate::{AssetError, AssetResult};
use assets_fileid::legacy::RESAMPLED_DIR;
use assets_fileid::naming::{join_dir, split_filename};
use assets_fileid::{FileIdHelper, LegacyFileIdHelper, ParsedFileId};
use assets_types::{Stage, Visibility};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Records visited.
    pub processed: usize,
    /// Records that had at least one file moved.
    pub migrated: usize,
    pub files_moved: usize,
    /// Records whose original is not stored in either filesystem.
    pub missing: usize,
    pub failed: usize,
}

impl MigrationReport {
    fn record_outcome(&mut self, filename: &str, outcome: AssetResult<Option<usize>>) {
        self.processed += 1;
        match outcome {
            Ok(Some(0)) => {}
            Ok(Some(moved)) => {
                self.migrated += 1;
                self.files_moved += moved;
            }
            Ok(None) => {
                self.missing += 1;
                warn!(filename, "no stored file for record");
            }
            Err(e) => {
                self.failed += 1;
                warn!(filename, error = %e, "migration failed for record");
            }
        }
    }
}

fn records_of(store: &AssetStore) -> AssetResult<Arc<dyn RecordStore>> {
    store
        .records()
        .cloned()
        .ok_or_else(|| AssetError::Misconfiguration("migration needs a record store".into()))
}

/// Moves every recorded file to the file IDs the store's default helpers would give it today.
#[derive(Debug)]
pub struct FileMigrationHelper<'a> {
    store: &'a AssetStore,
    records: Arc<dyn RecordStore>,
}

impl<'a> FileMigrationHelper<'a> {
    /// # Errors
    ///
    /// Returns [`AssetError::Misconfiguration`] if the store has no record store.
    pub fn new(store: &'a AssetStore) -> AssetResult<Self> {
        Ok(Self {
            store,
            records: records_of(store)?,
        })
    }

    pub fn run(&self, stage: Stage) -> AssetResult<MigrationReport> {
        let mut report = MigrationReport::default();
        for record in self.records.list(stage)? {
            let outcome = self.migrate(&record);
            report.record_outcome(&record.filename, outcome);
        }
        info!(%stage, ?report, "file migration finished");
        Ok(report)
    }

    fn migrate(&self, record: &FileRecord) -> AssetResult<Option<usize>> {
        if record.hash.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .normalise(&record.filename, &record.hash)?
            .map(|outcome| outcome.moved))
    }
}

/// Moves thumbnails from the old `_resampled/<method>/.../<name>` layout to current variant
/// file IDs beside their original.
#[derive(Debug)]
pub struct LegacyThumbnailMigrationHelper<'a> {
    store: &'a AssetStore,
    records: Arc<dyn RecordStore>,
    legacy: LegacyFileIdHelper,
}

impl<'a> LegacyThumbnailMigrationHelper<'a> {
    pub fn new(store: &'a AssetStore) -> AssetResult<Self> {
        Ok(Self {
            store,
            records: records_of(store)?,
            legacy: LegacyFileIdHelper::new(),
        })
    }

    pub fn run(&self, stage: Stage) -> AssetResult<MigrationReport> {
        let mut report = MigrationReport::default();
        for record in self.records.list(stage)? {
            let outcome = self.migrate(&record);
            report.record_outcome(&record.filename, outcome);
        }
        info!(%stage, ?report, "legacy thumbnail migration finished");
        Ok(report)
    }

    fn migrate(&self, record: &FileRecord) -> AssetResult<Option<usize>> {
        if record.hash.is_empty() {
            return Ok(None);
        }
        let tuple = ParsedFileId::tuple(record.filename.as_str(), record.hash.as_str(), "");
        for visibility in Visibility::ALL {
            let fs = self.store.filesystem(visibility);
            let strategy = self.store.strategy(visibility);
            if let Some(original) = strategy.search_for_tuple(&tuple, fs.as_ref(), true)? {
                return self.move_thumbnails(visibility, &original).map(Some);
            }
        }
        Ok(None)
    }

    fn move_thumbnails(&self, visibility: Visibility, original: &ParsedFileId) -> AssetResult<usize> {
        let fs = self.store.filesystem(visibility);
        let strategy = self.store.strategy(visibility);
        let resampled = join_dir(split_filename(original.filename()).dir, RESAMPLED_DIR);

        let mut thumbnails = Vec::new();
        for entry in fs.list_contents(&resampled, true)? {
            let entry = entry?;
            if !entry.is_file() || !self.legacy.is_variant_of(&entry.path, original) {
                continue;
            }
            if let Some(parsed) = self.legacy.parse_file_id(&entry.path) {
                if parsed.is_variant() {
                    thumbnails.push(parsed.with_hash(original.hash()));
                }
            }
        }

        let mut moved = 0;
        for thumbnail in &thumbnails {
            let target = strategy.build_file_id(thumbnail);
            if fs.has(&target)? {
                debug!(from = thumbnail.file_id(), to = target, "thumbnail already migrated");
                fs.delete(thumbnail.file_id())?;
            } else {
                fs.rename(thumbnail.file_id(), &target)?;
                moved += 1;
                debug!(from = thumbnail.file_id(), to = target, "migrated thumbnail");
            }
            self.store.hasher().invalidate(thumbnail.file_id(), fs.as_ref());
            self.store.prune_dirs(fs.as_ref(), thumbnail.file_id())?;
        }
        Ok(moved)
    }
}
