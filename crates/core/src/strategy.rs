//! Resolving file IDs and tuples against one backing filesystem.
//!
//! A strategy pairs a *default* helper, which names every new file, with an ordered list of
//! *resolution* helpers that recognise the shapes older files may still have on disk. Trying
//! old formats first or last is a deployment decision, so the order is configuration.

use crate::config::SchemeConfig;
use crate::records::RecordStore;
use crate::AssetResult;
use assets_fileid::naming::hashes_match;
use assets_fileid::{FileIdHelper, ParsedFileId};
use assets_files::Filesystem;
use assets_hashing::FileHashingService;
use assets_types::Stage;
use std::sync::Arc;
use tracing::debug;

/// Lazy, finite enumeration of an original and its variants.
///
/// Not restartable; call [`FileResolutionStrategy::find_variants`] again to enumerate again.
/// Order follows the filesystem listing and must not be relied upon.
pub type VariantIter<'a> = Box<dyn Iterator<Item = AssetResult<ParsedFileId>> + 'a>;

#[derive(Debug, Clone)]
pub struct FileResolutionStrategy {
    default_helper: Arc<dyn FileIdHelper>,
    resolution_helpers: Vec<Arc<dyn FileIdHelper>>,
    stage: Stage,
    hasher: Arc<FileHashingService>,
    records: Option<Arc<dyn RecordStore>>,
}

impl FileResolutionStrategy {
    pub fn new(
        default_helper: Arc<dyn FileIdHelper>,
        resolution_helpers: Vec<Arc<dyn FileIdHelper>>,
        hasher: Arc<FileHashingService>,
    ) -> Self {
        Self {
            default_helper,
            resolution_helpers,
            stage: Stage::default(),
            hasher,
            records: None,
        }
    }

    pub fn from_schemes(schemes: &SchemeConfig, hasher: Arc<FileHashingService>) -> Self {
        Self::new(
            schemes.default.helper(),
            schemes.resolution.iter().map(|scheme| scheme.helper()).collect(),
            hasher,
        )
    }

    /// Attach the record store consulted by [`soft_resolve_file_id`](Self::soft_resolve_file_id).
    pub fn with_records(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn default_helper(&self) -> &Arc<dyn FileIdHelper> {
        &self.default_helper
    }

    pub fn resolution_helpers(&self) -> &[Arc<dyn FileIdHelper>] {
        &self.resolution_helpers
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run `f` against a copy of this strategy scoped to `stage`.
    pub fn with_stage<T>(&self, stage: Stage, f: impl FnOnce(&Self) -> T) -> T {
        let scoped = Self {
            stage,
            ..self.clone()
        };
        f(&scoped)
    }

    /// Canonical file ID of `tuple` under the default helper.
    pub fn build_file_id(&self, tuple: &ParsedFileId) -> String {
        self.default_helper.build_from(tuple)
    }

    /// Parses `file_id` with the first resolution helper that recognises its shape.
    pub fn parse_file_id(&self, file_id: &str) -> Option<ParsedFileId> {
        self.claim(file_id).map(|(_, parsed)| parsed)
    }

    /// Helpers tried when searching for a tuple: the default first, then each resolution
    /// helper whose scheme has not already been tried.
    fn search_helpers(&self) -> impl Iterator<Item = &Arc<dyn FileIdHelper>> {
        let default_scheme = self.default_helper.scheme();
        std::iter::once(&self.default_helper).chain(
            self.resolution_helpers
                .iter()
                .filter(move |helper| helper.scheme() != default_scheme),
        )
    }

    // The first helper that parses claims the input; later helpers are never consulted.
    fn claim(&self, file_id: &str) -> Option<(&Arc<dyn FileIdHelper>, ParsedFileId)> {
        let helpers: &[Arc<dyn FileIdHelper>] = if self.resolution_helpers.is_empty() {
            std::slice::from_ref(&self.default_helper)
        } else {
            &self.resolution_helpers
        };
        helpers
            .iter()
            .find_map(|helper| helper.parse_file_id(file_id).map(|parsed| (helper, parsed)))
    }

    /// Finds where `tuple` is physically stored, trying the default helper then each resolution
    /// helper.
    ///
    /// With `strict` and a non-empty hash, a location only counts if the content of the
    /// original at that location actually hashes to the tuple's hash; the returned tuple then
    /// carries the full hash. A mismatch is a miss, not an error.
    pub fn search_for_tuple(
        &self,
        tuple: &ParsedFileId,
        fs: &dyn Filesystem,
        strict: bool,
    ) -> AssetResult<Option<ParsedFileId>> {
        for helper in self.search_helpers() {
            if helper.uses_hash() && tuple.hash().is_empty() {
                continue;
            }
            let file_id = helper.build_from(tuple);
            if !fs.has(&file_id)? {
                continue;
            }

            if strict && !tuple.hash().is_empty() {
                match self.verify_hash(helper.as_ref(), tuple, fs)? {
                    Some(full_hash) => {
                        return Ok(Some(tuple.with_hash(full_hash).with_file_id(file_id)));
                    }
                    None => {
                        debug!(file_id, scheme = %helper.scheme(), "hash mismatch; skipping");
                        continue;
                    }
                }
            }
            return Ok(Some(tuple.with_file_id(file_id)));
        }
        Ok(None)
    }

    // Hash of the original `helper` would store `tuple` under, if it matches the tuple's hash.
    fn verify_hash(
        &self,
        helper: &dyn FileIdHelper,
        tuple: &ParsedFileId,
        fs: &dyn Filesystem,
    ) -> AssetResult<Option<String>> {
        let original_id = helper.build_file_id(tuple.filename(), tuple.hash(), "");
        if !fs.has(&original_id)? {
            return Ok(None);
        }
        let actual = self.hasher.compute_from_file(&original_id, fs)?;
        Ok(self.hasher.compare(&actual, tuple.hash())?.then_some(actual))
    }

    /// Resolves a raw file ID to the tuple it names and that tuple's canonical location.
    ///
    /// The first resolution helper that parses `file_id` claims it. If nothing matching is
    /// stored, the result is `None` without trying other helpers. A hashless parse picks up its
    /// hash from the original stored next to it.
    pub fn resolve_file_id(
        &self,
        file_id: &str,
        fs: &dyn Filesystem,
    ) -> AssetResult<Option<ParsedFileId>> {
        let Some((helper, mut parsed)) = self.claim(file_id) else {
            return Ok(None);
        };

        if parsed.hash().is_empty() {
            let original_id = helper.build_file_id(parsed.filename(), "", "");
            if fs.has(&original_id)? {
                parsed = parsed.with_hash(self.hasher.compute_from_file(&original_id, fs)?);
            }
        }

        let found = self.search_for_tuple(&parsed, fs, true)?;
        debug!(
            file_id,
            scheme = %helper.scheme(),
            resolved = found.as_ref().map(|f| f.file_id()),
            "resolved file ID"
        );
        Ok(found)
    }

    /// Resolves a possibly stale file ID to the file currently recorded for its filename.
    ///
    /// The record at this strategy's stage supplies the current hash. A request carrying an
    /// older hash is only upgraded if that hash is in the record's history and, at the live
    /// stage, was published.
    pub fn soft_resolve_file_id(
        &self,
        file_id: &str,
        fs: &dyn Filesystem,
    ) -> AssetResult<Option<ParsedFileId>> {
        let Some(records) = &self.records else {
            return Ok(None);
        };
        let Some((_, parsed)) = self.claim(file_id) else {
            return Ok(None);
        };
        let Some(record) = records.lookup_by_filename(parsed.filename(), self.stage)? else {
            return Ok(None);
        };
        if record.hash.is_empty() {
            return Ok(None);
        }

        if !parsed.hash().is_empty() && !hashes_match(parsed.hash(), &record.hash) {
            let require_published = self.stage == Stage::Live;
            if !record.had_hash(parsed.hash(), require_published) {
                debug!(
                    file_id,
                    stage = %self.stage,
                    "requested hash not in record history; not redirecting"
                );
                return Ok(None);
            }
        }

        self.search_for_tuple(&parsed.with_hash(record.hash), fs, false)
    }

    // Helper whose layout holds the original of `tuple` in `fs`.
    fn locate_original(
        &self,
        original: &ParsedFileId,
        fs: &dyn Filesystem,
    ) -> AssetResult<Option<Arc<dyn FileIdHelper>>> {
        for helper in self.search_helpers() {
            if helper.uses_hash() && original.hash().is_empty() {
                continue;
            }
            if fs.has(&helper.build_from(original))? {
                return Ok(Some(Arc::clone(helper)));
            }
        }
        Ok(None)
    }

    /// Enumerates the stored original of `tuple` and every variant derived from it.
    ///
    /// The original is located with the same helper priority as
    /// [`search_for_tuple`](Self::search_for_tuple); only that helper's search directories are
    /// listed. Yielded tuples carry `tuple`'s hash. Nothing is listed if the original is missing.
    pub fn find_variants<'a>(
        &self,
        tuple: &ParsedFileId,
        fs: &'a dyn Filesystem,
    ) -> AssetResult<VariantIter<'a>> {
        let original = tuple.without_variant();
        let Some(helper) = self.locate_original(&original, fs)? else {
            return Ok(Box::new(std::iter::empty()));
        };

        let paths = helper.variant_search_paths(&original);
        let variants = paths.into_iter().flat_map(move |path| -> VariantIter<'a> {
            let helper = Arc::clone(&helper);
            let original = original.clone();
            let entries = match fs.list_contents(&path.dir, path.recursive) {
                Ok(entries) => entries,
                Err(e) => {
                    let failed: AssetResult<ParsedFileId> = Err(e.into());
                    return Box::new(std::iter::once(failed));
                }
            };
            Box::new(entries.filter_map(move |entry| -> Option<AssetResult<ParsedFileId>> {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(e.into())),
                };
                if !entry.is_file() || !helper.is_variant_of(&entry.path, &original) {
                    return None;
                }
                helper
                    .parse_file_id(&entry.path)
                    .map(|parsed| Ok(parsed.with_hash(original.hash())))
            }))
        });
        Ok(Box::new(variants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{FileRecord, InMemoryRecordStore};
    use assets_fileid::FileIdScheme;
    use assets_files::LocalFilesystem;
    use assets_hashing::HashAlgorithm;
    use tempfile::TempDir;

    const SHA1_A: &str = "6dcd4ce23d88e2ee9568ba546c007c63d9131c1b";

    fn create_fs(temp: &TempDir) -> LocalFilesystem {
        LocalFilesystem::new(temp.path(), "public").unwrap()
    }

    fn write(fs: &LocalFilesystem, path: &str, content: &[u8]) {
        fs.write_stream(path, &mut &content[..]).unwrap();
    }

    fn strategy(default: FileIdScheme, resolution: &[FileIdScheme]) -> FileResolutionStrategy {
        FileResolutionStrategy::from_schemes(
            &SchemeConfig {
                default,
                resolution: resolution.to_vec(),
            },
            Arc::new(FileHashingService::in_memory(HashAlgorithm::Sha1)),
        )
    }

    fn hashed() -> FileResolutionStrategy {
        strategy(
            FileIdScheme::Hash,
            &[FileIdScheme::Hash, FileIdScheme::Natural, FileIdScheme::Legacy],
        )
    }

    #[test]
    fn test_search_for_tuple_prefers_default_helper() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "6dcd4ce23d/sam.jpg", b"A");
        write(&fs, "sam.jpg", b"A");

        let found = hashed()
            .search_for_tuple(&ParsedFileId::tuple("sam.jpg", SHA1_A, ""), &fs, false)
            .unwrap()
            .unwrap();
        assert_eq!(found.file_id(), "6dcd4ce23d/sam.jpg");
    }

    #[test]
    fn test_search_for_tuple_falls_back_to_natural() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/sam.jpg", b"A");

        let found = hashed()
            .search_for_tuple(
                &ParsedFileId::tuple("folder/sam.jpg", SHA1_A, ""),
                &fs,
                true,
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.file_id(), "folder/sam.jpg");
        assert_eq!(found.hash(), SHA1_A);
    }

    #[test]
    fn test_strict_search_rejects_content_mismatch() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        // Path claims hash 6dcd4ce23d but holds different bytes.
        write(&fs, "6dcd4ce23d/sam.jpg", b"not A");

        let tuple = ParsedFileId::tuple("sam.jpg", SHA1_A, "");
        let strategy = hashed();
        assert!(strategy
            .search_for_tuple(&tuple, &fs, true)
            .unwrap()
            .is_none());
        assert!(strategy
            .search_for_tuple(&tuple, &fs, false)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_strict_search_expands_truncated_hash() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "6dcd4ce23d/sam.jpg", b"A");
        write(&fs, "6dcd4ce23d/sam__FitW10.jpg", b"thumb");

        let found = hashed()
            .search_for_tuple(
                &ParsedFileId::tuple("sam.jpg", "6dcd4ce23d", "FitW10"),
                &fs,
                true,
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.hash(), SHA1_A);
        assert_eq!(found.file_id(), "6dcd4ce23d/sam__FitW10.jpg");
    }

    #[test]
    fn test_resolve_natural_path_to_hash_location() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/6dcd4ce23d/sam.jpg", b"A");
        write(&fs, "folder/sam.jpg", b"A");

        let strategy = strategy(
            FileIdScheme::Hash,
            &[FileIdScheme::Natural, FileIdScheme::Hash],
        );
        let resolved = strategy
            .resolve_file_id("folder/sam.jpg", &fs)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.file_id(), "folder/6dcd4ce23d/sam.jpg");
        assert_eq!(resolved.hash(), SHA1_A);
    }

    #[test]
    fn test_resolve_first_parse_claims_input() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/6dcd4ce23d/sam.jpg", b"A");

        // Both helpers can parse this path; whichever comes first decides the filename.
        let natural_first = strategy(
            FileIdScheme::Hash,
            &[FileIdScheme::Natural, FileIdScheme::Hash],
        );
        let resolved = natural_first
            .resolve_file_id("folder/6dcd4ce23d/sam.jpg", &fs)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.filename(), "folder/6dcd4ce23d/sam.jpg");

        let hash_first = strategy(
            FileIdScheme::Hash,
            &[FileIdScheme::Hash, FileIdScheme::Natural],
        );
        let resolved = hash_first
            .resolve_file_id("folder/6dcd4ce23d/sam.jpg", &fs)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.filename(), "folder/sam.jpg");
        assert_eq!(resolved.hash(), SHA1_A);
    }

    #[test]
    fn test_resolve_claimed_but_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/sam.jpg", b"A");

        // The hash helper claims the path; the natural copy is never considered a match
        // because the claimed hash does not match its content.
        let strategy = strategy(
            FileIdScheme::Hash,
            &[FileIdScheme::Hash, FileIdScheme::Natural],
        );
        assert!(strategy
            .resolve_file_id("folder/abcdef1234/sam.jpg", &fs)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_resolve_unparseable_is_none() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        let strategy = strategy(FileIdScheme::Hash, &[FileIdScheme::Hash]);
        assert!(strategy
            .resolve_file_id("folder/sam.jpg", &fs)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_soft_resolve_redirects_to_published_history() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/abcdef5678/old__PadW10.jpg", b"thumb");

        let records = Arc::new(InMemoryRecordStore::new());
        let mut record = FileRecord::new("folder/old.jpg", "abcdef1234ffff");
        record.was_published = true;
        record.push_version("abcdef5678ffff", true);
        records.save(Stage::Live, record).unwrap();

        let strategy = strategy(
            FileIdScheme::Hash,
            &[FileIdScheme::Legacy, FileIdScheme::Hash],
        )
        .with_records(records);

        let resolved = strategy.with_stage(Stage::Live, |s| {
            s.soft_resolve_file_id("folder/abcdef1234/old__PadW10.jpg", &fs)
                .unwrap()
        });
        assert_eq!(
            resolved.unwrap().file_id(),
            "folder/abcdef5678/old__PadW10.jpg"
        );

        // Nothing for draft: the record only exists live.
        assert!(strategy
            .soft_resolve_file_id("folder/abcdef1234/old__PadW10.jpg", &fs)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_soft_resolve_refuses_unpublished_hash_on_live() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/abcdef5678/old.jpg", b"x");

        let records = Arc::new(InMemoryRecordStore::new());
        let mut record = FileRecord::new("folder/old.jpg", "abcdef1234ffff");
        record.push_version("abcdef5678ffff", true);
        records.save(Stage::Live, record.clone()).unwrap();
        records.save(Stage::Draft, record).unwrap();

        let strategy = hashed().with_records(records);
        let live = strategy.with_stage(Stage::Live, |s| {
            s.soft_resolve_file_id("folder/abcdef1234/old.jpg", &fs)
                .unwrap()
        });
        assert!(live.is_none());

        let draft = strategy.with_stage(Stage::Draft, |s| {
            s.soft_resolve_file_id("folder/abcdef1234/old.jpg", &fs)
                .unwrap()
        });
        assert_eq!(draft.unwrap().file_id(), "folder/abcdef5678/old.jpg");
    }

    #[test]
    fn test_soft_resolve_without_records_is_none() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/abcdef5678/old.jpg", b"x");
        assert!(hashed()
            .soft_resolve_file_id("folder/abcdef1234/old.jpg", &fs)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_variants_hash_scheme() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/6dcd4ce23d/sam.jpg", b"A");
        write(&fs, "folder/6dcd4ce23d/sam__FitW10.jpg", b"1");
        write(&fs, "folder/6dcd4ce23d/sam__PadW20.jpg", b"2");
        write(&fs, "folder/6dcd4ce23d/other.jpg", b"3");
        write(&fs, "folder/1234567890/sam__FitW10.jpg", b"4");

        let tuple = ParsedFileId::tuple("folder/sam.jpg", SHA1_A, "");
        let mut found: Vec<String> = hashed()
            .find_variants(&tuple, &fs)
            .unwrap()
            .map(|v| v.unwrap().file_id().to_owned())
            .collect();
        found.sort();
        assert_eq!(
            found,
            vec![
                "folder/6dcd4ce23d/sam.jpg",
                "folder/6dcd4ce23d/sam__FitW10.jpg",
                "folder/6dcd4ce23d/sam__PadW20.jpg",
            ]
        );
    }

    #[test]
    fn test_find_variants_legacy_resampled_chain() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/sam.jpg", b"A");
        write(&fs, "folder/_resampled/FitW10/sam.jpg", b"1");
        write(&fs, "folder/_resampled/FitW10/PadW20/sam.jpg", b"2");
        write(&fs, "folder/_resampled/FitW10/other.jpg", b"3");

        let strategy = strategy(FileIdScheme::Legacy, &[FileIdScheme::Legacy]);
        let tuple = ParsedFileId::tuple("folder/sam.jpg", SHA1_A, "");
        let mut variants: Vec<String> = strategy
            .find_variants(&tuple, &fs)
            .unwrap()
            .map(|v| v.unwrap().variant().to_owned())
            .collect();
        variants.sort();
        assert_eq!(variants, vec!["", "FitW10", "FitW10_PadW20"]);
    }

    #[test]
    fn test_find_variants_missing_original_is_empty() {
        let temp = TempDir::new().unwrap();
        let fs = create_fs(&temp);
        write(&fs, "folder/6dcd4ce23d/sam__FitW10.jpg", b"orphan");

        let tuple = ParsedFileId::tuple("folder/sam.jpg", SHA1_A, "");
        assert_eq!(hashed().find_variants(&tuple, &fs).unwrap().count(), 0);
    }

    #[test]
    fn test_with_stage_is_scoped() {
        let strategy = hashed();
        assert_eq!(strategy.stage(), Stage::Draft);
        let inner = strategy.with_stage(Stage::Live, |s| s.stage());
        assert_eq!(inner, Stage::Live);
        assert_eq!(strategy.stage(), Stage::Draft);
    }
}
