//! Hash-prefixed scheme: `<dir>/<10-char hash>/<name>[__<variant>]<ext>`.

use crate::helper::{FileIdHelper, VariantSearchPath};
use crate::naming::{self, VARIANT_DELIMITER};
use crate::{FileIdScheme, ParsedFileId, HASH_LENGTH};
use regex::Regex;
use std::sync::LazyLock;

static HASH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<folder>(?:[^/]+/)*)(?P<hash>[a-zA-Z0-9]{{{HASH_LENGTH}}})/(?P<stem>\.?[^/.]+)(?P<extension>\.[^/]*)?$"
    ))
    .expect("static regex is valid")
});

/// Embeds the truncated content hash as a folder directly above the basename.
///
/// This is the canonical scheme: two versions of `folder/sam.jpg` with different content land
/// in different folders, so publishing one never clobbers the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashFileIdHelper;

impl HashFileIdHelper {
    pub fn new() -> Self {
        Self
    }

    fn truncate(hash: &str) -> &str {
        hash.get(..HASH_LENGTH).unwrap_or(hash)
    }
}

impl FileIdHelper for HashFileIdHelper {
    fn scheme(&self) -> FileIdScheme {
        FileIdScheme::Hash
    }

    fn build_file_id(&self, filename: &str, hash: &str, variant: &str) -> String {
        let mut filename = self.clean_filename(filename);
        if !variant.is_empty() {
            filename = naming::swap_extension(&filename, variant);
        }
        let parts = naming::split_filename(&filename);

        let mut file_id = format!("{}/{}", Self::truncate(hash), parts.name);
        if !variant.is_empty() {
            file_id.push_str(VARIANT_DELIMITER);
            file_id.push_str(variant);
        }
        file_id.push_str(parts.extension);

        naming::join_dir(parts.dir, &file_id)
    }

    fn parse_file_id(&self, file_id: &str) -> Option<ParsedFileId> {
        let caps = HASH_PATTERN.captures(file_id)?;
        let folder = caps.name("folder").map_or("", |m| m.as_str());
        let hash = caps.name("hash").map_or("", |m| m.as_str());
        let stem = caps.name("stem").map_or("", |m| m.as_str());
        let (basename, variant) = naming::split_variant(stem);
        let extension = caps.name("extension").map_or("", |m| m.as_str());

        let mut filename = format!("{folder}{basename}{extension}");
        if !variant.is_empty() {
            filename = naming::restore_extension(&filename, variant);
        }

        Some(ParsedFileId::new(filename, hash, variant, file_id))
    }

    fn variant_search_paths(&self, original: &ParsedFileId) -> Vec<VariantSearchPath> {
        let filename = self.clean_filename(original.filename());
        let parts = naming::split_filename(&filename);
        vec![VariantSearchPath {
            dir: naming::join_dir(parts.dir, Self::truncate(original.hash())),
            recursive: false,
        }]
    }

    fn uses_hash(&self) -> bool {
        true
    }
}
