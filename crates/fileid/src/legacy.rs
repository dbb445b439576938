//! Legacy SS3 scheme: originals at their natural path, variants under a `_resampled` chain.
//!
//! ```text
//! folder/sam.jpg                                   original
//! folder/_resampled/FitWzYwXQ/sam.jpg              variant "FitWzYwXQ"
//! folder/_resampled/FitWzYwXQ/PadWzEwXQ/sam.jpg    variant "FitWzYwXQ_PadWzEwXQ"
//! ```
//!
//! Each directory in the chain is one variant segment; in memory the segments are joined with
//! `_`. Segments that themselves contain `_` do not survive the round trip.

use crate::helper::{FileIdHelper, VariantSearchPath};
use crate::naming::{self, VARIANT_DELIMITER, VARIANT_SEGMENT_SEPARATOR};
use crate::{FileIdScheme, ParsedFileId};
use regex::Regex;
use std::sync::LazyLock;

/// Directory that holds legacy variants, next to their original.
pub const RESAMPLED_DIR: &str = "_resampled";

static RESAMPLED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<folder>(?:[^/]+/)*?)_resampled/(?P<variant>(?:[^/]+/)+)(?P<basename>[^/]+)$",
    )
    .expect("static regex is valid")
});

static PLAIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[^/]+/)*[^/]+$").expect("static regex is valid"));

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyFileIdHelper;

impl LegacyFileIdHelper {
    pub fn new() -> Self {
        Self
    }

    // A `__` in the basename belongs to a newer scheme's variant suffix; clean legacy names
    // never contain one.
    fn claims_basename(basename: &str) -> bool {
        !basename.contains(VARIANT_DELIMITER)
    }
}

impl FileIdHelper for LegacyFileIdHelper {
    fn scheme(&self) -> FileIdScheme {
        FileIdScheme::Legacy
    }

    fn build_file_id(&self, filename: &str, _hash: &str, variant: &str) -> String {
        let filename = self.clean_filename(filename);
        if variant.is_empty() {
            return filename;
        }

        let filename = naming::swap_extension(&filename, variant);
        let parts = naming::split_filename(&filename);
        let chain = variant
            .split(VARIANT_SEGMENT_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        naming::join_dir(
            parts.dir,
            &format!(
                "{}/{}/{}{}",
                RESAMPLED_DIR, chain, parts.name, parts.extension
            ),
        )
    }

    fn parse_file_id(&self, file_id: &str) -> Option<ParsedFileId> {
        if let Some(caps) = RESAMPLED_PATTERN.captures(file_id) {
            let folder = caps.name("folder").map_or("", |m| m.as_str());
            let basename = caps.name("basename").map_or("", |m| m.as_str());
            if !Self::claims_basename(basename) {
                return None;
            }

            let variant = caps
                .name("variant")
                .map_or("", |m| m.as_str())
                .trim_end_matches('/')
                .split('/')
                .collect::<Vec<_>>()
                .join(&VARIANT_SEGMENT_SEPARATOR.to_string());

            let filename = naming::restore_extension(&format!("{folder}{basename}"), &variant);
            return Some(ParsedFileId::new(filename, "", variant, file_id));
        }

        if !PLAIN_PATTERN.is_match(file_id) {
            return None;
        }
        let basename = file_id.rsplit('/').next().unwrap_or(file_id);
        if !Self::claims_basename(basename) || file_id.split('/').any(|s| s == RESAMPLED_DIR) {
            return None;
        }
        Some(ParsedFileId::new(file_id, "", "", file_id))
    }

    fn variant_search_paths(&self, original: &ParsedFileId) -> Vec<VariantSearchPath> {
        let filename = self.clean_filename(original.filename());
        let dir = naming::split_filename(&filename).dir;
        vec![
            VariantSearchPath {
                dir: dir.to_owned(),
                recursive: false,
            },
            VariantSearchPath {
                dir: naming::join_dir(dir, RESAMPLED_DIR),
                recursive: true,
            },
        ]
    }

    fn uses_hash(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_variant_chain() {
        let helper = LegacyFileIdHelper::new();
        assert_eq!(
            helper.build_file_id("folder/sam.jpg", "abcdef7890", ""),
            "folder/sam.jpg"
        );
        assert_eq!(
            helper.build_file_id("folder/sam.jpg", "abcdef7890", "FitW10_PadW20"),
            "folder/_resampled/FitW10/PadW20/sam.jpg"
        );
        assert_eq!(
            helper.build_file_id("sam.jpg", "", "FitW10"),
            "_resampled/FitW10/sam.jpg"
        );
    }

    #[test]
    fn test_round_trip() {
        let helper = LegacyFileIdHelper::new();
        let cases = [
            ("sam.jpg", ""),
            ("sam.jpg", "FitW10"),
            ("folder/sub/sam.jpg", "FitW10_PadW20"),
            ("archive.tar.gz", ""),
            ("archive.tar.gz", "v1"),
            ("sam_.jpg", "v1"),
            ("folder/a_.tar.gz", "x"),
            ("folder/.env", ""),
            ("folder/.env", "v1"),
            (".env.local", "v1"),
        ];
        for (filename, variant) in cases {
            let file_id = helper.build_file_id(filename, "", variant);
            let parsed = helper.parse_file_id(&file_id).expect("built IDs parse");
            assert_eq!(parsed.filename(), filename);
            assert_eq!(parsed.variant(), variant);
            assert_eq!(parsed.hash(), "");
        }
    }

    #[test]
    fn test_does_not_claim_newer_variant_names() {
        let helper = LegacyFileIdHelper::new();
        assert!(helper
            .parse_file_id("folder/abcdef1234/old__PadWzYwLDgwXQ.jpg")
            .is_none());
        assert!(helper
            .parse_file_id("folder/_resampled/FitW10/old__x.jpg")
            .is_none());
    }

    #[test]
    fn test_resampled_folder_alone_is_not_an_original() {
        let helper = LegacyFileIdHelper::new();
        assert!(helper.parse_file_id("folder/_resampled/sam.jpg").is_none());
    }

    #[test]
    fn test_is_variant_of() {
        let helper = LegacyFileIdHelper::new();
        let original = ParsedFileId::tuple("folder/sam.jpg", "abcdef7890", "");
        assert!(helper.is_variant_of("folder/sam.jpg", &original));
        assert!(helper.is_variant_of("folder/_resampled/FitW10/sam.jpg", &original));
        assert!(helper.is_variant_of("folder/_resampled/FitW10/PadW20/sam.jpg", &original));
        assert!(!helper.is_variant_of("folder/_resampled/FitW10/other.jpg", &original));
    }

    #[test]
    fn test_variant_search_paths() {
        let helper = LegacyFileIdHelper::new();
        let original = ParsedFileId::tuple("folder/sam.jpg", "", "");
        let paths = helper.variant_search_paths(&original);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1].dir, "folder/_resampled");
        assert!(paths[1].recursive);
    }
}
