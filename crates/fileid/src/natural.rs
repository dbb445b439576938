//! Natural (hashless) scheme: `<dir>/<name>[__<variant>]<ext>`.

use crate::helper::{FileIdHelper, VariantSearchPath};
use crate::naming::{self, VARIANT_DELIMITER};
use crate::{FileIdScheme, ParsedFileId};
use regex::Regex;
use std::sync::LazyLock;

static NATURAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<folder>(?:[^/]+/)*)(?P<stem>\.?[^/.]+)(?P<extension>\.[^/]*)?$",
    )
    .expect("static regex is valid")
});

/// Stores files at their logical filename, without a hash segment.
///
/// Parsed IDs carry an empty hash; callers recover it by hashing the stored bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalFileIdHelper;

impl NaturalFileIdHelper {
    pub fn new() -> Self {
        Self
    }
}

impl FileIdHelper for NaturalFileIdHelper {
    fn scheme(&self) -> FileIdScheme {
        FileIdScheme::Natural
    }

    fn build_file_id(&self, filename: &str, _hash: &str, variant: &str) -> String {
        let filename = self.clean_filename(filename);
        if variant.is_empty() {
            return filename;
        }

        let filename = naming::swap_extension(&filename, variant);
        let parts = naming::split_filename(&filename);
        naming::join_dir(
            parts.dir,
            &format!(
                "{}{}{}{}",
                parts.name, VARIANT_DELIMITER, variant, parts.extension
            ),
        )
    }

    fn parse_file_id(&self, file_id: &str) -> Option<ParsedFileId> {
        let caps = NATURAL_PATTERN.captures(file_id)?;
        let folder = caps.name("folder").map_or("", |m| m.as_str());
        let stem = caps.name("stem").map_or("", |m| m.as_str());
        let (basename, variant) = naming::split_variant(stem);
        let extension = caps.name("extension").map_or("", |m| m.as_str());

        let mut filename = format!("{folder}{basename}{extension}");
        if !variant.is_empty() {
            filename = naming::restore_extension(&filename, variant);
        }

        Some(ParsedFileId::new(filename, "", variant, file_id))
    }

    fn variant_search_paths(&self, original: &ParsedFileId) -> Vec<VariantSearchPath> {
        let filename = self.clean_filename(original.filename());
        vec![VariantSearchPath {
            dir: naming::split_filename(&filename).dir.to_owned(),
            recursive: false,
        }]
    }

    fn uses_hash(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ignores_hash() {
        let helper = NaturalFileIdHelper::new();
        assert_eq!(
            helper.build_file_id("folder/sam.jpg", "abcdef7890", ""),
            "folder/sam.jpg"
        );
        assert_eq!(
            helper.build_file_id("folder/sam.jpg", "abcdef7890", "FitW10"),
            "folder/sam__FitW10.jpg"
        );
        assert_eq!(
            helper.build_file_id("folder\\my__sam.jpg", "", ""),
            "folder/my_sam.jpg"
        );
    }

    #[test]
    fn test_round_trip() {
        let helper = NaturalFileIdHelper::new();
        let cases = [
            ("sam.jpg", ""),
            ("sam.jpg", "resizeXYZ"),
            ("folder/sub/sam.jpg", "FitWzYwLDYwXQ"),
            ("archive.tar.gz", ""),
            ("archive.tar.gz", "v1"),
            ("README", "v1"),
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
            assert_eq!(parsed.hash(), "");
            assert_eq!(parsed.variant(), variant);
        }
    }

    #[test]
    fn test_hash_folder_is_part_of_filename() {
        let helper = NaturalFileIdHelper::new();
        let parsed = helper.parse_file_id("folder/abcdef1234/sam.jpg").unwrap();
        assert_eq!(parsed.filename(), "folder/abcdef1234/sam.jpg");
        assert_eq!(parsed.hash(), "");
    }

    #[test]
    fn test_rejects_malformed() {
        let helper = NaturalFileIdHelper::new();
        assert!(helper.parse_file_id("/abs/sam.jpg").is_none());
        assert!(helper.parse_file_id("folder/").is_none());
        assert!(helper.parse_file_id("").is_none());
    }

    #[test]
    fn test_is_variant_of_ignores_hash() {
        let helper = NaturalFileIdHelper::new();
        let original = ParsedFileId::tuple("folder/sam.jpg", "abcdef7890", "");
        assert!(helper.is_variant_of("folder/sam.jpg", &original));
        assert!(helper.is_variant_of("folder/sam__FitW10.jpg", &original));
        assert!(!helper.is_variant_of("folder/samantha.jpg", &original));
        assert!(!helper.is_variant_of("other/sam.jpg", &original));
    }

    #[test]
    fn test_trailing_underscore_name_keeps_variant() {
        let helper = NaturalFileIdHelper::new();
        let parsed = helper.parse_file_id("folder/sam___resizeXYZ.jpg").unwrap();
        assert_eq!(parsed.filename(), "folder/sam_.jpg");
        assert_eq!(parsed.variant(), "resizeXYZ");

        let original = ParsedFileId::tuple("folder/sam_.jpg", "", "");
        assert!(helper.is_variant_of("folder/sam___resizeXYZ.jpg", &original));
        assert!(helper.is_variant_of("folder/sam_.jpg", &original));
        assert!(!helper.is_variant_of("folder/sam__resizeXYZ.jpg", &original));
    }
}
