//! The contract every file-ID scheme implements.

use crate::naming;
use crate::{FileIdScheme, ParsedFileId};
use std::fmt;

/// A directory to scan when enumerating the variants of an original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSearchPath {
    pub dir: String,
    pub recursive: bool,
}

/// Maps `(filename, hash, variant)` tuples to file IDs and back for one naming scheme.
///
/// Implementations are stateless and pure; they never touch a filesystem.
pub trait FileIdHelper: Send + Sync + fmt::Debug {
    /// Which scheme this helper implements.
    fn scheme(&self) -> FileIdScheme;

    /// Builds the file ID for a tuple. `variant` may be empty for originals.
    fn build_file_id(&self, filename: &str, hash: &str, variant: &str) -> String;

    /// Parses a file ID, or returns `None` when it does not have this scheme's shape.
    ///
    /// `None` means "try the next helper", never a failure.
    fn parse_file_id(&self, file_id: &str) -> Option<ParsedFileId>;

    /// Directories that may contain variants of `original`.
    fn variant_search_paths(&self, original: &ParsedFileId) -> Vec<VariantSearchPath>;

    /// Whether the scheme embeds the hash in the path. Hashless schemes can only be searched
    /// by filename.
    fn uses_hash(&self) -> bool;

    fn build_from(&self, parsed: &ParsedFileId) -> String {
        self.build_file_id(parsed.filename(), parsed.hash(), parsed.variant())
    }

    fn clean_filename(&self, filename: &str) -> String {
        naming::clean_filename(filename)
    }

    /// Whether `file_id` is `original` itself or one of its variants under this scheme.
    fn is_variant_of(&self, file_id: &str, original: &ParsedFileId) -> bool {
        let Some(parsed) = self.parse_file_id(file_id) else {
            return false;
        };
        if parsed.filename() != self.clean_filename(original.filename()) {
            return false;
        }
        !self.uses_hash() || naming::hashes_match(parsed.hash(), original.hash())
    }
}
