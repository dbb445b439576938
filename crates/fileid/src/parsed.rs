//! The decomposed form of a file ID.

use crate::HASH_LENGTH;
use assets_types::AssetTuple;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(filename, hash, variant)` tuple, plus the raw file ID it was parsed from.
///
/// Values are immutable: every `with_*` method returns a new instance. A value built from a
/// known tuple (rather than parsed) has an empty `file_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedFileId {
    filename: String,
    hash: String,
    variant: String,
    file_id: String,
}

impl ParsedFileId {
    pub fn new(
        filename: impl Into<String>,
        hash: impl Into<String>,
        variant: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            hash: hash.into(),
            variant: variant.into(),
            file_id: file_id.into(),
        }
    }

    /// Builds a value from a tuple with no known physical location.
    pub fn tuple(
        filename: impl Into<String>,
        hash: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self::new(filename, hash, variant, String::new())
    }

    /// The single conversion from the API-boundary tuple type.
    pub fn from_tuple(tuple: AssetTuple) -> Self {
        Self::tuple(tuple.filename, tuple.hash, tuple.variant)
    }

    pub fn to_tuple(&self) -> AssetTuple {
        AssetTuple::new(&self.filename, &self.hash, &self.variant)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// The hash as embedded in hash-prefixed paths.
    pub fn short_hash(&self) -> &str {
        self.hash.get(..HASH_LENGTH).unwrap_or(&self.hash)
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn is_variant(&self) -> bool {
        !self.variant.is_empty()
    }

    pub fn has_file_id(&self) -> bool {
        !self.file_id.is_empty()
    }

    #[must_use]
    pub fn with_filename(&self, filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_hash(&self, hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_variant(&self, variant: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_file_id(&self, file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            ..self.clone()
        }
    }

    /// The original this tuple derives from. The file ID is dropped since it named the variant.
    #[must_use]
    pub fn without_variant(&self) -> Self {
        Self::tuple(self.filename.clone(), self.hash.clone(), String::new())
    }

    /// Same tuple, ignoring any file ID.
    pub fn same_tuple(&self, other: &ParsedFileId) -> bool {
        self.filename == other.filename && self.hash == other.hash && self.variant == other.variant
    }
}

impl From<AssetTuple> for ParsedFileId {
    fn from(tuple: AssetTuple) -> Self {
        Self::from_tuple(tuple)
    }
}

impl fmt::Display for ParsedFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.file_id.is_empty() {
            return f.write_str(&self.file_id);
        }
        write!(f, "{}", self.filename)?;
        if !self.hash.is_empty() {
            write!(f, " ({})", self.short_hash())?;
        }
        if !self.variant.is_empty() {
            write!(f, " [{}]", self.variant)?;
        }
        Ok(())
    }
}
