//! Shared value types for the asset store.
//!
//! These types sit below every other crate in the workspace so the filesystem layer, the
//! file-ID helpers and the store itself agree on what a tuple, a visibility or a conflict mode
//! looks like.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rejected input for one of the value types below.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error("Text cannot be empty")]
    Empty,

    /// Not one of the names accepted by `kind` (`visibility`, `stage`, ...).
    #[error("Unknown {kind}: '{value}'")]
    Unknown { kind: &'static str, value: String },
}

/// Trimmed text with at least one character, used for session ids and other caller-supplied keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Trims `input`; fails with [`TextError::Empty`] when nothing is left.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        match input.as_ref().trim() {
            "" => Err(TextError::Empty),
            trimmed => Ok(Self(trimmed.to_owned())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for NonEmptyText {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// Blank strings in records or request bodies fail deserialisation instead of producing an
// empty key.
impl<'de> Deserialize<'de> for NonEmptyText {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Logical identity of a stored asset version.
///
/// This is the wire/JSON form accepted at API boundaries. Inside the store it is converted to
/// a `ParsedFileId` exactly once (see `ParsedFileId::from_tuple` in `assets-fileid`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetTuple {
    pub filename: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub variant: String,
}

impl AssetTuple {
    pub fn new(
        filename: impl Into<String>,
        hash: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            hash: hash.into(),
            variant: variant.into(),
        }
    }
}

/// Which backing filesystem holds the bytes of a tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Served directly by the web server.
    Public,
    /// Served only through the store, gated by session grants.
    Protected,
}

impl Visibility {
    pub const ALL: [Visibility; 2] = [Visibility::Public, Visibility::Protected];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
        }
    }

    /// The other visibility.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Public => Self::Protected,
            Self::Protected => Self::Public,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "protected" => Ok(Self::Protected),
            other => Err(TextError::Unknown {
                kind: "visibility",
                value: other.to_owned(),
            }),
        }
    }
}

/// Versioning stage consumed from the external record store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Draft,
    Live,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" | "stage" => Ok(Self::Draft),
            "live" => Ok(Self::Live),
            other => Err(TextError::Unknown {
                kind: "stage",
                value: other.to_owned(),
            }),
        }
    }
}

/// What a write does when its target file ID is already taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Fail with `FileAlreadyExists`.
    Exception,
    /// Replace the existing bytes.
    Overwrite,
    /// Pick the next free `-vN` filename. Originals only.
    Rename,
    /// Keep the existing bytes and report their tuple.
    UseExisting,
}

impl ConflictResolution {
    pub const ALL: [ConflictResolution; 4] = [
        ConflictResolution::Exception,
        ConflictResolution::Overwrite,
        ConflictResolution::Rename,
        ConflictResolution::UseExisting,
    ];

    /// Conflict mode used when the caller does not pick one.
    ///
    /// Variants are regenerated freely, so they overwrite; originals refuse to clobber.
    pub const fn default_for(is_variant: bool) -> Self {
        if is_variant {
            Self::Overwrite
        } else {
            Self::Exception
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exception => "exception",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::UseExisting => "use-existing",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exception" | "error" => Ok(Self::Exception),
            "overwrite" => Ok(Self::Overwrite),
            "rename" => Ok(Self::Rename),
            "use-existing" | "use_existing" | "existing" => Ok(Self::UseExisting),
            other => Err(TextError::Unknown {
                kind: "conflict resolution",
                value: other.to_owned(),
            }),
        }
    }
}
