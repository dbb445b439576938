//! # Assets FileID
//!
//! Naming schemes that map a logical asset tuple `(filename, hash, variant)` to the physical
//! path ("file ID") it is stored under, and parse physical paths back into tuples.
//!
//! Three schemes are provided:
//! - [`HashFileIdHelper`]: `folder/abcdef7890/sam__FitW10.jpg`, the canonical layout
//! - [`NaturalFileIdHelper`]: `folder/sam__FitW10.jpg`
//! - [`LegacyFileIdHelper`]: `folder/_resampled/FitW10/sam.jpg`
//!
//! Helpers are pure: they never touch storage. Resolution against real files lives in
//! `assets-core`.

pub mod hash;
pub mod helper;
pub mod legacy;
pub mod naming;
pub mod natural;
pub mod parsed;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use hash::HashFileIdHelper;
pub use helper::{FileIdHelper, VariantSearchPath};
pub use legacy::LegacyFileIdHelper;
pub use natural::NaturalFileIdHelper;
pub use parsed::ParsedFileId;

/// Number of hash characters embedded in hash-scheme paths.
pub const HASH_LENGTH: usize = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FileIdError {
    #[error("unknown file ID scheme: {0}")]
    UnknownScheme(String),
}

pub type FileIdResult<T> = std::result::Result<T, FileIdError>;

/// Identifies a naming scheme, for configuration and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileIdScheme {
    Hash,
    Natural,
    Legacy,
}

impl FileIdScheme {
    pub const ALL: [FileIdScheme; 3] = [Self::Hash, Self::Natural, Self::Legacy];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Natural => "natural",
            Self::Legacy => "legacy",
        }
    }

    /// A shared helper instance for this scheme.
    pub fn helper(self) -> Arc<dyn FileIdHelper> {
        match self {
            Self::Hash => Arc::new(HashFileIdHelper::new()),
            Self::Natural => Arc::new(NaturalFileIdHelper::new()),
            Self::Legacy => Arc::new(LegacyFileIdHelper::new()),
        }
    }
}

impl fmt::Display for FileIdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileIdScheme {
    type Err = FileIdError;

    fn from_str(s: &str) -> FileIdResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "natural" => Ok(Self::Natural),
            "legacy" => Ok(Self::Legacy),
            other => Err(FileIdError::UnknownScheme(other.to_owned())),
        }
    }
}

/// Parses a comma-separated list of scheme names, e.g. `"hash,natural,legacy"`.
///
/// Empty entries are skipped and duplicates dropped.
pub fn parse_scheme_list(input: &str) -> FileIdResult<Vec<FileIdScheme>> {
    let mut schemes = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let scheme = part.parse::<FileIdScheme>()?;
        if !schemes.contains(&scheme) {
            schemes.push(scheme);
        }
    }
    Ok(schemes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_from_str() {
        assert_eq!("Hash".parse::<FileIdScheme>().unwrap(), FileIdScheme::Hash);
        assert_eq!(
            " legacy ".parse::<FileIdScheme>().unwrap(),
            FileIdScheme::Legacy
        );
        assert_eq!(
            "sha".parse::<FileIdScheme>(),
            Err(FileIdError::UnknownScheme("sha".into()))
        );
    }

    #[test]
    fn test_helper_matches_scheme() {
        for scheme in FileIdScheme::ALL {
            assert_eq!(scheme.helper().scheme(), scheme);
            assert_eq!(scheme.to_string().parse::<FileIdScheme>().unwrap(), scheme);
        }
    }

    #[test]
    fn test_parse_scheme_list() {
        assert_eq!(
            parse_scheme_list("natural, legacy,,natural").unwrap(),
            vec![FileIdScheme::Natural, FileIdScheme::Legacy]
        );
        assert!(parse_scheme_list("").unwrap().is_empty());
        assert!(parse_scheme_list("hash,bogus").is_err());
    }

    #[test]
    fn test_helpers_disagree_on_shapes() {
        let path = "folder/abcdef1234/old__PadWzYwLDgwXQ.jpg";
        assert!(FileIdScheme::Hash.helper().parse_file_id(path).is_some());
        assert!(FileIdScheme::Legacy.helper().parse_file_id(path).is_none());

        let natural = FileIdScheme::Natural.helper().parse_file_id(path).unwrap();
        assert_eq!(natural.filename(), "folder/abcdef1234/old.jpg");
    }
}
