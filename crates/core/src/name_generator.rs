//! Candidate filenames for the `rename` conflict mode.

use assets_fileid::naming::{join_dir, split_filename};

/// Yields `filename` itself, then `name-v2.ext`, `name-v3.ext`, ... up to `max_tries` names.
///
/// An existing `-vN` suffix is stripped first, so `sam-v3.jpg` continues at `sam-v4.jpg` rather
/// than producing `sam-v3-v2.jpg`.
#[derive(Debug, Clone)]
pub struct AssetNameGenerator {
    original: String,
    dir: String,
    stem: String,
    extension: String,
    prefix: String,
    first_version: u32,
    max_tries: usize,
}

impl AssetNameGenerator {
    pub fn new(filename: &str, prefix: &str, max_tries: usize) -> Self {
        let parts = split_filename(filename);
        let (stem, version) = strip_version(parts.name, prefix);
        Self {
            original: filename.to_owned(),
            dir: parts.dir.to_owned(),
            stem: stem.to_owned(),
            extension: parts.extension.to_owned(),
            prefix: prefix.to_owned(),
            first_version: version.map_or(2, |v| v.saturating_add(1).max(2)),
            max_tries,
        }
    }

    pub fn max_tries(&self) -> usize {
        self.max_tries
    }

    /// Candidate names, the unmodified filename first.
    pub fn candidates(&self) -> impl Iterator<Item = String> + '_ {
        let versions = (self.first_version..).map(move |v| self.with_version(v));
        std::iter::once(self.original.clone())
            .chain(versions)
            .take(self.max_tries)
    }

    fn with_version(&self, version: u32) -> String {
        let name = format!("{}{}{}{}", self.stem, self.prefix, version, self.extension);
        join_dir(&self.dir, &name)
    }
}

// `sam-v3` -> (`sam`, Some(3)); anything else is returned unchanged.
fn strip_version<'a>(name: &'a str, prefix: &str) -> (&'a str, Option<u32>) {
    if let Some(pos) = name.rfind(prefix) {
        let (stem, tail) = (&name[..pos], &name[pos + prefix.len()..]);
        if !stem.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(version) = tail.parse::<u32>() {
                return (stem, Some(version));
            }
        }
    }
    (name, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(filename: &str, max: usize) -> Vec<String> {
        AssetNameGenerator::new(filename, "-v", max)
            .candidates()
            .collect()
    }

    #[test]
    fn test_candidates_start_with_original() {
        assert_eq!(
            names("folder/sam.jpg", 4),
            vec![
                "folder/sam.jpg",
                "folder/sam-v2.jpg",
                "folder/sam-v3.jpg",
                "folder/sam-v4.jpg"
            ]
        );
    }

    #[test]
    fn test_existing_version_suffix_continues() {
        assert_eq!(
            names("sam-v3.tar.gz", 3),
            vec!["sam-v3.tar.gz", "sam-v4.tar.gz", "sam-v5.tar.gz"]
        );
    }

    #[test]
    fn test_non_numeric_suffix_kept() {
        assert_eq!(names("my-video.mp4", 2), vec!["my-video.mp4", "my-video-v2.mp4"]);
        assert_eq!(names("-v2", 2), vec!["-v2", "-v2-v2"]);
    }

    #[test]
    fn test_dotfile_versions_after_name() {
        assert_eq!(names("folder/.env", 2), vec!["folder/.env", "folder/.env-v2"]);
        assert_eq!(names(".env.local", 2), vec![".env.local", ".env-v2.local"]);
    }

    #[test]
    fn test_max_tries_bounds_sequence() {
        assert_eq!(names("sam.jpg", 1), vec!["sam.jpg"]);
        assert!(names("sam.jpg", 0).is_empty());
    }
}
