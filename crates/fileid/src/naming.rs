//! Naming rules shared by every file-ID scheme.
//!
//! All helpers clean filenames, split extensions and apply extension-rewriting variants through
//! these functions, so the schemes cannot drift apart on the basics.

use base64::alphabet::Alphabet;
use base64::engine::{general_purpose, GeneralPurpose};
use base64::Engine as _;
use regex::Regex;
use std::sync::LazyLock;

/// Separates the basename from the variant in hash and natural file IDs.
pub const VARIANT_DELIMITER: &str = "__";

/// Separates variant segments in the in-memory variant string.
pub const VARIANT_SEGMENT_SEPARATOR: char = '_';

/// Variant segment prefix marking an extension rewrite (for example `jpg` to `webp`).
pub const EXT_REWRITE_PREFIX: &str = "ExtRewrite";

// URL-safe base64 would emit `_`, which is the variant segment separator.
const VARIANT_ALPHABET: Alphabet =
    match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789~-") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("variant alphabet must be 64 unique ASCII characters"),
    };

const VARIANT_ENGINE: GeneralPurpose = GeneralPurpose::new(&VARIANT_ALPHABET, general_purpose::NO_PAD);

static MULTI_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("static regex is valid"));

static MULTI_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("static regex is valid"));

/// Normalises a logical filename.
///
/// - Backslashes become `/`
/// - Runs of `/` collapse to one, and leading `/` is dropped
/// - Runs of two or more `_` collapse to one, so `__` stays unambiguous as the variant delimiter
///
/// Idempotent: `clean_filename(&clean_filename(x)) == clean_filename(x)`.
pub fn clean_filename(filename: &str) -> String {
    let swapped = filename.replace('\\', "/");
    let collapsed = MULTI_SLASH.replace_all(&swapped, "/");
    let trimmed = collapsed.trim_start_matches('/');
    MULTI_UNDERSCORE.replace_all(trimmed, "_").into_owned()
}

/// A filename split into directory, name and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameParts<'a> {
    /// Directory without trailing `/`, empty at the root.
    pub dir: &'a str,
    /// Basename up to the first `.` that is not its leading character.
    pub name: &'a str,
    /// Everything from that `.` on (`.tar.gz`), or empty.
    pub extension: &'a str,
}

/// Splits `filename` at its last `/` and at the first `.` of the basename.
///
/// A leading `.` belongs to the name, so `.env` has no extension and `.env.local` splits into
/// `.env` and `.local`.
pub fn split_filename(filename: &str) -> NameParts<'_> {
    let (dir, base) = match filename.rfind('/') {
        Some(pos) => (&filename[..pos], &filename[pos + 1..]),
        None => ("", filename),
    };
    let (name, extension) = match base.get(1..).and_then(|rest| rest.find('.')) {
        Some(pos) => base.split_at(pos + 1),
        None => (base, ""),
    };
    NameParts {
        dir,
        name,
        extension,
    }
}

/// Splits a file ID stem (`name[__variant]`, extension removed) into name and variant.
///
/// Cleaned names never contain `__` but may end in `_`, so the delimiter is the last `__`:
/// `sam___v1` is `sam_` with variant `v1`. A stem whose name or variant would be empty is all
/// name.
pub fn split_variant(stem: &str) -> (&str, &str) {
    match stem.rfind(VARIANT_DELIMITER) {
        Some(pos) if pos > 0 && pos + VARIANT_DELIMITER.len() < stem.len() => {
            (&stem[..pos], &stem[pos + VARIANT_DELIMITER.len()..])
        }
        _ => (stem, ""),
    }
}

/// Prefixes `path` with `dir/` unless `dir` is empty.
pub fn join_dir(dir: &str, path: &str) -> String {
    if dir.is_empty() {
        path.to_owned()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), path)
    }
}

/// Builds the variant segment that rewrites the last extension `from` into `to`.
pub fn ext_rewrite_variant(from: &str, to: &str) -> String {
    let payload = serde_json::json!([from, to]).to_string();
    format!("{}{}", EXT_REWRITE_PREFIX, VARIANT_ENGINE.encode(payload))
}

/// Extension rewrites encoded in `variant`, in application order.
pub fn extension_rewrites(variant: &str) -> Vec<(String, String)> {
    variant
        .split(VARIANT_SEGMENT_SEPARATOR)
        .filter_map(|segment| {
            let encoded = segment.strip_prefix(EXT_REWRITE_PREFIX)?;
            let bytes = VARIANT_ENGINE.decode(encoded).ok()?;
            let [from, to]: [String; 2] = serde_json::from_slice(&bytes).ok()?;
            Some((from, to))
        })
        .collect()
}

/// Applies the extension rewrites in `variant` to `filename`.
pub fn swap_extension(filename: &str, variant: &str) -> String {
    extension_rewrites(variant)
        .iter()
        .fold(filename.to_owned(), |name, (from, to)| {
            replace_last_extension(&name, from, to)
        })
}

/// Undoes [`swap_extension`], recovering the original filename from a stored one.
pub fn restore_extension(filename: &str, variant: &str) -> String {
    extension_rewrites(variant)
        .iter()
        .rev()
        .fold(filename.to_owned(), |name, (from, to)| {
            replace_last_extension(&name, to, from)
        })
}

fn replace_last_extension(filename: &str, from: &str, to: &str) -> String {
    let base_start = filename.rfind('/').map_or(0, |pos| pos + 1);
    match filename[base_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = base_start + dot;
            if filename[dot + 1..].eq_ignore_ascii_case(from) {
                format!("{}.{}", &filename[..dot], to)
            } else {
                filename.to_owned()
            }
        }
        _ => filename.to_owned(),
    }
}

/// Whether one hash is a prefix of the other. Empty hashes never match.
pub fn hashes_match(one: &str, two: &str) -> bool {
    if one.is_empty() || two.is_empty() {
        return false;
    }
    one.starts_with(two) || two.starts_with(one)
}
