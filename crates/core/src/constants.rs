//! Constants used throughout the asset core crate.
//!
//! Defaults for configuration and the on-disk conventions shared by the store and the
//! migration helpers.

/// Default root of the public backing filesystem.
pub const DEFAULT_PUBLIC_DIR: &str = "public/assets";

/// Default root of the protected backing filesystem.
pub const DEFAULT_PROTECTED_DIR: &str = "assets/.protected";

/// URL prefix public files are served from.
pub const DEFAULT_PUBLIC_URL_BASE: &str = "/assets";

/// URL prefix protected files are served from, through the store.
pub const DEFAULT_PROTECTED_URL_BASE: &str = "/assets";

/// Suffix marker used when renaming around a name conflict (`sam-v2.jpg`).
pub const DEFAULT_VERSION_PREFIX: &str = "-v";

/// Number of candidate names tried before giving up on a rename.
pub const DEFAULT_RENAME_ATTEMPTS: usize = 100;

/// HTTP status for assets that do not exist.
pub const DEFAULT_MISSING_CODE: u16 = 404;

/// HTTP status for protected assets the session may not view. Matches the missing code so
/// responses do not reveal that a protected file exists.
pub const DEFAULT_DENIED_CODE: u16 = 404;

/// Denied status used when debug mode is on.
pub const DEBUG_DENIED_CODE: u16 = 403;

/// HTTP status for redirects to a newer file ID.
pub const DEFAULT_REDIRECT_CODE: u16 = 301;

/// Redirect statuses a deployment may configure.
pub const ALLOWED_REDIRECT_CODES: [u16; 4] = [301, 302, 307, 308];

/// Cache-Control sent with protected content.
pub const PROTECTED_CACHE_CONTROL: &str = "private, no-store";

/// Fallback MIME type when neither content nor extension identify the file.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
