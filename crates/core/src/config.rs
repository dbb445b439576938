//! Asset store runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into [`AssetStore`]. Request
//! handling never reads environment variables, which keeps behaviour consistent across threads
//! and test harnesses.
//!
//! [`AssetStore`]: crate::AssetStore

use crate::constants::{
    ALLOWED_REDIRECT_CODES, DEBUG_DENIED_CODE, DEFAULT_DENIED_CODE, DEFAULT_MISSING_CODE,
    DEFAULT_PROTECTED_DIR, DEFAULT_PROTECTED_URL_BASE, DEFAULT_PUBLIC_DIR,
    DEFAULT_PUBLIC_URL_BASE, DEFAULT_REDIRECT_CODE, DEFAULT_RENAME_ATTEMPTS,
    DEFAULT_VERSION_PREFIX,
};
use crate::{AssetError, AssetResult};
use assets_fileid::{parse_scheme_list, FileIdScheme};
use assets_hashing::HashAlgorithm;
use assets_types::Visibility;
use std::path::{Path, PathBuf};

/// Which helper builds new file IDs, and which helpers resolve existing ones (in order).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemeConfig {
    pub default: FileIdScheme,
    pub resolution: Vec<FileIdScheme>,
}

impl SchemeConfig {
    /// Hash-prefixed IDs for new files; older natural and legacy paths still resolve.
    pub fn hashed() -> Self {
        Self {
            default: FileIdScheme::Hash,
            resolution: vec![
                FileIdScheme::Hash,
                FileIdScheme::Natural,
                FileIdScheme::Legacy,
            ],
        }
    }

    /// Natural IDs for new files, as used by sites that kept legacy filenames.
    pub fn natural() -> Self {
        Self {
            default: FileIdScheme::Natural,
            resolution: vec![FileIdScheme::Natural, FileIdScheme::Legacy],
        }
    }
}

/// Asset store configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct AssetsConfig {
    public_dir: PathBuf,
    protected_dir: PathBuf,
    public_url_base: String,
    protected_url_base: String,
    public_schemes: SchemeConfig,
    protected_schemes: SchemeConfig,
    legacy_filenames: bool,
    default_visibility: Visibility,
    hash_algorithm: HashAlgorithm,
    keep_empty_dirs: bool,
    rename_attempts: usize,
    version_prefix: String,
    missing_code: u16,
    denied_code: Option<u16>,
    redirect_code: u16,
    debug: bool,
}

impl AssetsConfig {
    /// Create a config for the two storage roots with every other setting at its default.
    pub fn new(public_dir: PathBuf, protected_dir: PathBuf) -> Self {
        Self {
            public_dir,
            protected_dir,
            public_url_base: DEFAULT_PUBLIC_URL_BASE.into(),
            protected_url_base: DEFAULT_PROTECTED_URL_BASE.into(),
            public_schemes: SchemeConfig::hashed(),
            // Protected files always keep their hash folder so draft versions never collide.
            protected_schemes: SchemeConfig::hashed(),
            legacy_filenames: false,
            default_visibility: Visibility::Public,
            hash_algorithm: HashAlgorithm::default(),
            keep_empty_dirs: false,
            rename_attempts: DEFAULT_RENAME_ATTEMPTS,
            version_prefix: DEFAULT_VERSION_PREFIX.into(),
            missing_code: DEFAULT_MISSING_CODE,
            denied_code: None,
            redirect_code: DEFAULT_REDIRECT_CODE,
            debug: false,
        }
    }

    pub fn with_url_bases(
        mut self,
        public_url_base: impl Into<String>,
        protected_url_base: impl Into<String>,
    ) -> Self {
        self.public_url_base = public_url_base.into();
        self.protected_url_base = protected_url_base.into();
        self
    }

    pub fn with_schemes(mut self, public: SchemeConfig, protected: SchemeConfig) -> Self {
        self.public_schemes = public;
        self.protected_schemes = protected;
        self
    }

    /// Store public files under natural filenames instead of hash folders.
    pub fn with_legacy_filenames(mut self, legacy_filenames: bool) -> Self {
        self.legacy_filenames = legacy_filenames;
        self.public_schemes = if legacy_filenames {
            SchemeConfig::natural()
        } else {
            SchemeConfig::hashed()
        };
        self
    }

    pub fn with_default_visibility(mut self, visibility: Visibility) -> Self {
        self.default_visibility = visibility;
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn with_keep_empty_dirs(mut self, keep: bool) -> Self {
        self.keep_empty_dirs = keep;
        self
    }

    pub fn with_rename_attempts(mut self, attempts: usize) -> Self {
        self.rename_attempts = attempts;
        self
    }

    pub fn with_version_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_prefix = prefix.into();
        self
    }

    pub fn with_redirect_code(mut self, code: u16) -> Self {
        self.redirect_code = code;
        self
    }

    pub fn with_missing_code(mut self, code: u16) -> Self {
        self.missing_code = code;
        self
    }

    /// Override the denied status. Without an override it follows the debug flag.
    pub fn with_denied_code(mut self, code: u16) -> Self {
        self.denied_code = Some(code);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Check the settings that cannot be fixed per call.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::Misconfiguration`] if the storage roots coincide, a URL base is
    /// empty, the redirect code is not a redirect, or the rename limit or prefix is unusable.
    pub fn validate(&self) -> AssetResult<()> {
        if self.public_dir == self.protected_dir {
            return Err(AssetError::Misconfiguration(
                "public and protected directories must differ".into(),
            ));
        }
        if self.public_url_base.trim().is_empty() {
            return Err(AssetError::Misconfiguration(
                "public URL base cannot be empty".into(),
            ));
        }
        if self.protected_url_base.trim().is_empty() {
            return Err(AssetError::Misconfiguration(
                "protected URL base cannot be empty".into(),
            ));
        }
        if !ALLOWED_REDIRECT_CODES.contains(&self.redirect_code) {
            return Err(AssetError::Misconfiguration(format!(
                "redirect code must be one of {:?}, got {}",
                ALLOWED_REDIRECT_CODES, self.redirect_code
            )));
        }
        if self.rename_attempts == 0 {
            return Err(AssetError::Misconfiguration(
                "rename attempts must be at least 1".into(),
            ));
        }
        if self.version_prefix.is_empty() || self.version_prefix.contains(&['/', '.'][..]) {
            return Err(AssetError::Misconfiguration(format!(
                "invalid version prefix: {:?}",
                self.version_prefix
            )));
        }
        Ok(())
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    pub fn protected_dir(&self) -> &Path {
        &self.protected_dir
    }

    pub fn public_url_base(&self) -> &str {
        &self.public_url_base
    }

    pub fn protected_url_base(&self) -> &str {
        &self.protected_url_base
    }

    pub fn schemes(&self, visibility: Visibility) -> &SchemeConfig {
        match visibility {
            Visibility::Public => &self.public_schemes,
            Visibility::Protected => &self.protected_schemes,
        }
    }

    pub fn legacy_filenames(&self) -> bool {
        self.legacy_filenames
    }

    pub fn default_visibility(&self) -> Visibility {
        self.default_visibility
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn keep_empty_dirs(&self) -> bool {
        self.keep_empty_dirs
    }

    pub fn rename_attempts(&self) -> usize {
        self.rename_attempts
    }

    pub fn version_prefix(&self) -> &str {
        &self.version_prefix
    }

    pub fn missing_code(&self) -> u16 {
        self.missing_code
    }

    pub fn denied_code(&self) -> u16 {
        match self.denied_code {
            Some(code) => code,
            None if self.debug => DEBUG_DENIED_CODE,
            None => DEFAULT_DENIED_CODE,
        }
    }

    pub fn redirect_code(&self) -> u16 {
        self.redirect_code
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_DIR.into(), DEFAULT_PROTECTED_DIR.into())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean flag from an optional string value.
///
/// Accepts `1/0`, `true/false`, `yes/no` and `on/off`. `None` or blank yields `default`.
pub fn bool_from_env_value(value: Option<String>, default: bool) -> AssetResult<bool> {
    let Some(value) = non_empty(value) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AssetError::Misconfiguration(format!(
            "expected a boolean flag, got {other:?}"
        ))),
    }
}

/// Parse the hash algorithm from an optional string value, defaulting to SHA-1.
pub fn hash_algorithm_from_env_value(value: Option<String>) -> AssetResult<HashAlgorithm> {
    Ok(non_empty(value)
        .map(|v| v.parse::<HashAlgorithm>())
        .transpose()?
        .unwrap_or_default())
}

/// Parse the redirect status code from an optional string value.
pub fn redirect_code_from_env_value(value: Option<String>) -> AssetResult<u16> {
    let Some(value) = non_empty(value) else {
        return Ok(DEFAULT_REDIRECT_CODE);
    };
    let code = value.parse::<u16>().map_err(|_| {
        AssetError::Misconfiguration(format!("redirect code must be numeric, got {value:?}"))
    })?;
    if !ALLOWED_REDIRECT_CODES.contains(&code) {
        return Err(AssetError::Misconfiguration(format!(
            "redirect code must be one of {ALLOWED_REDIRECT_CODES:?}, got {code}"
        )));
    }
    Ok(code)
}

/// Parse a comma-separated scheme order (`hash,natural,legacy`) from an optional string value.
pub fn schemes_from_env_value(
    value: Option<String>,
    default: SchemeConfig,
) -> AssetResult<SchemeConfig> {
    let Some(value) = non_empty(value) else {
        return Ok(default);
    };
    let schemes = parse_scheme_list(&value)
        .map_err(|e| AssetError::Misconfiguration(e.to_string()))?;
    let Some(first) = schemes.first().copied() else {
        return Ok(default);
    };
    Ok(SchemeConfig {
        default: first,
        resolution: schemes,
    })
}

/// Resolve an [`AssetsConfig`] from the process environment.
///
/// Intended for binaries at startup only. Reads `ASSETS_PUBLIC_DIR`, `ASSETS_PROTECTED_DIR`,
/// `ASSETS_PUBLIC_URL`, `ASSETS_PROTECTED_URL`, `ASSETS_LEGACY_FILENAMES`,
/// `ASSETS_PUBLIC_SCHEMES`, `ASSETS_PROTECTED_SCHEMES`, `ASSETS_HASH_ALGORITHM`,
/// `ASSETS_KEEP_EMPTY_DIRS`, `ASSETS_REDIRECT_CODE` and `ASSETS_DEBUG`.
pub fn assets_config_from_env() -> AssetResult<AssetsConfig> {
    let var = |name: &str| std::env::var(name).ok();

    let public_dir =
        non_empty(var("ASSETS_PUBLIC_DIR")).unwrap_or_else(|| DEFAULT_PUBLIC_DIR.into());
    let protected_dir =
        non_empty(var("ASSETS_PROTECTED_DIR")).unwrap_or_else(|| DEFAULT_PROTECTED_DIR.into());
    let public_url =
        non_empty(var("ASSETS_PUBLIC_URL")).unwrap_or_else(|| DEFAULT_PUBLIC_URL_BASE.into());
    let protected_url = non_empty(var("ASSETS_PROTECTED_URL"))
        .unwrap_or_else(|| DEFAULT_PROTECTED_URL_BASE.into());

    let legacy_filenames = bool_from_env_value(var("ASSETS_LEGACY_FILENAMES"), false)?;
    let mut config = AssetsConfig::new(public_dir.into(), protected_dir.into())
        .with_url_bases(public_url, protected_url)
        .with_legacy_filenames(legacy_filenames);

    let public_schemes = schemes_from_env_value(
        var("ASSETS_PUBLIC_SCHEMES"),
        config.schemes(Visibility::Public).clone(),
    )?;
    let protected_schemes = schemes_from_env_value(
        var("ASSETS_PROTECTED_SCHEMES"),
        config.schemes(Visibility::Protected).clone(),
    )?;
    config = config
        .with_schemes(public_schemes, protected_schemes)
        .with_hash_algorithm(hash_algorithm_from_env_value(var("ASSETS_HASH_ALGORITHM"))?)
        .with_keep_empty_dirs(bool_from_env_value(var("ASSETS_KEEP_EMPTY_DIRS"), false)?)
        .with_redirect_code(redirect_code_from_env_value(var("ASSETS_REDIRECT_CODE"))?)
        .with_debug(bool_from_env_value(var("ASSETS_DEBUG"), false)?);

    config.validate()?;
    Ok(config)
}
