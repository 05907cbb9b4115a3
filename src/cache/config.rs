//! File cache configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::CacheError;

/// Environment variable overriding [`CacheConfig::dir`].
pub const ENV_DIR: &str = "NIXCACHE_DIR";
/// Environment variable overriding [`CacheConfig::clean_policy`].
pub const ENV_CLEAN_POLICY: &str = "NIXCACHE_CLEAN_POLICY";
/// Environment variable overriding [`CacheConfig::create_dir`].
pub const ENV_CREATE_DIR: &str = "NIXCACHE_CREATE_DIR";

/// What [`FileCache::clean`](super::FileCache::clean) does when a file cannot
/// be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanPolicy {
    /// Stop at the first failure and leave the remaining files in place.
    #[default]
    FailFast,
    /// Try every file, then report how many could not be deleted.
    BestEffort,
}

impl FromStr for CleanPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(Self::FailFast),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(CacheError::Config(format!("unknown clean policy {other:?}"))),
        }
    }
}

/// Settings for a [`FileCache`](super::FileCache).
///
/// # Examples
///
/// ```
/// use nixcache::cache::{CacheConfig, CleanPolicy};
///
/// let config = CacheConfig::for_app_root("/srv/app")
///     .clean_policy(CleanPolicy::BestEffort)
///     .create_dir(false);
///
/// assert!(config.dir.ends_with("temp/cache"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Flat directory holding one file per entry.
    pub dir: PathBuf,
    /// Failure handling for bulk deletes.
    pub clean_policy: CleanPolicy,
    /// Create `dir` (and parents) on open when it is missing.
    pub create_dir: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(Path::new("temp").join("cache"))
    }
}

impl CacheConfig {
    /// Configuration storing entries in `dir`, with fail-fast cleaning and
    /// directory creation enabled.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            clean_policy: CleanPolicy::default(),
            create_dir: true,
        }
    }

    /// Configuration for the conventional `<app-root>/temp/cache` layout.
    pub fn for_app_root(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join("temp").join("cache"))
    }

    /// Sets the clean failure policy.
    #[must_use]
    pub fn clean_policy(mut self, policy: CleanPolicy) -> Self {
        self.clean_policy = policy;
        self
    }

    /// Sets whether a missing directory is created on open.
    #[must_use]
    pub fn create_dir(mut self, create: bool) -> Self {
        self.create_dir = create;
        self
    }

    /// Parses a JSON document; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for malformed JSON or unknown values.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        serde_json::from_str(json).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Builds a configuration from `NIXCACHE_*` environment variables,
    /// falling back to [`CacheConfig::default`] for unset ones.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, CacheError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CacheError> {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DIR) {
            config.dir = PathBuf::from(dir);
        }
        if let Some(policy) = lookup(ENV_CLEAN_POLICY) {
            config.clean_policy = policy.parse()?;
        }
        if let Some(create) = lookup(ENV_CREATE_DIR) {
            config.create_dir = parse_flag(&create).ok_or_else(|| {
                CacheError::Config(format!("{ENV_CREATE_DIR} must be a boolean, got {create:?}"))
            })?;
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
