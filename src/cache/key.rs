//! Cache keys and the file names derived from them.
//!
//! Every entry lives in a file named `cache_<md5(id)>.<md5(group)>`. Putting
//! the group digest in the extension lets a group be selected by file-name
//! suffix alone, without opening any file.

use std::fmt;

use super::CacheError;

/// Group used when the caller does not pick one.
pub const DEFAULT_GROUP: &str = "default";

/// Prefix shared by every cache file name.
pub(crate) const FILE_PREFIX: &str = "cache_";

/// An `(id, group)` pair addressing a single cache entry.
///
/// Both parts must be non-empty.
///
/// # Examples
///
/// ```
/// use nixcache::cache::CacheKey;
///
/// let key = CacheKey::new("hello").unwrap();
/// assert_eq!(key.group(), "default");
/// assert_eq!(
///     key.file_name(),
///     "cache_5d41402abc4b2a76b9719d911017c592.c21f969b5f03d33d43e04f8f136e7682"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    id: String,
    group: String,
}

impl CacheKey {
    /// Creates a key in the [`DEFAULT_GROUP`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, CacheError> {
        Self::with_group(id, DEFAULT_GROUP)
    }

    /// Creates a key in an explicit group.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] if `id` or `group` is empty.
    pub fn with_group(id: impl Into<String>, group: impl Into<String>) -> Result<Self, CacheError> {
        let id = id.into();
        let group = group.into();

        if id.is_empty() {
            return Err(CacheError::InvalidKey {
                reason: "id must not be empty",
            });
        }
        if group.is_empty() {
            return Err(CacheError::InvalidKey {
                reason: "group must not be empty",
            });
        }

        Ok(Self { id, group })
    }

    /// Returns the caller-chosen id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the group this key belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the backing file name, `cache_<md5(id)>.<md5(group)>`.
    pub fn file_name(&self) -> String {
        format!("{FILE_PREFIX}{}{}", digest(&self.id), group_suffix(&self.group))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.id)
    }
}

/// Lower-case hex MD5 digest of `input`.
pub(crate) fn digest(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// File-name suffix shared by every entry of `group`, leading dot included.
pub(crate) fn group_suffix(group: &str) -> String {
    format!(".{}", digest(group))
}

/// Returns `true` for names that belong to committed cache entries.
///
/// Temporary files written during a save start with a dot and never match.
pub(crate) fn is_cache_file(name: &str) -> bool {
    name.starts_with(FILE_PREFIX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn default_group_applied() {
        let key = CacheKey::new("k1").unwrap();
        assert_eq!(key.id(), "k1");
        assert_eq!(key.group(), DEFAULT_GROUP);
    }

    #[test]
    fn file_name_matches_known_digests() {
        let key = CacheKey::with_group("k1", "g1").unwrap();
        assert_eq!(
            key.file_name(),
            "cache_b637b17af08aced8850c18cccde915da.0120a4f9196a5f9eb9f523f31f914da7"
        );
    }

    #[test]
    fn file_name_is_deterministic() {
        let a = CacheKey::with_group("user:42", "pages").unwrap();
        let b = CacheKey::with_group("user:42", "pages").unwrap();
        assert_eq!(a.file_name(), b.file_name());
    }

    #[test]
    fn group_selects_suffix() {
        let key = CacheKey::with_group("anything", "pages").unwrap();
        assert!(key.file_name().ends_with(".b3b32a2d422265cd25c3323ed0157f81"));
        assert!(key.file_name().ends_with(&group_suffix("pages")));
    }

    #[test]
    fn empty_parts_rejected() {
        assert!(matches!(
            CacheKey::new(""),
            Err(CacheError::InvalidKey { .. })
        ));
        assert!(matches!(
            CacheKey::with_group("id", ""),
            Err(CacheError::InvalidKey { .. })
        ));
    }

    #[test]
    fn swapped_id_and_group_differ() {
        let a = CacheKey::with_group("a", "b").unwrap();
        let b = CacheKey::with_group("b", "a").unwrap();
        assert_ne!(a.file_name(), b.file_name());
    }

    #[test]
    fn no_collisions_across_corpus() {
        let mut seen = HashSet::new();
        for group in ["default", "pages", "fragments", "api", "g1"] {
            for i in 0..500 {
                let key = CacheKey::with_group(format!("entry-{i}"), group).unwrap();
                assert!(seen.insert(key.file_name()), "collision for {key}");
            }
        }
        assert_eq!(seen.len(), 2500);
    }

    #[test]
    fn temp_names_are_not_cache_files() {
        assert!(is_cache_file("cache_abc.def"));
        assert!(!is_cache_file(".cache_abc.def.12.0.tmp"));
        assert!(!is_cache_file("README"));
    }

    #[test]
    fn display_shows_group_and_id() {
        let key = CacheKey::with_group("home", "pages").unwrap();
        assert_eq!(key.to_string(), "pages/home");
    }
}
