//! Filesystem-backed key/value cache with time-based expiry.
//!
//! Each entry is one file in a flat directory, named after the MD5 digests of
//! its id and group (see [`CacheKey::file_name`]). The directory listing is
//! the index; there is no manifest.
//!
//! - [`FileCache::get`] returns `Ok(None)` for missing, expired and malformed
//!   entries. Reads never delete anything.
//! - [`FileCache::save_as`] writes to a temporary file and renames it into
//!   place, so readers see either the old or the new entry.
//! - [`FileCache::remove`] fails when the entry does not exist.
//! - [`FileCache::clean`] deletes a whole group, or every entry.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nixcache::cache::{CacheConfig, CacheKey, FileCache, Lifetime};
//!
//! # async fn example() -> Result<(), nixcache::cache::CacheError> {
//! let cache = FileCache::open(CacheConfig::for_app_root("/srv/app")).await?;
//! let key = CacheKey::with_group("home", "pages")?;
//!
//! if cache.get(&key).await?.is_none() {
//!     // Saves under the key of the preceding `get`.
//!     cache.save("<h1>Home</h1>", "+1 hour".parse()?).await?;
//! }
//! cache.clean(Some("pages")).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

mod config;
mod key;
mod lifetime;
mod record;

pub use config::{CacheConfig, CleanPolicy, ENV_CLEAN_POLICY, ENV_CREATE_DIR, ENV_DIR};
pub use key::{CacheKey, DEFAULT_GROUP};
pub use lifetime::{Lifetime, MAX_TIMESTAMP};

use record::{HEADER_LEN, Record};

/// Errors produced by the file cache.
///
/// A cache miss is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache key: {reason}")]
    InvalidKey { reason: &'static str },

    #[error("invalid cache lifetime {input:?}")]
    InvalidLifetime { input: String },

    #[error("save without a key requires a preceding get")]
    NoCurrentKey,

    #[error("no cache entry {id:?} in group {group:?}")]
    NotFound { id: String, group: String },

    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache clean removed {removed} files but could not delete {failed}")]
    PartialClean { removed: usize, failed: usize },

    #[error("cache directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("invalid cache configuration: {0}")]
    Config(String),
}

impl CacheError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

// Distinguishes temporary files written concurrently by one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A directory of cache files.
///
/// The instance remembers the key of the most recent [`get`](Self::get) so
/// that [`save`](Self::save) can be called without one. That shortcut assumes
/// one in-flight request per instance; concurrent callers should use
/// [`save_as`](Self::save_as), [`entry`](Self::entry) or
/// [`get_or_save_with`](Self::get_or_save_with) instead.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    clean_policy: CleanPolicy,
    current: Mutex<Option<CacheKey>>,
}

impl FileCache {
    /// Opens the cache directory described by `config`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingDirectory`]: the directory is absent and
    ///   `create_dir` is off, or the path is not a directory.
    /// - [`CacheError::Io`]: the directory could not be inspected or created.
    pub async fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let CacheConfig {
            dir,
            clean_policy,
            create_dir,
        } = config;

        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(CacheError::MissingDirectory(dir)),
            Err(e) if e.kind() == io::ErrorKind::NotFound && create_dir => {
                fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| CacheError::io("create", &dir, e))?;
                debug!(dir = %dir.display(), "created cache directory");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::MissingDirectory(dir));
            }
            Err(e) => return Err(CacheError::io("inspect", &dir, e)),
        }

        debug!(dir = %dir.display(), policy = ?clean_policy, "file cache opened");
        Ok(Self {
            dir,
            clean_policy,
            current: Mutex::new(None),
        })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file backing `key`, whether or not it exists.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Returns the key recorded by the most recent [`get`](Self::get).
    pub fn current_key(&self) -> Option<CacheKey> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Looks up a live entry and records `key` for a following [`save`](Self::save).
    ///
    /// Missing, expired and unreadable-format files all return `Ok(None)` and
    /// are left on disk.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] if the file exists but cannot be read.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
        self.read_live(key).await
    }

    /// Returns `true` if `key` has a live entry. Reads only the file header and
    /// leaves the recorded key untouched.
    pub async fn contains(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let path = self.path_for(key);
        match read_header(&path).await {
            Ok(header) => Ok(header.is_some_and(|header| header.is_live(now()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io("read", &path, e)),
        }
    }

    /// Saves `value` under the key recorded by the most recent [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// - [`CacheError::NoCurrentKey`]: no `get` has been made on this instance.
    /// - [`CacheError::Io`]: see [`save_as`](Self::save_as).
    pub async fn save(&self, value: impl Into<Bytes>, lifetime: Lifetime) -> Result<(), CacheError> {
        let key = self.current_key().ok_or(CacheError::NoCurrentKey)?;
        self.save_as(&key, value, lifetime).await
    }

    /// Saves `value` under `key`, replacing any previous entry.
    ///
    /// The record is written to a dot-prefixed temporary file in the cache
    /// directory, synced to disk, stamped with the expiry as its modification
    /// time and renamed over the target. On failure the temporary file is removed and the
    /// previous entry, if any, is left as it was.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] if the write or the rename fails (unwritable
    /// directory, full disk, ...).
    pub async fn save_as(
        &self,
        key: &CacheKey,
        value: impl Into<Bytes>,
        lifetime: Lifetime,
    ) -> Result<(), CacheError> {
        let expires_at = lifetime.expires_at();
        let record = Record::new(expires_at, value.into());
        let path = self.path_for(key);
        let temp = self.temp_path_for(key);

        let committed = match write_record(&temp, &record).await {
            Ok(()) => fs::rename(&temp, &path)
                .await
                .map_err(|e| CacheError::io("rename", &path, e)),
            Err(e) => Err(e),
        };

        if let Err(e) = committed {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %temp.display(), error = %cleanup, "failed to remove temporary cache file");
                }
            }
            return Err(e);
        }

        debug!(key = %key, expires_at, bytes = record.value.len(), "cache entry saved");
        Ok(())
    }

    /// Deletes the entry for `key`, expired or not.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NotFound`]: there is no file for `key`.
    /// - [`CacheError::Io`]: the file exists but could not be deleted.
    pub async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, "cache entry removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CacheError::NotFound {
                id: key.id().to_owned(),
                group: key.group().to_owned(),
            }),
            Err(e) => Err(CacheError::io("remove", &path, e)),
        }
    }

    /// Deletes every entry of `group`, or every entry when `group` is `None`
    /// or empty, and returns how many files were deleted.
    ///
    /// Files are visited in directory order. Files that disappear while
    /// cleaning are skipped. Other failures follow the configured
    /// [`CleanPolicy`].
    ///
    /// # Errors
    ///
    /// - [`CacheError::Io`]: listing failed, or a delete failed under
    ///   [`CleanPolicy::FailFast`].
    /// - [`CacheError::PartialClean`]: some deletes failed under
    ///   [`CleanPolicy::BestEffort`].
    pub async fn clean(&self, group: Option<&str>) -> Result<usize, CacheError> {
        let suffix = group.filter(|g| !g.is_empty()).map(key::group_suffix);
        let files = self
            .list(|name| suffix.as_deref().is_none_or(|suffix| name.ends_with(suffix)))
            .await?;

        let removed = self.delete_all(files).await?;
        debug!(group = group.unwrap_or("*"), removed, "cache cleaned");
        Ok(removed)
    }

    /// Deletes every expired or malformed entry and returns how many were
    /// deleted. Live entries are kept.
    ///
    /// # Errors
    ///
    /// Same as [`clean`](Self::clean).
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = now();
        let mut stale = Vec::new();

        for path in self.list(|_| true).await? {
            let expired = match read_header(&path).await {
                Ok(header) => header.is_none_or(|header| !header.is_live(now)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::io("read", &path, e)),
            };
            if expired {
                stale.push(path);
            }
        }

        let removed = self.delete_all(stale).await?;
        debug!(removed, "expired cache entries purged");
        Ok(removed)
    }

    /// Returns a handle bound to `key`.
    pub fn entry(&self, key: CacheKey) -> CacheEntry<'_> {
        CacheEntry { cache: self, key }
    }

    /// Returns the live value for `key`, or computes, saves and returns it.
    ///
    /// # Errors
    ///
    /// Propagates lookup and save failures; `compute` itself cannot fail.
    pub async fn get_or_save_with<F, Fut, V>(
        &self,
        key: &CacheKey,
        lifetime: Lifetime,
        compute: F,
    ) -> Result<Bytes, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
        V: Into<Bytes>,
    {
        if let Some(value) = self.read_live(key).await? {
            return Ok(value);
        }

        let value: Bytes = compute().await.into();
        self.save_as(key, value.clone(), lifetime).await?;
        Ok(value)
    }

    async fn read_live(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        let path = self.path_for(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(key = %key, "cache miss");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::io("read", &path, e)),
        };

        let Some(record) = Record::decode(Bytes::from(raw)) else {
            warn!(key = %key, path = %path.display(), "unrecognized cache file, treating as miss");
            return Ok(None);
        };

        if !record.is_live(now()) {
            debug!(key = %key, expires_at = record.expires_at, "cache entry expired");
            return Ok(None);
        }

        debug!(key = %key, bytes = record.value.len(), "cache hit");
        Ok(Some(record.value))
    }

    fn temp_path_for(&self, key: &CacheKey) -> PathBuf {
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{seq}.tmp",
            key.file_name(),
            std::process::id()
        ))
    }

    // Regular cache files whose name passes `filter`. A missing directory is empty.
    async fn list(&self, filter: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, CacheError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io("list", &self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io("list", &self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !key::is_cache_file(name) || !filter(name) {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_file() => files.push(entry.path()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io("inspect", &entry.path(), e)),
            }
        }
        Ok(files)
    }

    async fn delete_all(&self, files: Vec<PathBuf>) -> Result<usize, CacheError> {
        let mut removed = 0;
        let mut failed = 0;

        for path in files {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => match self.clean_policy {
                    CleanPolicy::FailFast => return Err(CacheError::io("remove", &path, e)),
                    CleanPolicy::BestEffort => {
                        warn!(path = %path.display(), error = %e, "failed to delete cache file");
                        failed += 1;
                    }
                },
            }
        }

        if failed > 0 {
            return Err(CacheError::PartialClean { removed, failed });
        }
        Ok(removed)
    }
}

/// A [`FileCache`] entry addressed by an explicit key.
///
/// Obtained from [`FileCache::entry`]. Unlike the key-less
/// [`FileCache::save`], the key travels with the handle.
///
/// # Examples
///
/// ```rust,no_run
/// use nixcache::cache::{CacheKey, FileCache, Lifetime};
///
/// # async fn example(cache: &FileCache) -> Result<(), nixcache::cache::CacheError> {
/// let entry = cache.entry(CacheKey::with_group("sidebar", "fragments")?);
/// if entry.get().await?.is_none() {
///     entry.save("<ul></ul>", "+10 minutes".parse()?).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CacheEntry<'a> {
    cache: &'a FileCache,
    key: CacheKey,
}

impl CacheEntry<'_> {
    /// Returns the key this handle addresses.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the live value, if any.
    pub async fn get(&self) -> Result<Option<Bytes>, CacheError> {
        self.cache.read_live(&self.key).await
    }

    /// Saves `value` under this handle's key.
    pub async fn save(&self, value: impl Into<Bytes>, lifetime: Lifetime) -> Result<(), CacheError> {
        self.cache.save_as(&self.key, value, lifetime).await
    }

    /// Deletes the entry; fails if it does not exist.
    pub async fn remove(&self) -> Result<(), CacheError> {
        self.cache.remove(&self.key).await
    }
}

async fn write_record(path: &Path, record: &Record) -> Result<(), CacheError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| CacheError::io("create", path, e))?;
    file.write_all(&record.encode())
        .await
        .map_err(|e| CacheError::io("write", path, e))?;
    file.flush()
        .await
        .map_err(|e| CacheError::io("write", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| CacheError::io("sync", path, e))?;

    // The header is authoritative; the mtime mirrors it for directory listings.
    let file = file.into_std().await;
    let mtime = system_time(record.expires_at);
    match tokio::task::spawn_blocking(move || file.set_modified(mtime)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(path = %path.display(), error = %e, "could not stamp cache file mtime"),
        Err(e) => debug!(path = %path.display(), error = %e, "mtime task failed"),
    }
    Ok(())
}

// Header of a committed-looking file; `None` if it is foreign or its size
// disagrees with the recorded value length.
async fn read_header(path: &Path) -> io::Result<Option<record::Header>> {
    let mut file = fs::File::open(path).await?;
    let mut buf = [0u8; HEADER_LEN];
    match file.read_exact(&mut buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let Some(header) = record::decode_header(&buf) else {
        return Ok(None);
    };
    let len = file.metadata().await?.len();
    Ok((len == header.file_len()).then_some(header))
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn system_time(timestamp: i64) -> SystemTime {
    let offset = Duration::from_secs(timestamp.unsigned_abs());
    if timestamp >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}
