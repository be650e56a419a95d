//! Cache manager for persisting HTTP response bodies to disk
//!
//! Provides a `CacheManager` that stores raw response bodies in one file per
//! URL. The file name is the SHA-256 of the URL and the file's modification
//! time doubles as the retrieval timestamp.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Extension used for cached response bodies
const BODY_EXTENSION: &str = "body";

/// Result of reading from cache, including metadata about cache freshness
#[derive(Debug)]
pub struct CachedBody {
    /// The cached response body
    pub body: String,
    /// When the body was written (file mtime)
    pub cached_at: DateTime<Utc>,
    /// Whether the entry is older than the TTL it was read with
    pub is_expired: bool,
}

/// Manages reading and writing cached response bodies to disk
///
/// Bodies live under an XDG-compliant cache directory (`~/.cache/matchstats/`
/// on Linux) unless a directory is given explicitly. Expired entries are still
/// returned (with `is_expired = true`) so callers decide what stale means.
#[derive(Debug, Clone)]
pub struct CacheManager {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl CacheManager {
    /// Creates a new CacheManager using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        default_cache_dir().map(Self::with_dir)
    }

    /// Creates a new CacheManager with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Directory holding the cache files
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Stable cache key for a URL: lowercase hex SHA-256
    pub fn key_for(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    /// Returns the path to the cache file for the given URL
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", Self::key_for(url), BODY_EXTENSION))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// Writes a response body for `url`, replacing any previous entry
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err` if directory creation or file writing fails
    pub fn write(&self, url: &str, body: &str) -> std::io::Result<()> {
        self.ensure_dir()?;
        fs::write(self.path_for(url), body)
    }

    /// Reads the cached body for `url`
    ///
    /// An entry is fresh while its age is strictly below `ttl`; a zero TTL
    /// therefore always reports the entry as expired.
    ///
    /// # Returns
    /// * `Some(CachedBody)` if the entry exists and can be read
    /// * `None` if the entry doesn't exist or reading fails
    pub fn read(&self, url: &str, ttl: Duration) -> Option<CachedBody> {
        let path = self.path_for(url);
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let body = fs::read_to_string(&path).ok()?;

        // A timestamp in the future counts as age zero
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();

        Some(CachedBody {
            body,
            cached_at: DateTime::<Utc>::from(modified),
            is_expired: age >= ttl,
        })
    }
}

/// Platform cache directory for matchstats, if a home directory is known
pub fn default_cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "matchstats").map(|dirs| dirs.cache_dir().to_path_buf())
}
