//! Persistent team-name to identity mapping
//!
//! The whole mapping is loaded at startup and rewritten after every change.
//! Writes are not atomic; a crash mid-write can leave a truncated file, which
//! loads as an empty mapping on the next run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::data::TeamIdentity;

/// On-disk mapping of cache key to resolved team identity
#[derive(Debug)]
pub struct IdentityCache {
    path: PathBuf,
    entries: BTreeMap<String, TeamIdentity>,
}

impl IdentityCache {
    /// Loads the mapping stored at `path`
    ///
    /// A missing file yields an empty cache. An unreadable or malformed file
    /// is logged and also yields an empty cache, which replaces it on the next
    /// flush.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, TeamIdentity>>(&content) {
                Ok(entries) => {
                    info!("Loaded {} team mappings from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    error!("Error parsing team mapping cache {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                error!("Error loading team mapping cache {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        Self { path, entries }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&TeamIdentity> {
        self.entries.get(key)
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TeamIdentity)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts without touching the disk; pair with [`IdentityCache::flush`]
    pub fn insert(&mut self, key: impl Into<String>, identity: TeamIdentity) {
        self.entries.insert(key.into(), identity);
    }

    /// Inserts and immediately rewrites the backing file
    pub fn put(&mut self, key: impl Into<String>, identity: TeamIdentity) -> std::io::Result<()> {
        self.insert(key, identity);
        self.flush()
    }

    /// Rewrites the backing file with the full mapping
    pub fn flush(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, json)?;
        debug!("Saved {} team mappings to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}
