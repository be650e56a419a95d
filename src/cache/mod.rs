//! On-disk caches
//!
//! `CacheManager` stores raw HTTP response bodies keyed by URL hash, with
//! freshness judged from the file modification time. `IdentityCache` keeps the
//! resolved team identities in a single JSON file that is rewritten after every
//! change.

mod identity;
mod manager;

pub use identity::IdentityCache;
pub use manager::{default_cache_dir, CacheManager, CachedBody};
