use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task;
use tracing::{debug, info, trace, warn};

mod entry;
mod index;
mod key;
mod store;

pub use entry::CacheEntry;
pub use key::CacheKey;

use index::{CacheIndex, INDEX_FILE_NAME};
use store::CacheStore;

use crate::util::unix_now;

/// A fresh cache hit: the raw response bytes exactly as they were stored.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub entry: CacheEntry,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    TooLarge,
}

impl StoreOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreOutcome::Stored => "stored",
            StoreOutcome::TooLarge => "skipped",
        }
    }
}

/// Shared response cache: a url-keyed index persisted as one JSON document,
/// plus one blob file per url named by its [`CacheKey`].
#[derive(Clone)]
pub struct HttpCache {
    state: Arc<CacheState>,
}

#[derive(Debug)]
struct CacheState {
    index: Mutex<CacheIndex>,
    store: CacheStore,
    ttl: Duration,
    max_entry_size: u64,
}

impl HttpCache {
    pub async fn new(disk_dir: PathBuf, ttl: Duration, max_entry_size: u64) -> Result<Self> {
        task::spawn_blocking(move || Self::open(disk_dir, ttl, max_entry_size))
            .await
            .map_err(|err| anyhow!("cache open task failed: {err}"))?
    }

    /// Opens the cache directory and loads the index, dropping entries whose
    /// blob has gone missing. An unreadable index starts the cache empty.
    pub fn open(disk_dir: PathBuf, ttl: Duration, max_entry_size: u64) -> Result<Self> {
        let store = CacheStore::open(disk_dir)?;
        let index_path = store.disk_dir().join(INDEX_FILE_NAME);
        let mut index = match CacheIndex::load(index_path.clone()) {
            Ok(index) => index,
            Err(err) => {
                warn!(error = format!("{err:#}"), "cache index unreadable; starting empty");
                CacheIndex::empty(index_path)
            }
        };

        let dangling = index.retain(|url, _| store.contains(&CacheKey::for_url(url)));
        if dangling > 0 {
            info!(removed = dangling, "dropped cache entries without a stored body");
            index.persist()?;
        }
        info!(
            entries = index.len(),
            path = %index.path().display(),
            "cache index loaded"
        );

        Ok(Self {
            state: Arc::new(CacheState {
                index: Mutex::new(index),
                store,
                ttl,
                max_entry_size,
            }),
        })
    }

    pub fn disk_dir(&self) -> &Path {
        self.state.store.disk_dir()
    }

    /// Returns the stored response for `url` when a fresh entry exists.
    pub async fn lookup(&self, url: &str) -> Result<Option<CachedResponse>> {
        let state = self.state.clone();
        let url = url.to_string();
        task::spawn_blocking(move || state.fetch_at(&url, unix_now()))
            .await
            .map_err(|err| anyhow!("cache lookup task failed: {err}"))?
    }

    /// Stores `body` for `url`, replacing any earlier entry.
    pub async fn store(
        &self,
        url: String,
        headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> Result<StoreOutcome> {
        let state = self.state.clone();
        task::spawn_blocking(move || state.store_at(url, headers, &body, unix_now()))
            .await
            .map_err(|err| anyhow!("cache store task failed: {err}"))?
    }

    pub fn len(&self) -> usize {
        self.state.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheState {
    /// Index check under the lock. An expired entry is evicted here along with
    /// its blob, and the index is persisted before returning.
    fn lookup_at(&self, url: &str, now: f64) -> Option<CacheEntry> {
        let mut index = self.index.lock();
        let entry = index.get(url)?;
        if entry.is_fresh(now, self.ttl) {
            return Some(entry.clone());
        }

        trace!(url, "cache entry expired");
        index.remove(url);
        self.store.delete(&CacheKey::for_url(url));
        if let Err(err) = index.persist() {
            warn!(error = format!("{err:#}"), "failed to persist cache index after eviction");
        }
        crate::metrics::record_cache_eviction();
        None
    }

    fn fetch_at(&self, url: &str, now: f64) -> Result<Option<CachedResponse>> {
        let Some(entry) = self.lookup_at(url, now) else {
            crate::metrics::record_cache_lookup(false);
            return Ok(None);
        };

        let key = CacheKey::for_url(url);
        let body = match self.store.get(&key) {
            Ok(Some(body)) => body,
            Ok(None) => {
                debug!(url, key = %key, "cache body missing on disk");
                self.forget_if_unchanged(url, &entry);
                crate::metrics::record_cache_lookup(false);
                return Ok(None);
            }
            Err(err) => {
                crate::metrics::record_cache_lookup(false);
                return Err(err);
            }
        };

        crate::metrics::record_cache_lookup(true);
        Ok(Some(CachedResponse {
            entry,
            body: Bytes::from(body),
        }))
    }

    /// Drops the index entry for a vanished blob unless a concurrent store has
    /// already replaced it.
    fn forget_if_unchanged(&self, url: &str, seen: &CacheEntry) {
        let mut index = self.index.lock();
        if index.get(url).is_some_and(|current| current.stored_at == seen.stored_at) {
            index.remove(url);
            if let Err(err) = index.persist() {
                warn!(error = format!("{err:#}"), "failed to persist cache index after repair");
            }
        }
    }

    fn store_at(
        &self,
        url: String,
        headers: BTreeMap<String, String>,
        body: &[u8],
        now: f64,
    ) -> Result<StoreOutcome> {
        if body.len() as u64 > self.max_entry_size {
            trace!(url, size = body.len(), "response exceeds cache entry limit");
            return Ok(StoreOutcome::TooLarge);
        }

        let key = CacheKey::for_url(&url);
        let mut index = self.index.lock();
        let result = self.store.put(&key, body).and_then(|()| {
            index.insert(url, CacheEntry::new(now, headers));
            index.persist()
        });
        match result {
            Ok(()) => {
                crate::metrics::record_cache_store();
                Ok(StoreOutcome::Stored)
            }
            Err(err) => {
                crate::metrics::record_cache_store_error();
                Err(err)
            }
        }
    }
}
