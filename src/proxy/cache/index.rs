use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::CacheEntry;
use super::store::write_private_file;

pub(super) const INDEX_FILE_NAME: &str = "cache_index.json";

/// In-memory url → entry mapping mirrored to a single JSON document.
#[derive(Debug)]
pub(super) struct CacheIndex {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl CacheIndex {
    pub(super) fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: HashMap::new(),
        }
    }

    /// Loads the persisted mapping; a missing file yields an empty index.
    pub(super) fn load(path: PathBuf) -> Result<Self> {
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read cache index {}", path.display()));
            }
        };
        let entries: HashMap<String, CacheEntry> = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse cache index {}", path.display()))?;
        Ok(Self { path, entries })
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    pub(super) fn insert(&mut self, url: String, entry: CacheEntry) {
        self.entries.insert(url, entry);
    }

    pub(super) fn remove(&mut self, url: &str) {
        self.entries.remove(url);
    }

    /// Drops every entry for which `keep` returns false, returning how many went.
    pub(super) fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str, &CacheEntry) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|url, entry| keep(url, entry));
        before - self.entries.len()
    }

    /// Rewrites the whole document. Not atomic: a crash mid-write can leave a
    /// truncated file, which the next start treats as an empty index.
    pub(super) fn persist(&self) -> Result<()> {
        let data = serde_json::to_vec(&self.entries)?;
        write_private_file(&self.path, &data)
            .with_context(|| format!("failed to write cache index {}", self.path.display()))
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}
