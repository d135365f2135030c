use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::CacheKey;

/// Blob storage: one file per key directly inside the cache directory.
#[derive(Debug, Clone)]
pub(super) struct CacheStore {
    disk_dir: PathBuf,
}

impl CacheStore {
    pub(super) fn open(disk_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&disk_dir)
            .with_context(|| format!("failed to create cache directory {}", disk_dir.display()))?;
        Ok(Self { disk_dir })
    }

    pub(super) fn disk_dir(&self) -> &Path {
        &self.disk_dir
    }

    pub(super) fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.disk_dir.join(key.as_str())
    }

    /// Reads a blob. A missing file is `Ok(None)`, not an error.
    pub(super) fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(key);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read cache blob {}", path.display()))
            }
        }
    }

    /// Overwrites the blob and flushes it to disk before returning.
    pub(super) fn put(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
        let path = self.blob_path(key);
        write_private_file(&path, data)
            .with_context(|| format!("failed to write cache blob {}", path.display()))
    }

    pub(super) fn delete(&self, key: &CacheKey) {
        let path = self.blob_path(key);
        if let Err(err) = fs::remove_file(&path)
            && err.kind() != io::ErrorKind::NotFound
        {
            tracing::debug!(path = %path.display(), error = %err, "failed to remove cache blob");
        }
    }

    pub(super) fn contains(&self, key: &CacheKey) -> bool {
        self.blob_path(key).is_file()
    }
}

/// Truncating write with owner-only permissions on Unix, synced before returning.
pub(super) fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
