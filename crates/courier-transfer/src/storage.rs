use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::fs;
use tracing::debug;

/// Where completed transfers end up.
///
/// Only touched once per transfer, after the terminal chunk.
pub trait FileStorage: Send + Sync {
    fn ensure_directory(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;

    fn write(&self, path: &Path, bytes: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

/// Writes completed transfers to the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskStorage;

impl FileStorage for DiskStorage {
    async fn ensure_directory(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// Keeps completed transfers in memory. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files
            .lock()
            .expect("memory storage lock poisoned")
            .get(path)
            .cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .expect("memory storage lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl FileStorage for MemoryStorage {
    async fn ensure_directory(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.files
            .lock()
            .map_err(|e| io::Error::other(format!("memory storage lock poisoned: {}", e)))?
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }
}
