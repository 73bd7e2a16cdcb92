//! # Backing Store
//!
//! The file-system capability the disk tier is built on. [`FsBackingStore`]
//! talks to the real file system through `tokio::fs`; [`MemoryBackingStore`]
//! keeps everything in a map and is meant for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::fs;
use tokio::io;
use tracing::warn;

/// Abstract file-system operations used by the disk tier
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Read the whole file at `path`
    async fn read(&self, path: &Path) -> io::Result<Bytes>;

    /// Check whether `path` exists
    async fn exists(&self, path: &Path) -> bool;

    /// Replace the file at `path` with `data`
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Create `path` and all of its missing parents
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a single file
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything below it
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// List the direct children of a directory
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Last modification time of the file at `path`
    async fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

/// Sequence used to give concurrent writers distinct temporary files
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// [`BackingStore`] on top of the local file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBackingStore;

impl FsBackingStore {
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{seq}.tmp"));
        path.with_file_name(name)
    }
}

#[async_trait]
impl BackingStore for FsBackingStore {
    async fn read(&self, path: &Path) -> io::Result<Bytes> {
        fs::read(path).await.map(Bytes::from)
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        // Write to a temporary file then rename, so readers never see a
        // partially written entry
        let temp_path = Self::temp_path(path);

        if let Err(e) = fs::write(&temp_path, data).await {
            warn!(path = ?temp_path, error = %e, "Failed to write cache data file");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            warn!(
                from = ?temp_path,
                to = ?path,
                error = %e,
                "Failed to rename temporary data file"
            );
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path).await
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        Ok(paths)
    }

    async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path).await?.modified()
    }
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: BTreeMap<PathBuf, (Bytes, SystemTime)>,
    dirs: BTreeSet<PathBuf>,
}

/// In-memory [`BackingStore`] for testing.
///
/// Stores all data in memory, no disk I/O. Writes can be made to fail and
/// modification times can be rewound to exercise error and expiry paths.
#[derive(Debug, Default)]
pub struct MemoryBackingStore {
    inner: Mutex<MemoryFiles>,
    fail_writes: AtomicBool,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite the modification time of an existing file
    pub fn set_modified(&self, path: &Path, time: SystemTime) -> bool {
        match self.inner.lock().files.get_mut(path) {
            Some(entry) => {
                entry.1 = time;
                true
            }
            None => false,
        }
    }

    /// Replace the contents of an existing file without touching its mtime
    pub fn corrupt(&self, path: &Path, data: &[u8]) -> bool {
        match self.inner.lock().files.get_mut(path) {
            Some(entry) => {
                entry.0 = Bytes::copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Number of files currently stored
    pub fn file_count(&self) -> usize {
        self.inner.lock().files.len()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn read(&self, path: &Path) -> io::Result<Bytes> {
        self.inner
            .lock()
            .files
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| not_found(path))
    }

    async fn exists(&self, path: &Path) -> bool {
        let inner = self.inner.lock();
        inner.files.contains_key(path) || inner.dirs.contains(path)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::StorageFull,
                "no space left on device",
            ));
        }
        let mut inner = self.inner.lock();
        // Like a real file system, the parent directory must exist. Roots
        // always do.
        if let Some(parent) = path.parent().filter(|p| p.parent().is_some()) {
            if !inner.dirs.contains(parent) {
                return Err(not_found(parent));
            }
        }
        inner.files.insert(
            path.to_path_buf(),
            (Bytes::copy_from_slice(data), SystemTime::now()),
        );
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                inner.dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.inner
            .lock()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        if !inner.dirs.contains(path) {
            return Err(not_found(path));
        }
        inner.files.retain(|p, _| !p.starts_with(path));
        inner.dirs.retain(|p| !p.starts_with(path));
        Ok(())
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let inner = self.inner.lock();
        if !inner.dirs.contains(path) {
            return Err(not_found(path));
        }
        let files = inner.files.keys().filter(|p| p.parent() == Some(path));
        let dirs = inner.dirs.iter().filter(|p| p.parent() == Some(path));
        Ok(files.chain(dirs).cloned().collect())
    }

    async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.inner
            .lock()
            .files
            .get(path)
            .map(|(_, modified)| *modified)
            .ok_or_else(|| not_found(path))
    }
}
