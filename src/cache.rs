//! Render cache – memoizes finished PDFs under a content-derived key.
//!
//! Cache stores are looked up by configuration name through a
//! [`CacheRegistry`]. Reads and writes are best effort: the caller logs
//! failures and carries on with a fresh render.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;

use crate::config::DEFAULT_CACHE_NAME;
use crate::error::{PdfError, Result};
use crate::staging::write_atomic;

/// Entries kept by the default in-memory cache.
pub const DEFAULT_MEMORY_ENTRIES: usize = 64;

pub trait PdfCache: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn write(&self, key: &str, pdf: &[u8]) -> Result<()>;
}

/// Bounded in-process cache with least-recently-used eviction.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Vec<u8>>>,
}

impl MemoryCache {
    /// A capacity of zero is clamped to one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Vec<u8>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("recovered from poisoned render cache lock");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_ENTRIES)
    }
}

impl PdfCache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().get(key).cloned())
    }

    fn write(&self, key: &str, pdf: &[u8]) -> Result<()> {
        self.lock().put(key.to_string(), pdf.to_vec());
        Ok(())
    }
}

/// One file per entry, named `<key>.pdf`.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    dir: PathBuf,
}

impl DirectoryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(PdfError::config(format!("invalid cache key `{key}`")));
        }
        Ok(self.dir.join(format!("{key}.pdf")))
    }
}

impl PdfCache for DirectoryCache {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)?) {
            Ok(pdf) => Ok(Some(pdf)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, pdf: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        write_atomic(&self.dir, &path, pdf)
    }
}

/// Named cache configurations.
#[derive(Clone)]
pub struct CacheRegistry {
    caches: HashMap<String, Arc<dyn PdfCache>>,
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.caches.keys().collect();
        names.sort_unstable();
        f.debug_struct("CacheRegistry").field("caches", &names).finish()
    }
}

impl Default for CacheRegistry {
    /// Registers an in-memory cache under the default name.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_CACHE_NAME, Arc::new(MemoryCache::default()));
        registry
    }
}

impl CacheRegistry {
    pub fn empty() -> Self {
        Self {
            caches: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, cache: Arc<dyn PdfCache>) -> &mut Self {
        self.caches.insert(name.to_string(), cache);
        self
    }

    /// Look up a cache configuration. Unknown names are a configuration
    /// error, since caching was asked for explicitly.
    pub fn get(&self, name: &str) -> Result<Arc<dyn PdfCache>> {
        self.caches
            .get(name)
            .cloned()
            .ok_or_else(|| PdfError::config(format!("cache configuration `{name}` not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache_evicts_least_recent() {
        let cache = MemoryCache::new(2);
        cache.write("a", b"1").unwrap();
        cache.write("b", b"2").unwrap();
        assert_eq!(cache.read("a").unwrap().as_deref(), Some(&b"1"[..]));
        cache.write("c", b"3").unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.read("b").unwrap().is_none());
        assert!(cache.read("a").unwrap().is_some());
        assert!(cache.read("c").unwrap().is_some());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = MemoryCache::new(0);
        cache.write("a", b"1").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn directory_cache_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(tmp.path().join("pdfs"));
        assert!(cache.read("abc123").unwrap().is_none());
        cache.write("abc123", b"%PDF-1.7").unwrap();
        assert_eq!(cache.read("abc123").unwrap().unwrap(), b"%PDF-1.7");
        assert!(cache.dir().join("abc123.pdf").is_file());
    }

    #[test]
    fn directory_cache_concurrent_writers() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(tmp.path());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| cache.write("k", b"%PDF-same").unwrap());
            }
        });
        assert_eq!(cache.read("k").unwrap().unwrap(), b"%PDF-same");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn directory_cache_rejects_path_like_keys() {
        let cache = DirectoryCache::new("/tmp/unused");
        assert!(cache.read("../etc/passwd").is_err());
    }

    #[test]
    fn registry_lookup() {
        let registry = CacheRegistry::default();
        assert!(registry.get(DEFAULT_CACHE_NAME).is_ok());
        let err = registry.get("redis").err().unwrap();
        assert!(matches!(err, PdfError::Configuration(_)));
    }
}
