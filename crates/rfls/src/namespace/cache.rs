//
// namespace/cache.rs
//
// LRU cache of library catalogs keyed by import identity
//

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use lru::LruCache;

use crate::library_doc::LibraryCatalog;

pub const DEFAULT_CATALOG_CACHE_CAPACITY: usize = 256;

/// Identity of a library import: the same name with other arguments, or
/// imported from another directory, may produce a different catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogKey {
    pub name: String,
    pub args: Vec<String>,
    pub base_dir: Option<PathBuf>,
}

/// Introspection result. Failures are cached too, so a broken import is not
/// retried on every edit.
pub type CatalogResult = Result<Arc<LibraryCatalog>, String>;

fn capacity(cap: usize) -> NonZeroUsize {
    NonZeroUsize::new(cap)
        .or(NonZeroUsize::new(DEFAULT_CATALOG_CACHE_CAPACITY))
        .unwrap_or(NonZeroUsize::MIN)
}

/// Reads use `peek()` under the read lock; writes `push()` under the write
/// lock, so eviction order follows insertion.
pub struct CatalogCache {
    inner: RwLock<LruCache<CatalogKey, CatalogResult>>,
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache").finish_non_exhaustive()
    }
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CATALOG_CACHE_CAPACITY)
    }
}

impl CatalogCache {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: RwLock::new(LruCache::new(capacity(cap))),
        }
    }

    pub fn get(&self, key: &CatalogKey) -> Option<CatalogResult> {
        self.inner.read().ok()?.peek(key).cloned()
    }

    pub fn insert(&self, key: CatalogKey, result: CatalogResult) {
        if let Ok(mut guard) = self.inner.write() {
            guard.push(key, result);
        }
    }

    /// Cached result for `key`, running `load` on a miss.
    ///
    /// `load` runs without the lock held; two concurrent misses may both load.
    pub fn get_or_load<F>(&self, key: CatalogKey, load: F) -> CatalogResult
    where
        F: FnOnce() -> anyhow::Result<LibraryCatalog>,
    {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let result = load().map(Arc::new).map_err(|e| format!("{e:#}"));
        crate::perf::record_catalog_load();
        self.insert(key, result.clone());
        result
    }

    pub fn len(&self) -> usize {
        self.inner.read().map_or(0, |guard| guard.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.clear();
        }
    }

    pub fn resize(&self, cap: usize) {
        if let Ok(mut guard) = self.inner.write() {
            guard.resize(capacity(cap));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CatalogKey {
        CatalogKey {
            name: name.to_string(),
            args: Vec::new(),
            base_dir: None,
        }
    }

    #[test]
    fn test_errors_are_cached() {
        let cache = CatalogCache::default();
        let first = cache.get_or_load(key("Missing"), || anyhow::bail!("no such library"));
        assert_eq!(first, Err("no such library".to_string()));
        let second = cache.get_or_load(key("Missing"), || panic!("must not reload"));
        assert_eq!(second, first);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = CatalogCache::with_capacity(2);
        for name in ["A", "B", "C"] {
            cache.insert(key(name), Err(name.to_string()));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("A")).is_none());
        assert!(cache.get(&key("C")).is_some());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_args_are_part_of_the_key() {
        let cache = CatalogCache::default();
        let mut with_args = key("Remote");
        with_args.args = vec!["http://localhost:8270".into()];
        cache.insert(key("Remote"), Err("plain".into()));
        assert!(cache.get(&with_args).is_none());
    }
}
