//
// config.rs
//
// Server settings from `initializationOptions` and
// `workspace/didChangeConfiguration`
//

use std::path::PathBuf;
use std::time::Duration;

use tower_lsp::lsp_types::TextDocumentSyncKind;

use crate::namespace::cache::DEFAULT_CATALOG_CACHE_CAPACITY;
use crate::namespace::resolver::DEFAULT_LIBRARY_WORKERS;

pub const DEFAULT_COMPLETION_DEBOUNCE_MS: u64 = 250;
pub const DEFAULT_MAX_DOCUMENTS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Delay before collecting completions after a trigger character.
    pub completion_debounce_ms: u64,
    pub library_search_paths: Vec<PathBuf>,
    pub library_workers: usize,
    pub catalog_cache_capacity: usize,
    pub sync_kind: TextDocumentSyncKind,
    /// Soft bound on documents kept only by references.
    pub max_documents: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            completion_debounce_ms: DEFAULT_COMPLETION_DEBOUNCE_MS,
            library_search_paths: Vec::new(),
            library_workers: DEFAULT_LIBRARY_WORKERS,
            catalog_cache_capacity: DEFAULT_CATALOG_CACHE_CAPACITY,
            sync_kind: TextDocumentSyncKind::INCREMENTAL,
            max_documents: DEFAULT_MAX_DOCUMENTS,
        }
    }
}

impl ServerConfig {
    pub fn completion_debounce(&self) -> Duration {
        Duration::from_millis(self.completion_debounce_ms)
    }

    /// Apply the fields present in `settings` on top of `self`.
    ///
    /// Accepts either `{ "rfls": { ... } }` or the section itself:
    ///
    /// ```
    /// use rfls::config::ServerConfig;
    ///
    /// let settings = serde_json::json!({
    ///     "rfls": {
    ///         "completion": { "debounceMs": 100 },
    ///         "libraries": { "searchPaths": ["/opt/libspecs"], "workers": 2 },
    ///         "sync": "full"
    ///     }
    /// });
    /// let cfg = ServerConfig::default().merged(&settings);
    /// assert_eq!(cfg.completion_debounce_ms, 100);
    /// assert_eq!(cfg.library_workers, 2);
    /// assert_eq!(cfg.library_search_paths.len(), 1);
    /// ```
    pub fn merged(&self, settings: &serde_json::Value) -> Self {
        let mut config = self.clone();
        let settings = settings.get("rfls").unwrap_or(settings);

        if let Some(completion) = settings.get("completion") {
            if let Some(v) = completion.get("debounceMs").and_then(|v| v.as_u64()) {
                config.completion_debounce_ms = v;
            }
        }

        if let Some(libraries) = settings.get("libraries") {
            if let Some(paths) = libraries.get("searchPaths").and_then(|v| v.as_array()) {
                config.library_search_paths = paths
                    .iter()
                    .filter_map(|p| p.as_str())
                    .filter(|s| !s.is_empty() && !s.contains('\0'))
                    .map(PathBuf::from)
                    .collect();
            }
            if let Some(v) = libraries.get("workers").and_then(|v| v.as_u64()) {
                config.library_workers = (v as usize).max(1);
            }
            if let Some(v) = libraries.get("cacheCapacity").and_then(|v| v.as_u64()) {
                config.catalog_cache_capacity = (v as usize).max(1);
            }
        }

        if let Some(v) = settings.get("sync").and_then(|v| v.as_str()) {
            config.sync_kind = parse_sync_kind(v);
        }

        if let Some(documents) = settings.get("documents") {
            if let Some(v) = documents.get("maxDocuments").and_then(|v| v.as_u64()) {
                config.max_documents = v as usize;
            }
        }

        config
    }

    pub fn log(&self) {
        log::info!("Configuration:");
        log::info!("  completion_debounce_ms: {}", self.completion_debounce_ms);
        log::info!("  library_search_paths: {:?}", self.library_search_paths);
        log::info!("  library_workers: {}", self.library_workers);
        log::info!("  catalog_cache_capacity: {}", self.catalog_cache_capacity);
        log::info!("  sync_kind: {:?}", self.sync_kind);
        log::info!("  max_documents: {}", self.max_documents);
    }
}

fn parse_sync_kind(s: &str) -> TextDocumentSyncKind {
    match s.to_lowercase().as_str() {
        "full" => TextDocumentSyncKind::FULL,
        "none" => TextDocumentSyncKind::NONE,
        _ => TextDocumentSyncKind::INCREMENTAL,
    }
}
