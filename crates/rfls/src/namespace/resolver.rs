//
// namespace/resolver.rs
//
// Builds, caches and invalidates namespaces. Builds run on blocking worker
// threads, at most one at a time per document.
//

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tower_lsp::lsp_types::Url;

use super::cache::{CatalogCache, DEFAULT_CATALOG_CACHE_CAPACITY};
use super::imports::ImportContext;
use super::Namespace;
use crate::document_store::{CloseOutcome, DocumentSnapshot, DocumentStore, Owner};
use crate::introspection::LibraryIntrospector;
use crate::perf::{record_namespace_build, TimingGuard};
use crate::syntax::DocumentParser;

pub const DEFAULT_LIBRARY_WORKERS: usize = 4;

pub struct NamespaceResolver {
    documents: Arc<DocumentStore>,
    parser: Arc<dyn DocumentParser>,
    introspector: Arc<dyn LibraryIntrospector>,
    catalogs: CatalogCache,
    search_paths: RwLock<Vec<PathBuf>>,
    namespaces: DashMap<Url, Arc<Namespace>>,
    build_locks: DashMap<Url, Arc<Mutex<()>>>,
    /// importer -> resources it holds a store reference on
    held: DashMap<Url, HashSet<Url>>,
    /// resource -> importers
    dependents: DashMap<Url, HashSet<Url>>,
    workers: Arc<Semaphore>,
}

impl std::fmt::Debug for NamespaceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceResolver")
            .field("namespaces", &self.namespaces.len())
            .field("catalogs", &self.catalogs)
            .finish_non_exhaustive()
    }
}

impl NamespaceResolver {
    pub fn new(
        documents: Arc<DocumentStore>,
        parser: Arc<dyn DocumentParser>,
        introspector: Arc<dyn LibraryIntrospector>,
    ) -> Self {
        Self::with_limits(
            documents,
            parser,
            introspector,
            DEFAULT_LIBRARY_WORKERS,
            DEFAULT_CATALOG_CACHE_CAPACITY,
        )
    }

    pub fn with_limits(
        documents: Arc<DocumentStore>,
        parser: Arc<dyn DocumentParser>,
        introspector: Arc<dyn LibraryIntrospector>,
        workers: usize,
        cache_capacity: usize,
    ) -> Self {
        Self {
            documents,
            parser,
            introspector,
            catalogs: CatalogCache::with_capacity(cache_capacity),
            search_paths: RwLock::new(Vec::new()),
            namespaces: DashMap::new(),
            build_locks: DashMap::new(),
            held: DashMap::new(),
            dependents: DashMap::new(),
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.documents
    }

    pub fn parser(&self) -> &Arc<dyn DocumentParser> {
        &self.parser
    }

    pub fn catalogs(&self) -> &CatalogCache {
        &self.catalogs
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths
            .read()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }

    /// Replace the library search paths. A change drops every cached catalog
    /// and namespace; returns whether anything changed.
    pub fn set_search_paths(&self, paths: Vec<PathBuf>) -> bool {
        let Ok(mut current) = self.search_paths.write() else {
            return false;
        };
        if *current == paths {
            return false;
        }
        log::info!("Library search paths changed: {:?}", paths);
        *current = paths;
        drop(current);
        self.catalogs.clear();
        self.invalidate_all();
        true
    }

    /// The cached namespace of `uri`, if it was built from `revision`.
    pub fn cached(&self, uri: &Url, revision: u64) -> Option<Arc<Namespace>> {
        self.namespaces
            .get(uri)
            .filter(|ns| ns.revision == revision)
            .map(|ns| Arc::clone(&ns))
    }

    /// Namespace for the document content in `snapshot`, building it if needed.
    pub async fn namespace(self: &Arc<Self>, snapshot: &DocumentSnapshot) -> anyhow::Result<Arc<Namespace>> {
        if let Some(ns) = self.cached(&snapshot.uri, snapshot.revision) {
            return Ok(ns);
        }

        let lock = Arc::clone(self.build_locks.entry(snapshot.uri.clone()).or_default().value());
        let _building = lock.lock().await;
        if let Some(ns) = self.cached(&snapshot.uri, snapshot.revision) {
            return Ok(ns);
        }

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .context("library worker pool closed")?;
        let this = Arc::clone(self);
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            this.build_now(&snapshot)
        })
        .await
        .context("namespace build task failed")
    }

    /// Build the namespace on the current thread and cache it.
    pub fn build_now(&self, snapshot: &DocumentSnapshot) -> Arc<Namespace> {
        let _timing = TimingGuard::with_threshold("namespace_build", 200);
        let search_paths = self.search_paths();
        let context = ImportContext {
            documents: &self.documents,
            parser: self.parser.as_ref(),
            introspector: self.introspector.as_ref(),
            catalogs: &self.catalogs,
            search_paths: &search_paths,
        };
        let ns = Arc::new(context.build(snapshot));
        record_namespace_build();
        log::trace!(
            "Built namespace for {} at revision {}: {} libraries, {} resources",
            snapshot.uri,
            snapshot.revision,
            ns.libraries().len(),
            ns.resources().len()
        );

        self.track(&snapshot.uri, ns.resource_uris().cloned().collect());
        let newer_cached = self
            .namespaces
            .get(&snapshot.uri)
            .is_some_and(|cached| cached.revision > snapshot.revision);
        if !newer_cached {
            self.namespaces.insert(snapshot.uri.clone(), Arc::clone(&ns));
        }
        ns
    }

    /// Record the resources `importer` now references and release the ones it
    /// no longer does.
    fn track(&self, importer: &Url, resources: HashSet<Url>) {
        let previous = self
            .held
            .insert(importer.clone(), resources.clone())
            .unwrap_or_default();
        for gone in previous.difference(&resources) {
            self.release_reference(importer, gone);
        }
        for resource in resources {
            self.dependents
                .entry(resource)
                .or_default()
                .insert(importer.clone());
        }
    }

    fn release_reference(&self, importer: &Url, resource: &Url) -> CloseOutcome {
        if let Some(mut importers) = self.dependents.get_mut(resource) {
            importers.remove(importer);
        }
        self.dependents.remove_if(resource, |_, importers| importers.is_empty());
        let outcome = self
            .documents
            .close(resource, &Owner::Document(importer.clone()));
        if outcome == CloseOutcome::Removed {
            self.namespaces.remove(resource);
        }
        outcome
    }

    /// Drop the namespace of `importer` and every reference it holds.
    /// Returns the resources that left the store as a result.
    pub fn release(&self, importer: &Url) -> Vec<Url> {
        self.namespaces.remove(importer);
        self.build_locks.remove(importer);
        let held = self
            .held
            .remove(importer)
            .map(|(_, held)| held)
            .unwrap_or_default();
        held.into_iter()
            .filter(|resource| self.release_reference(importer, resource) == CloseOutcome::Removed)
            .collect()
    }

    /// Drop the namespace of `uri` and of every document importing it,
    /// transitively. Returns the importers affected.
    pub fn invalidate(&self, uri: &Url) -> Vec<Url> {
        let mut affected = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![uri.clone()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            self.namespaces.remove(&next);
            if next != *uri {
                affected.push(next.clone());
            }
            if let Some(importers) = self.dependents.get(&next) {
                stack.extend(importers.iter().cloned());
            }
        }
        affected
    }

    pub fn invalidate_all(&self) {
        self.namespaces.clear();
    }

    pub fn importers_of(&self, resource: &Url) -> Vec<Url> {
        self.dependents
            .get(resource)
            .map(|importers| importers.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::SpecFileIntrospector;
    use crate::syntax::SpaceSeparatedParser;
    use crate::ROBOT_LANGUAGE_ID;

    fn resolver(documents: Arc<DocumentStore>) -> Arc<NamespaceResolver> {
        Arc::new(NamespaceResolver::new(
            documents,
            Arc::new(SpaceSeparatedParser),
            Arc::new(SpecFileIntrospector::new()),
        ))
    }

    struct Suite {
        _dir: tempfile::TempDir,
        suite: Url,
        resource: Url,
    }

    fn suite_with_resource(documents: &DocumentStore) -> Suite {
        let dir = tempfile::tempdir().unwrap();
        let resource_path = dir.path().join("common.resource");
        std::fs::write(&resource_path, "*** Keywords ***\nShared Step\n    No Operation\n").unwrap();
        let suite = Url::from_file_path(dir.path().join("suite.robot")).unwrap();
        documents.open(
            &suite,
            ROBOT_LANGUAGE_ID,
            "*** Settings ***\nResource    common.resource\n\n*** Test Cases ***\nT\n    Shared Step\n",
            1,
        );
        Suite {
            suite,
            resource: Url::from_file_path(resource_path).unwrap(),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_namespace_is_cached_per_revision() {
        let documents = Arc::new(DocumentStore::new());
        let resolver = resolver(Arc::clone(&documents));
        let fixture = suite_with_resource(&documents);

        let snapshot = documents.snapshot(&fixture.suite).unwrap();
        let first = resolver.namespace(&snapshot).await.unwrap();
        let second = resolver.namespace(&snapshot).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.resolve("Shared Step").is_some());

        documents
            .apply_full_change(&fixture.suite, 2, "*** Test Cases ***\nT\n    Log    hi\n")
            .unwrap();
        let snapshot = documents.snapshot(&fixture.suite).unwrap();
        let third = resolver.namespace(&snapshot).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.resolve("Shared Step").is_none());
        // the import is gone, so is the reference
        assert!(!documents.contains(&fixture.resource));
    }

    #[tokio::test]
    async fn test_release_drops_resource_references() {
        let documents = Arc::new(DocumentStore::new());
        let resolver = resolver(Arc::clone(&documents));
        let fixture = suite_with_resource(&documents);

        let snapshot = documents.snapshot(&fixture.suite).unwrap();
        resolver.namespace(&snapshot).await.unwrap();
        assert_eq!(documents.reference_count(&fixture.resource), 1);
        assert_eq!(resolver.importers_of(&fixture.resource), vec![fixture.suite.clone()]);

        let removed = resolver.release(&fixture.suite);
        assert_eq!(removed, vec![fixture.resource.clone()]);
        assert!(!documents.contains(&fixture.resource));
        assert!(resolver.cached(&fixture.suite, snapshot.revision).is_none());
    }

    #[tokio::test]
    async fn test_resource_change_invalidates_importers() {
        let documents = Arc::new(DocumentStore::new());
        let resolver = resolver(Arc::clone(&documents));
        let fixture = suite_with_resource(&documents);

        let snapshot = documents.snapshot(&fixture.suite).unwrap();
        resolver.namespace(&snapshot).await.unwrap();

        let affected = resolver.invalidate(&fixture.resource);
        assert_eq!(affected, vec![fixture.suite.clone()]);
        assert!(resolver.cached(&fixture.suite, snapshot.revision).is_none());
    }

    #[tokio::test]
    async fn test_search_path_change_clears_caches() {
        let documents = Arc::new(DocumentStore::new());
        let resolver = resolver(Arc::clone(&documents));
        let fixture = suite_with_resource(&documents);
        let snapshot = documents.snapshot(&fixture.suite).unwrap();
        resolver.namespace(&snapshot).await.unwrap();
        assert!(!resolver.catalogs().is_empty());

        assert!(resolver.set_search_paths(vec![PathBuf::from("/opt/libspecs")]));
        assert!(!resolver.set_search_paths(vec![PathBuf::from("/opt/libspecs")]));
        assert!(resolver.catalogs().is_empty());
        assert!(resolver.cached(&fixture.suite, snapshot.revision).is_none());
    }
}
