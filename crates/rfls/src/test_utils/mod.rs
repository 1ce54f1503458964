//! Helpers shared by unit tests, integration tests and benches.

pub mod fixture_workspace;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::path::PathBuf;

use tower_lsp::lsp_types::Url;

use crate::builtins::builtin_catalog;
use crate::document_store::DocumentStore;
use crate::introspection::LibraryIntrospector;
use crate::keyword_matcher::normalize;
use crate::library_doc::{KeywordDoc, LibraryCatalog, BUILTIN_LIBRARY_NAME};
use crate::namespace::cache::CatalogCache;
use crate::namespace::imports::ImportContext;
use crate::namespace::Namespace;
use crate::syntax::{DocumentParser, Model, SpaceSeparatedParser};
use crate::ROBOT_LANGUAGE_ID;

/// In-memory introspection: answers from registered catalogs and counts calls.
#[derive(Debug, Default)]
pub struct StaticIntrospector {
    catalogs: HashMap<String, LibraryCatalog>,
    calls: AtomicUsize,
}

impl StaticIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, catalog: LibraryCatalog) -> Self {
        self.catalogs.insert(normalize(&catalog.name), catalog);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl LibraryIntrospector for StaticIntrospector {
    fn resolve_library(
        &self,
        name: &str,
        _args: &[String],
        _search_paths: &[PathBuf],
    ) -> anyhow::Result<LibraryCatalog> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if normalize(name) == normalize(BUILTIN_LIBRARY_NAME) {
            return Ok(builtin_catalog().clone());
        }
        self.catalogs
            .get(&normalize(name))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Library '{}' not found", name))
    }
}

/// A catalog named `name` with argument-less keywords.
pub fn catalog(name: &str, keywords: &[&str]) -> LibraryCatalog {
    let mut catalog = LibraryCatalog {
        name: name.to_string(),
        keywords: keywords.iter().map(|kw| KeywordDoc::new(*kw, "")).collect(),
        ..Default::default()
    };
    catalog.fill_owner();
    catalog
}

pub fn test_uri(name: &str) -> Url {
    Url::parse(&format!("file:///workspace/{name}")).unwrap()
}

pub fn parse(text: &str) -> Model {
    SpaceSeparatedParser.parse(text)
}

/// Namespace of `uri`, which must already be in `documents`.
pub fn build_namespace_in(
    documents: &DocumentStore,
    introspector: &dyn LibraryIntrospector,
    uri: &Url,
) -> Namespace {
    let snapshot = documents.snapshot(uri).unwrap();
    let catalogs = CatalogCache::default();
    ImportContext {
        documents,
        parser: &SpaceSeparatedParser,
        introspector,
        catalogs: &catalogs,
        search_paths: &[],
    }
    .build(&snapshot)
}

/// Namespace of a single in-memory suite with only BuiltIn available.
pub fn build_namespace(text: &str) -> Namespace {
    let documents = DocumentStore::new();
    let uri = test_uri("suite.robot");
    documents.open(&uri, ROBOT_LANGUAGE_ID, text, 1);
    build_namespace_in(&documents, &StaticIntrospector::new(), &uri)
}
