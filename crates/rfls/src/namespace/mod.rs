//
// namespace/mod.rs
//
// Per-document merged view of own, library and resource keywords
//

pub mod cache;
pub mod imports;
pub mod resolver;
pub mod variables;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tower_lsp::lsp_types::Url;

use crate::error::ResolveError;
use crate::keyword_matcher::{normalize, KeywordMatcher};
use crate::library_doc::{KeywordDoc, LibraryCatalog};
use crate::utf16::CharRange;

pub use resolver::NamespaceResolver;
pub use variables::ResolvableVariable;

/// A library import and what introspection made of it.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    /// Import name after variable substitution.
    pub import_name: String,
    /// Name keywords can be qualified with: the alias, or the library name.
    pub name: String,
    pub alias: Option<String>,
    pub args: Vec<String>,
    /// Range of the import name in `source_uri`.
    pub range: CharRange,
    /// The document containing the import statement.
    pub source_uri: Url,
    /// `false` for the implicit BuiltIn import.
    pub explicit: bool,
    pub catalog: Result<Arc<LibraryCatalog>, String>,
}

impl LibraryEntry {
    pub fn keywords(&self) -> &[KeywordDoc] {
        match &self.catalog {
            Ok(catalog) => &catalog.keywords,
            Err(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.catalog.as_ref().err().map(String::as_str)
    }
}

/// A resource file import.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub import_name: String,
    /// File stem, used as qualifier.
    pub name: String,
    pub uri: Option<Url>,
    pub range: CharRange,
    pub source_uri: Url,
    pub keywords: Vec<Arc<KeywordDoc>>,
    pub error: Option<String>,
}

/// Who contributed a keyword to the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordOwner {
    Local,
    Library(usize),
    Resource(usize),
}

#[derive(Debug, Clone)]
struct Candidate {
    matcher: KeywordMatcher,
    doc: Arc<KeywordDoc>,
    owner: KeywordOwner,
}

const BDD_PREFIXES: &[&str] = &["given ", "when ", "then ", "and ", "but "];

fn strip_bdd_prefix(name: &str) -> Option<&str> {
    let lower = name.to_lowercase();
    BDD_PREFIXES
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .and_then(|prefix| name.get(prefix.len()..))
        .map(str::trim_start)
        .filter(|rest| !rest.is_empty())
}

#[derive(Debug)]
pub struct Namespace {
    pub uri: Url,
    /// Revision of the document this namespace was built from.
    pub revision: u64,
    own_keywords: Vec<Arc<KeywordDoc>>,
    libraries: Vec<LibraryEntry>,
    resources: Vec<ResourceEntry>,
    variables: IndexMap<String, ResolvableVariable>,
    /// Every keyword in precedence order, duplicates included.
    candidates: Vec<Candidate>,
    /// First match per name, in precedence order.
    keywords: IndexMap<KeywordMatcher, Arc<KeywordDoc>>,
    exact: HashMap<String, Vec<usize>>,
    embedded: Vec<usize>,
}

impl Namespace {
    pub fn new(
        uri: Url,
        revision: u64,
        own_keywords: Vec<Arc<KeywordDoc>>,
        libraries: Vec<LibraryEntry>,
        resources: Vec<ResourceEntry>,
        variables: IndexMap<String, ResolvableVariable>,
    ) -> Self {
        let mut candidates = Vec::new();
        let mut push = |doc: Arc<KeywordDoc>, owner: KeywordOwner| {
            candidates.push(Candidate {
                matcher: doc.matcher(),
                doc,
                owner,
            });
        };
        for doc in &own_keywords {
            push(Arc::clone(doc), KeywordOwner::Local);
        }
        for (idx, library) in libraries.iter().enumerate() {
            for doc in library.keywords() {
                push(Arc::new(doc.clone()), KeywordOwner::Library(idx));
            }
        }
        for (idx, resource) in resources.iter().enumerate() {
            for doc in &resource.keywords {
                push(Arc::clone(doc), KeywordOwner::Resource(idx));
            }
        }

        let mut keywords = IndexMap::new();
        let mut exact: HashMap<String, Vec<usize>> = HashMap::new();
        let mut embedded = Vec::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            keywords
                .entry(candidate.matcher.clone())
                .or_insert_with(|| Arc::clone(&candidate.doc));
            if candidate.matcher.has_embedded_arguments() {
                embedded.push(idx);
            } else {
                exact
                    .entry(candidate.matcher.normalized().to_string())
                    .or_default()
                    .push(idx);
            }
        }

        Self {
            uri,
            revision,
            own_keywords,
            libraries,
            resources,
            variables,
            candidates,
            keywords,
            exact,
            embedded,
        }
    }

    pub fn own_keywords(&self) -> &[Arc<KeywordDoc>] {
        &self.own_keywords
    }

    pub fn libraries(&self) -> &[LibraryEntry] {
        &self.libraries
    }

    pub fn resources(&self) -> &[ResourceEntry] {
        &self.resources
    }

    /// Resolvable variables keyed by normalized name.
    pub fn variables(&self) -> &IndexMap<String, ResolvableVariable> {
        &self.variables
    }

    /// The merged keyword table: one entry per distinct name, first by precedence.
    pub fn keywords(&self) -> impl Iterator<Item = (&KeywordMatcher, &Arc<KeywordDoc>)> {
        self.keywords.iter()
    }

    /// URIs of all resource files this namespace was built from.
    pub fn resource_uris(&self) -> impl Iterator<Item = &Url> {
        self.resources.iter().filter_map(|r| r.uri.as_ref())
    }

    /// Owners a qualifier such as `Collections` or `common` refers to.
    pub fn owners_named(&self, qualifier: &str) -> Vec<KeywordOwner> {
        let wanted = normalize(qualifier);
        if wanted.is_empty() {
            return Vec::new();
        }
        let libraries = self
            .libraries
            .iter()
            .enumerate()
            .filter(|(_, lib)| normalize(&lib.name) == wanted)
            .map(|(idx, _)| KeywordOwner::Library(idx));
        let resources = self
            .resources
            .iter()
            .enumerate()
            .filter(|(_, res)| normalize(&res.name) == wanted)
            .map(|(idx, _)| KeywordOwner::Resource(idx));
        libraries.chain(resources).collect()
    }

    /// Split `Owner.Keyword` at the first dot whose left side names an import.
    pub fn split_qualified<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        name.match_indices('.').find_map(|(idx, _)| {
            let (qualifier, rest) = (&name[..idx], &name[idx + 1..]);
            (!rest.is_empty() && !self.owners_named(qualifier).is_empty()).then_some((qualifier, rest))
        })
    }

    /// Keywords contributed by the import a qualifier refers to.
    pub fn keywords_of(&self, qualifier: &str) -> Vec<Arc<KeywordDoc>> {
        let owners = self.owners_named(qualifier);
        self.candidates
            .iter()
            .filter(|c| owners.contains(&c.owner))
            .map(|c| Arc::clone(&c.doc))
            .collect()
    }

    fn search<F>(&self, name: &str, allowed: F) -> Option<Arc<KeywordDoc>>
    where
        F: Fn(KeywordOwner) -> bool,
    {
        let exact: Vec<&Candidate> = self
            .exact
            .get(&normalize(name))
            .into_iter()
            .flatten()
            .map(|idx| &self.candidates[*idx])
            .filter(|c| allowed(c.owner))
            .collect();
        if let Some(first) = exact.first() {
            self.warn_if_ambiguous(name, &exact);
            return Some(Arc::clone(&first.doc));
        }

        let embedded: Vec<&Candidate> = self
            .embedded
            .iter()
            .map(|idx| &self.candidates[*idx])
            .filter(|c| allowed(c.owner) && c.matcher.matches(name))
            .collect();
        let first = embedded.first()?;
        self.warn_if_ambiguous(name, &embedded);
        Some(Arc::clone(&first.doc))
    }

    fn warn_if_ambiguous(&self, name: &str, matches: &[&Candidate]) {
        let distinct = matches
            .iter()
            .skip(1)
            .any(|c| c.doc != matches[0].doc);
        if distinct {
            log::warn!(
                "Multiple keywords match '{}' in {}: {}; using the first",
                name,
                self.uri,
                matches
                    .iter()
                    .map(|c| format!("{}.{}", c.doc.libname, c.doc.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    fn find_direct(&self, name: &str) -> Result<Option<Arc<KeywordDoc>>, ResolveError> {
        if !name.contains('.') {
            return Ok(self.search(name, |_| true));
        }
        if let Some(doc) = self.search(name, |owner| owner == KeywordOwner::Local) {
            return Ok(Some(doc));
        }

        let mut qualifier_matched = false;
        for (idx, _) in name.match_indices('.') {
            let (qualifier, rest) = (&name[..idx], &name[idx + 1..]);
            if rest.is_empty() {
                continue;
            }
            let owners = self.owners_named(qualifier);
            if owners.is_empty() {
                continue;
            }
            qualifier_matched = true;
            if let Some(doc) = self.search(rest, |owner| owners.contains(&owner)) {
                return Ok(Some(doc));
            }
        }
        if qualifier_matched {
            return Ok(None);
        }

        match self.search(name, |_| true) {
            Some(doc) => Ok(Some(doc)),
            None => {
                let qualifier = name.split('.').next().unwrap_or(name);
                Err(ResolveError::UnknownNamespace(qualifier.to_string()))
            }
        }
    }

    /// Resolve a call-site name to a keyword.
    ///
    /// `Ok(None)` means the name is unknown. A qualifier that names no import
    /// (and no keyword carries the dotted name) is an error.
    pub fn find_keyword(&self, name: &str) -> Result<Option<Arc<KeywordDoc>>, ResolveError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ResolveError::EmptyName);
        }
        match self.find_direct(name) {
            Ok(Some(doc)) => Ok(Some(doc)),
            direct => match strip_bdd_prefix(name) {
                Some(rest) => match self.find_direct(rest) {
                    Ok(Some(doc)) => Ok(Some(doc)),
                    _ => direct,
                },
                None => direct,
            },
        }
    }

    /// Like [`Namespace::find_keyword`], with resolution errors read as "unknown".
    pub fn resolve(&self, name: &str) -> Option<Arc<KeywordDoc>> {
        self.find_keyword(name).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::builtin_catalog;
    use crate::library_doc::KeywordSource;

    fn uri() -> Url {
        Url::parse("file:///suite/test.robot").unwrap()
    }

    fn library(name: &str, alias: Option<&str>, keywords: &[&str]) -> LibraryEntry {
        let catalog = LibraryCatalog {
            name: name.to_string(),
            keywords: keywords.iter().map(|kw| KeywordDoc::new(*kw, name)).collect(),
            ..Default::default()
        };
        LibraryEntry {
            import_name: name.to_string(),
            name: alias.unwrap_or(name).to_string(),
            alias: alias.map(str::to_string),
            args: Vec::new(),
            range: CharRange::default(),
            source_uri: uri(),
            explicit: true,
            catalog: Ok(Arc::new(catalog)),
        }
    }

    fn resource(name: &str, keywords: &[&str]) -> ResourceEntry {
        ResourceEntry {
            import_name: format!("{name}.resource"),
            name: name.to_string(),
            uri: Url::parse(&format!("file:///suite/{name}.resource")).ok(),
            range: CharRange::default(),
            source_uri: uri(),
            keywords: keywords
                .iter()
                .map(|kw| {
                    let mut doc = KeywordDoc::new(*kw, name);
                    doc.kind = KeywordSource::Resource;
                    Arc::new(doc)
                })
                .collect(),
            error: None,
        }
    }

    fn local(name: &str) -> Arc<KeywordDoc> {
        let mut doc = KeywordDoc::new(name, "test");
        doc.kind = KeywordSource::Local;
        Arc::new(doc)
    }

    fn builtin() -> LibraryEntry {
        LibraryEntry {
            explicit: false,
            catalog: Ok(Arc::new(builtin_catalog().clone())),
            ..library("BuiltIn", None, &[])
        }
    }

    fn namespace(
        own: Vec<Arc<KeywordDoc>>,
        libraries: Vec<LibraryEntry>,
        resources: Vec<ResourceEntry>,
    ) -> Namespace {
        Namespace::new(uri(), 1, own, libraries, resources, IndexMap::new())
    }

    #[test]
    fn test_exact_match_beats_embedded() {
        let ns = namespace(
            vec![local("Open ${page} page")],
            vec![library("Pages", None, &["Open Login Page"])],
            vec![],
        );
        let doc = ns.find_keyword("open login page").unwrap().unwrap();
        assert_eq!(doc.libname, "Pages");

        let doc = ns.find_keyword("Open Home page").unwrap().unwrap();
        assert_eq!(doc.kind, KeywordSource::Local);
    }

    #[test]
    fn test_precedence_local_library_resource() {
        let ns = namespace(
            vec![local("Shared")],
            vec![library("Lib", None, &["Shared", "Only Lib", "Both"])],
            vec![resource("common", &["Shared", "Both", "Only Resource"])],
        );
        assert_eq!(ns.resolve("Shared").unwrap().kind, KeywordSource::Local);
        assert_eq!(ns.resolve("both").unwrap().libname, "Lib");
        assert_eq!(ns.resolve("Only Resource").unwrap().libname, "common");
        assert!(ns.resolve("Missing").is_none());
    }

    #[test]
    fn test_duplicates_pick_first_without_failing() {
        let ns = namespace(
            vec![],
            vec![],
            vec![resource("a", &["Login"]), resource("b", &["Login"])],
        );
        assert_eq!(ns.find_keyword("Login").unwrap().unwrap().libname, "a");
    }

    #[test]
    fn test_qualified_name_restricts_to_owner() {
        let ns = namespace(
            vec![],
            vec![builtin(), library("Collections", None, &["Append To List"])],
            vec![resource("common", &["Append To List"])],
        );
        assert_eq!(
            ns.find_keyword("common.Append To List").unwrap().unwrap().libname,
            "common"
        );
        assert_eq!(
            ns.find_keyword("Collections.Append To List").unwrap().unwrap().libname,
            "Collections"
        );
        assert_eq!(ns.find_keyword("BuiltIn.Log").unwrap().unwrap().libname, "BuiltIn");
        // known owner, unknown keyword
        assert_eq!(ns.find_keyword("common.Log").unwrap(), None);
    }

    #[test]
    fn test_unknown_qualifier_is_an_error() {
        let ns = namespace(vec![], vec![builtin()], vec![]);
        assert_eq!(
            ns.find_keyword("Nope.Log"),
            Err(ResolveError::UnknownNamespace("Nope".into()))
        );
    }

    #[test]
    fn test_alias_replaces_library_name() {
        let ns = namespace(vec![], vec![library("Remote", Some("Rem"), &["Ping"])], vec![]);
        assert!(ns.resolve("Rem.Ping").is_some());
        assert!(ns.find_keyword("Remote.Ping").is_err());
        assert_eq!(ns.split_qualified("Rem.Ping"), Some(("Rem", "Ping")));
    }

    #[test]
    fn test_dotted_local_keyword_wins() {
        let ns = namespace(vec![local("Version 1.2 Check")], vec![builtin()], vec![]);
        assert!(ns.resolve("Version 1.2 Check").is_some());
    }

    #[test]
    fn test_bdd_prefix_is_stripped() {
        let ns = namespace(vec![local("User Logs In")], vec![], vec![]);
        assert!(ns.resolve("Given user logs in").is_some());
        assert!(ns.resolve("And User Logs In").is_some());
    }

    #[test]
    fn test_failed_library_contributes_nothing() {
        let mut broken = library("Broken", None, &[]);
        broken.catalog = Err("import failed".into());
        let ns = namespace(vec![], vec![broken, library("Ok", None, &["Works"])], vec![]);
        assert_eq!(ns.libraries()[0].error(), Some("import failed"));
        assert!(ns.resolve("Works").is_some());
    }
}
