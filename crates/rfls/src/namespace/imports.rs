//
// namespace/imports.rs
//
// Building a namespace: own keywords, the implicit BuiltIn import, library
// imports through the introspector and resource files (transitively)
//

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tower_lsp::lsp_types::Url;

use super::cache::{CatalogCache, CatalogKey, CatalogResult};
use super::variables::{builtin_variables, collect_variables, replace_variables, ResolvableVariable};
use super::{LibraryEntry, Namespace, ResourceEntry};
use crate::document_store::{DocumentSnapshot, DocumentStore, Owner};
use crate::introspection::{library_stem, LibraryIntrospector};
use crate::keyword_matcher::normalize;
use crate::library_doc::{KeywordDoc, KeywordSource, BUILTIN_LIBRARY_NAME};
use crate::syntax::{DocumentParser, Model, Statement, StatementKind, TokenKind};
use crate::utf16::CharRange;
use crate::ROBOT_LANGUAGE_ID;

/// File stem of the document behind `uri`: `common` for `.../common.resource`.
pub fn document_stem(uri: &Url) -> String {
    if let Some(stem) = uri
        .to_file_path()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
    {
        return stem;
    }
    let file = uri
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

fn documentation_text(statement: &Statement) -> String {
    let mut lines: Vec<(usize, Vec<&str>)> = Vec::new();
    for token in statement.get_tokens(TokenKind::Argument) {
        match lines.last_mut() {
            Some((line, cells)) if *line == token.line => cells.push(token.value.as_str()),
            _ => lines.push((token.line, vec![token.value.as_str()])),
        }
    }
    lines
        .into_iter()
        .map(|(_, cells)| cells.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keyword definitions of the `*** Keywords ***` section.
pub fn keywords_from_model(
    model: &Model,
    libname: &str,
    source: Option<&Path>,
    kind: KeywordSource,
) -> Vec<KeywordDoc> {
    model
        .keyword_blocks()
        .filter_map(|block| {
            let name = model.block_name(block)?;
            let mut doc = KeywordDoc::new(name.value.clone(), libname);
            doc.kind = kind;
            doc.source = source.map(Path::to_path_buf);
            doc.line = Some(name.line as u32);
            for statement in model.statements_of(block) {
                match statement.kind {
                    StatementKind::Arguments => {
                        doc.args = statement
                            .get_tokens(TokenKind::Argument)
                            .map(|t| t.value.clone())
                            .collect();
                    }
                    StatementKind::Documentation => doc.doc = documentation_text(statement),
                    StatementKind::Setting
                        if statement
                            .get_token(TokenKind::Setting)
                            .is_some_and(|t| normalize(&t.value) == "[tags]") =>
                    {
                        doc.tags = statement
                            .get_tokens(TokenKind::Argument)
                            .map(|t| t.value.clone())
                            .collect();
                    }
                    _ => {}
                }
            }
            Some(doc)
        })
        .collect()
}

/// Imports of one document waiting to be processed.
struct PendingImports {
    uri: Url,
    dir: Option<PathBuf>,
    model: Model,
    variables: IndexMap<String, ResolvableVariable>,
    /// Imported by the namespace's own document.
    direct: bool,
}

/// Everything a namespace build needs. Runs on a blocking thread.
pub struct ImportContext<'a> {
    pub documents: &'a DocumentStore,
    pub parser: &'a dyn DocumentParser,
    pub introspector: &'a dyn LibraryIntrospector,
    pub catalogs: &'a CatalogCache,
    pub search_paths: &'a [PathBuf],
}

impl ImportContext<'_> {
    pub fn build(&self, snapshot: &DocumentSnapshot) -> Namespace {
        let model = self.parser.parse(&snapshot.text());
        let path = snapshot.uri.to_file_path().ok();
        let dir = path.as_deref().and_then(Path::parent).map(Path::to_path_buf);

        let mut variables = builtin_variables(dir.as_deref());
        let own_variables = collect_variables(&model, &snapshot.uri, &variables);
        variables.extend(own_variables);

        let own_keywords = keywords_from_model(
            &model,
            &document_stem(&snapshot.uri),
            path.as_deref(),
            KeywordSource::Local,
        )
        .into_iter()
        .map(Arc::new)
        .collect();

        let mut libraries = vec![self.builtin_entry(&snapshot.uri)];
        let mut resources: Vec<ResourceEntry> = Vec::new();
        let mut namespace_variables = variables.clone();
        let mut visited = HashSet::from([snapshot.uri.clone()]);
        let mut queue = VecDeque::from([PendingImports {
            uri: snapshot.uri.clone(),
            dir,
            model,
            variables,
            direct: true,
        }]);

        while let Some(pending) = queue.pop_front() {
            for statement in pending.model.imports() {
                match statement.kind {
                    StatementKind::LibraryImport => {
                        let Some(entry) = self.library_entry(statement, &pending) else {
                            continue;
                        };
                        if libraries.iter().any(|known| same_library(known, &entry)) {
                            continue;
                        }
                        if let Err(err) = &entry.catalog {
                            log::debug!("Library '{}' failed to load: {}", entry.import_name, err);
                        }
                        libraries.push(entry);
                    }
                    StatementKind::ResourceImport => {
                        let Some((entry, next)) =
                            self.resource_entry(statement, &pending, &snapshot.uri, &mut visited)
                        else {
                            continue;
                        };
                        if let Some(next) = next {
                            if pending.direct {
                                for (key, var) in next.variables.iter().filter(|(_, v)| v.source.is_some()) {
                                    namespace_variables.entry(key.clone()).or_insert_with(|| var.clone());
                                }
                            }
                            queue.push_back(next);
                        }
                        resources.push(entry);
                    }
                    _ => {}
                }
            }
        }

        Namespace::new(
            snapshot.uri.clone(),
            snapshot.revision,
            own_keywords,
            libraries,
            resources,
            namespace_variables,
        )
    }

    fn catalog(&self, name: &str, args: &[String], dir: Option<&Path>) -> CatalogResult {
        let key = CatalogKey {
            name: name.to_string(),
            args: args.to_vec(),
            base_dir: dir.map(Path::to_path_buf),
        };
        self.catalogs.get_or_load(key, || {
            let search_paths: Vec<PathBuf> = dir
                .map(Path::to_path_buf)
                .into_iter()
                .chain(self.search_paths.iter().cloned())
                .collect();
            self.introspector.resolve_library(name, args, &search_paths)
        })
    }

    fn builtin_entry(&self, uri: &Url) -> LibraryEntry {
        LibraryEntry {
            import_name: BUILTIN_LIBRARY_NAME.to_string(),
            name: BUILTIN_LIBRARY_NAME.to_string(),
            alias: None,
            args: Vec::new(),
            range: CharRange::default(),
            source_uri: uri.clone(),
            explicit: false,
            catalog: self.catalog(BUILTIN_LIBRARY_NAME, &[], None),
        }
    }

    fn library_entry(&self, statement: &Statement, pending: &PendingImports) -> Option<LibraryEntry> {
        let name_token = statement.import_name()?;
        let vars = &pending.variables;
        let import_name = replace_variables(&name_token.value, vars);
        let args: Vec<String> = statement
            .import_args()
            .iter()
            .map(|arg| replace_variables(arg, vars))
            .collect();
        let alias = statement.alias().map(|t| replace_variables(&t.value, vars));

        let catalog = if normalize(&import_name) == normalize(BUILTIN_LIBRARY_NAME) {
            self.catalog(BUILTIN_LIBRARY_NAME, &[], None)
        } else {
            self.catalog(&import_name, &args, pending.dir.as_deref())
        };
        let library_name = match &catalog {
            Ok(catalog) if !catalog.name.is_empty() => catalog.name.clone(),
            _ => library_stem(&import_name).to_string(),
        };
        Some(LibraryEntry {
            name: alias.clone().unwrap_or(library_name),
            import_name,
            alias,
            args,
            range: name_token.range(),
            source_uri: pending.uri.clone(),
            explicit: true,
            catalog,
        })
    }

    /// Path of a resource import, relative to the importing document or to
    /// one of the search paths. Documents already in the store count even
    /// if they are not on disk.
    fn find_resource(&self, name: &str, dir: Option<&Path>) -> Option<PathBuf> {
        let path = Path::new(name);
        let exists = |candidate: &Path| {
            candidate.is_file()
                || Url::from_file_path(candidate).is_ok_and(|uri| self.documents.contains(&uri))
        };
        if path.is_absolute() {
            return exists(path).then(|| path.to_path_buf());
        }
        dir.into_iter()
            .chain(self.search_paths.iter().map(PathBuf::as_path))
            .map(|base| base.join(path))
            .find(|candidate| exists(candidate))
    }

    /// Load a resource import and reference it on behalf of `importer`.
    ///
    /// `None` when the resource was already imported (directly, transitively
    /// or as the namespace's own document).
    fn resource_entry(
        &self,
        statement: &Statement,
        pending: &PendingImports,
        importer: &Url,
        visited: &mut HashSet<Url>,
    ) -> Option<(ResourceEntry, Option<PendingImports>)> {
        let name_token = statement.import_name()?;
        let import_name = replace_variables(&name_token.value, &pending.variables);
        let stem = Path::new(&import_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| import_name.clone());
        let mut entry = ResourceEntry {
            import_name: import_name.clone(),
            name: stem,
            uri: None,
            range: name_token.range(),
            source_uri: pending.uri.clone(),
            keywords: Vec::new(),
            error: None,
        };

        let Some(path) = self.find_resource(&import_name, pending.dir.as_deref()) else {
            entry.error = Some(format!("Resource file '{}' does not exist", import_name));
            return Some((entry, None));
        };
        let Ok(uri) = Url::from_file_path(&path) else {
            entry.error = Some(format!("Invalid resource path '{}'", path.display()));
            return Some((entry, None));
        };
        if !visited.insert(uri.clone()) {
            return None;
        }

        let loaded = self.documents.reference(
            &uri,
            Owner::Document(importer.clone()),
            ROBOT_LANGUAGE_ID,
            || std::fs::read_to_string(&path),
        );
        let resource = match loaded {
            Ok(resource) => resource,
            Err(err) => {
                entry.error = Some(format!("Failed to read '{}': {}", path.display(), err));
                return Some((entry, None));
            }
        };

        let model = self.parser.parse(&resource.text());
        let dir = path.parent().map(Path::to_path_buf);
        let mut variables = builtin_variables(dir.as_deref());
        let own_variables = collect_variables(&model, &uri, &variables);
        variables.extend(own_variables);

        entry.keywords = keywords_from_model(&model, &entry.name, Some(&path), KeywordSource::Resource)
            .into_iter()
            .map(Arc::new)
            .collect();
        entry.uri = Some(uri.clone());
        Some((
            entry,
            Some(PendingImports {
                uri,
                dir,
                model,
                variables,
                direct: false,
            }),
        ))
    }
}

fn same_library(a: &LibraryEntry, b: &LibraryEntry) -> bool {
    normalize(&a.name) == normalize(&b.name)
        && a.args == b.args
        && match (&a.catalog, &b.catalog) {
            (Ok(x), Ok(y)) => Arc::ptr_eq(x, y) || x.name == y.name,
            _ => normalize(&a.import_name) == normalize(&b.import_name),
        }
}
