//
// introspection.rs
//
// Library introspection seam: turns a library import into a keyword catalog
//

use std::path::{Path, PathBuf};

use anyhow::Context;
use walkdir::WalkDir;

use crate::builtins::builtin_catalog;
use crate::keyword_matcher::normalize;
use crate::library_doc::{LibraryCatalog, BUILTIN_LIBRARY_NAME};

/// Resolves a library import to its catalog.
///
/// Called from blocking worker threads; implementations may do file or
/// process I/O.
pub trait LibraryIntrospector: Send + Sync {
    fn resolve_library(
        &self,
        name: &str,
        args: &[String],
        search_paths: &[PathBuf],
    ) -> anyhow::Result<LibraryCatalog>;
}

/// `robot.libraries.Collections`, `libs/MyLib.py` and `MyLib` all map to
/// the stem of the last component.
pub fn library_stem(name: &str) -> &str {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let file = file.strip_suffix(".py").unwrap_or(file);
    file.rsplit('.').next().unwrap_or(file)
}

/// Reads pre-generated catalog files (`<Library>.json` or
/// `<Library>.libspec.json`) from the search paths. BuiltIn is always
/// available.
#[derive(Debug, Clone, Default)]
pub struct SpecFileIntrospector {
    max_depth: Option<usize>,
}

const SPEC_SUFFIXES: &[&str] = &[".libspec.json", ".json"];

impl SpecFileIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit how deep search paths are walked.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth: Some(max_depth),
        }
    }

    fn find_spec_file(&self, name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.extension().is_some_and(|ext| ext == "json") && direct.is_file() {
            return Some(direct.to_path_buf());
        }

        let wanted = normalize(library_stem(name));
        for root in search_paths {
            let mut walker = WalkDir::new(root).follow_links(true);
            if let Some(depth) = self.max_depth {
                walker = walker.max_depth(depth);
            }
            for entry in walker.into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let matches = {
                    let file_name = entry.file_name().to_string_lossy();
                    let found = SPEC_SUFFIXES
                        .iter()
                        .find_map(|suffix| file_name.strip_suffix(suffix))
                        .is_some_and(|stem| normalize(stem) == wanted);
                    found
                };
                if matches {
                    return Some(entry.into_path());
                }
            }
        }
        None
    }
}

impl LibraryIntrospector for SpecFileIntrospector {
    fn resolve_library(
        &self,
        name: &str,
        _args: &[String],
        search_paths: &[PathBuf],
    ) -> anyhow::Result<LibraryCatalog> {
        if normalize(name) == normalize(BUILTIN_LIBRARY_NAME) {
            return Ok(builtin_catalog().clone());
        }

        let path = self
            .find_spec_file(name, search_paths)
            .with_context(|| format!("Library '{}' not found in {:?}", name, search_paths))?;
        log::trace!("Loading catalog for '{}' from {}", name, path.display());

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut catalog = LibraryCatalog::from_json(&text)
            .with_context(|| format!("Invalid catalog {}", path.display()))?;
        if catalog.name.is_empty() {
            catalog.name = library_stem(name).to_string();
            catalog.fill_owner();
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_needs_no_search_path() {
        let catalog = SpecFileIntrospector::new()
            .resolve_library("BuiltIn", &[], &[])
            .unwrap();
        assert_eq!(catalog.name, "BuiltIn");
        assert!(catalog.keyword("Run Keyword If").is_some());
    }

    #[test]
    fn test_library_stem() {
        assert_eq!(library_stem("Collections"), "Collections");
        assert_eq!(library_stem("libs/MyLib.py"), "MyLib");
        assert_eq!(
            library_stem("robot.libraries.OperatingSystem"),
            "OperatingSystem"
        );
    }

    #[test]
    fn test_reads_spec_file_from_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("specs");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            nested.join("Browser.libspec.json"),
            r#"{"name": "Browser", "keywords": [{"name": "New Page", "args": ["url"]}]}"#,
        )
        .unwrap();

        let catalog = SpecFileIntrospector::new()
            .resolve_library("Browser", &[], &[dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(catalog.keywords[0].libname, "Browser");
    }

    #[test]
    fn test_missing_library_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SpecFileIntrospector::new()
            .resolve_library("Nope", &[], &[dir.path().to_path_buf()])
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
