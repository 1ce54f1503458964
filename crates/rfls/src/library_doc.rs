//
// library_doc.rs
//
// Keyword catalogs as delivered by library introspection, and the static
// classification of the BuiltIn keywords that run other keywords
//

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::keyword_matcher::{normalize, KeywordMatcher};

pub const BUILTIN_LIBRARY_NAME: &str = "BuiltIn";

/// Keywords whose first argument is the name of another keyword.
pub const RUN_KEYWORD_NAMES: &[&str] = &[
    "Run Keyword",
    "Run Keyword And Continue On Failure",
    "Run Keyword And Ignore Error",
    "Run Keyword And Return",
    "Run Keyword And Return Status",
    "Run Keyword If All Critical Tests Passed",
    "Run Keyword If All Tests Passed",
    "Run Keyword If Any Critical Tests Failed",
    "Run Keyword If Any Tests Failed",
    "Run Keyword If Test Failed",
    "Run Keyword If Test Passed",
    "Run Keyword If Timeout Occurred",
];

/// Keywords taking a condition (or expected error) before the keyword name.
pub const RUN_KEYWORD_WITH_CONDITION_NAMES: &[&str] = &[
    "Run Keyword And Expect Error",
    "Run Keyword And Return If",
    "Run Keyword Unless",
];

pub const RUN_KEYWORD_IF_NAME: &str = "Run Keyword If";

pub const RUN_KEYWORDS_NAME: &str = "Run Keywords";

/// How a meta-keyword dispatches to the keywords named in its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKeywordKind {
    /// `Run Keyword    name    args...`
    RunKeyword,
    /// `Run Keyword Unless    condition    name    args...`
    WithCondition,
    /// `Run Keywords    name    args...    AND    name ...`
    RunKeywords,
    /// `Run Keyword If    cond    name    args    ELSE IF    cond    name    ELSE    name`
    RunKeywordIf,
}

impl MetaKeywordKind {
    /// Classify a BuiltIn keyword by name. `None` for ordinary keywords.
    pub fn for_builtin(name: &str) -> Option<Self> {
        let normalized = normalize(name);
        let is = |candidate: &str| normalize(candidate) == normalized;
        if is(RUN_KEYWORD_IF_NAME) {
            Some(MetaKeywordKind::RunKeywordIf)
        } else if is(RUN_KEYWORDS_NAME) {
            Some(MetaKeywordKind::RunKeywords)
        } else if RUN_KEYWORD_WITH_CONDITION_NAMES.iter().any(|n| is(n)) {
            Some(MetaKeywordKind::WithCondition)
        } else if RUN_KEYWORD_NAMES.iter().any(|n| is(n)) {
            Some(MetaKeywordKind::RunKeyword)
        } else {
            None
        }
    }
}

/// Where a keyword came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum KeywordSource {
    #[default]
    Library,
    Resource,
    /// Defined in the document itself.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordDoc {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Library name, or resource basename, owning the keyword.
    #[serde(default)]
    pub libname: String,
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// Zero-based line of the definition in `source`.
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub kind: KeywordSource,
}

impl KeywordDoc {
    pub fn new(name: impl Into<String>, libname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            doc: String::new(),
            tags: Vec::new(),
            libname: libname.into(),
            source: None,
            line: None,
            kind: KeywordSource::Library,
        }
    }

    pub fn matcher(&self) -> KeywordMatcher {
        KeywordMatcher::new(self.name.clone())
    }

    pub fn is_builtin(&self) -> bool {
        self.libname == BUILTIN_LIBRARY_NAME
    }

    /// Meta-keyword classification from catalog data alone.
    pub fn meta_kind(&self) -> Option<MetaKeywordKind> {
        if !self.is_builtin() {
            return None;
        }
        MetaKeywordKind::for_builtin(&self.name)
    }

    pub fn signature(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            format!("{}    {}", self.name, self.args.join("    "))
        }
    }

    /// Signature and documentation as plain text.
    pub fn to_plain_text(&self) -> String {
        let owner = if self.libname.is_empty() {
            String::new()
        } else {
            format!("{}.", self.libname)
        };
        if self.doc.is_empty() {
            format!("{}{}", owner, self.signature())
        } else {
            format!("{}{}\n\n{}", owner, self.signature(), self.doc)
        }
    }

    /// Markdown for hovers; the fenced signature is left out when the client
    /// shows it elsewhere, as signature help does.
    pub fn to_markdown(&self, with_signature: bool) -> String {
        let mut parts = Vec::new();
        if with_signature {
            let owner = if self.libname.is_empty() {
                String::new()
            } else {
                format!("{}.", self.libname)
            };
            parts.push(format!("```robotframework\n{}{}\n```", owner, self.signature()));
        }
        if !self.doc.is_empty() {
            parts.push(self.doc.clone());
        }
        if !self.tags.is_empty() {
            parts.push(format!("*Tags:* {}", self.tags.join(", ")));
        }
        parts.join("\n\n")
    }

    /// Index into `args` of the parameter receiving the argument at `index`.
    ///
    /// `typed` is the argument text, so `name=value` selects its named
    /// parameter. Positions past the fixed parameters land on `*varargs`.
    pub fn active_parameter(&self, index: usize, typed: Option<&str>) -> Option<usize> {
        if let Some((name, _)) = typed.and_then(|text| text.split_once('=')) {
            let named = self
                .args
                .iter()
                .position(|arg| !is_varargs(arg) && !is_kwargs(arg) && argument_name(arg) == name)
                .or_else(|| self.args.iter().position(|arg| is_kwargs(arg)));
            if named.is_some() {
                return named;
            }
        }
        let fixed = self
            .args
            .iter()
            .position(|arg| is_varargs(arg) || is_kwargs(arg))
            .unwrap_or(self.args.len());
        if index < fixed {
            return Some(index);
        }
        self.args.iter().position(|arg| is_varargs(arg))
    }
}

/// Name of a declared argument: `level=INFO` and `${level}=INFO` both give `level`.
pub fn argument_name(arg: &str) -> &str {
    let declared = arg.split('=').next().unwrap_or(arg);
    declared
        .trim_start_matches(['*', '$', '@', '&'])
        .trim_start_matches('{')
        .trim_end_matches('}')
}

fn is_varargs(arg: &str) -> bool {
    arg.starts_with('@') || (arg.starts_with('*') && !arg.starts_with("**"))
}

fn is_kwargs(arg: &str) -> bool {
    arg.starts_with('&') || arg.starts_with("**")
}

/// Result of introspecting one library import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LibraryCatalog {
    pub name: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub keywords: Vec<KeywordDoc>,
    /// Non-fatal problems reported while loading the library.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl LibraryCatalog {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let mut catalog: LibraryCatalog = serde_json::from_str(text)?;
        catalog.fill_owner();
        Ok(catalog)
    }

    /// Keywords without an explicit owner belong to the catalog.
    pub fn fill_owner(&mut self) {
        for keyword in &mut self.keywords {
            if keyword.libname.is_empty() {
                keyword.libname = self.name.clone();
            }
            if keyword.source.is_none() {
                keyword.source = self.source.clone();
            }
        }
    }

    pub fn keyword(&self, name: &str) -> Option<&KeywordDoc> {
        self.keywords.iter().find(|kw| kw.matcher().matches(name))
    }
}
