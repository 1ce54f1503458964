//
// namespace/variables.rs
//
// Variables known while resolving imports, and substitution of `${name}`
// references in import names and arguments
//

use std::path::Path;

use indexmap::IndexMap;
use tower_lsp::lsp_types::Url;

use crate::keyword_matcher::normalize;
use crate::syntax::variables::search_variables;
use crate::syntax::{Model, StatementKind, TokenKind};

/// A variable whose value is known without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvableVariable {
    /// Name as written, e.g. `${BASE URL}`.
    pub name: String,
    pub value: String,
    /// Defining document and zero-based line, `None` for built-in variables.
    pub source: Option<(Url, usize)>,
}

/// Key under which a variable name is stored: the normalized base.
pub fn variable_key(name: &str) -> String {
    let name = name.trim().trim_end_matches('=').trim_end();
    let base = match name.char_indices().nth(1) {
        Some((idx, '{')) if name.ends_with('}') => &name[idx + 1..name.len() - 1],
        _ => name,
    };
    normalize(base)
}

/// Built-in variables for a document in `dir`.
pub fn builtin_variables(dir: Option<&Path>) -> IndexMap<String, ResolvableVariable> {
    let mut vars = IndexMap::new();
    let mut add = |name: &str, value: String| {
        vars.insert(
            variable_key(name),
            ResolvableVariable {
                name: name.to_string(),
                value,
                source: None,
            },
        );
    };
    if let Some(dir) = dir {
        add("${CURDIR}", dir.to_string_lossy().into_owned());
    }
    add("${TEMPDIR}", std::env::temp_dir().to_string_lossy().into_owned());
    add("${/}", std::path::MAIN_SEPARATOR.to_string());
    add("${:}", if cfg!(windows) { ";" } else { ":" }.to_string());
    add("${SPACE}", " ".to_string());
    add("${EMPTY}", String::new());
    add("${TRUE}", "True".to_string());
    add("${FALSE}", "False".to_string());
    add("${None}", "None".to_string());
    vars
}

/// Scalar variables defined in the `*** Variables ***` section of `model`.
///
/// Values are substituted with what is known so far, so later definitions
/// can build on earlier ones.
pub fn collect_variables(
    model: &Model,
    uri: &Url,
    known: &IndexMap<String, ResolvableVariable>,
) -> IndexMap<String, ResolvableVariable> {
    let mut scope = known.clone();
    let mut own = IndexMap::new();
    for statement in model
        .statements
        .iter()
        .filter(|s| s.kind == StatementKind::VariableDefinition)
    {
        let Some(name_token) = statement.get_token(TokenKind::Variable) else {
            continue;
        };
        let name = name_token.value.trim_end_matches('=').trim_end();
        if !name.starts_with('$') {
            continue;
        }
        let value = statement
            .get_tokens(TokenKind::Argument)
            .map(|t| replace_variables(&t.value, &scope))
            .collect::<Vec<_>>()
            .join(" ");
        let variable = ResolvableVariable {
            name: name.to_string(),
            value,
            source: Some((uri.clone(), name_token.line)),
        };
        scope.insert(variable_key(name), variable.clone());
        own.insert(variable_key(name), variable);
    }
    own
}

/// Replace scalar references with their known values. Unknown references and
/// item access are left as written.
pub fn replace_variables(text: &str, vars: &IndexMap<String, ResolvableVariable>) -> String {
    let matches = search_variables(text, "$");
    if matches.is_empty() {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in matches {
        let known = (m.end - m.start == m.base_len())
            .then(|| vars.get(&normalize(&m.base)))
            .flatten();
        out.extend(&chars[cursor..m.start]);
        match known {
            Some(var) => out.push_str(&var.value),
            None => out.extend(&chars[m.start..m.end]),
        }
        cursor = m.end;
    }
    out.extend(&chars[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{DocumentParser, SpaceSeparatedParser};

    #[test]
    fn test_variable_key_normalizes_base() {
        assert_eq!(variable_key("${Base URL}"), "baseurl");
        assert_eq!(variable_key("${base_url} ="), "baseurl");
        assert_eq!(variable_key("@{items}"), "items");
    }

    #[test]
    fn test_replace_known_and_keep_unknown() {
        let vars = builtin_variables(Some(Path::new("/suite")));
        assert_eq!(
            replace_variables("${CURDIR}${/}common.resource", &vars),
            format!("/suite{}common.resource", std::path::MAIN_SEPARATOR)
        );
        assert_eq!(replace_variables("${unknown}/x", &vars), "${unknown}/x");
        assert_eq!(replace_variables("plain", &vars), "plain");
    }

    #[test]
    fn test_section_variables_build_on_each_other() {
        let text = "*** Variables ***\n${ROOT}    /opt/res\n${COMMON}    ${ROOT}/common.resource\n@{LIST}    a    b\n";
        let model = SpaceSeparatedParser::new().parse(text);
        let uri = Url::parse("file:///suite/a.robot").unwrap();
        let vars = collect_variables(&model, &uri, &builtin_variables(None));
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["common"].value, "/opt/res/common.resource");
        assert_eq!(vars["root"].source, Some((uri, 1)));
    }
}
