//
// keyword_matcher.rs
//
// Keyword name equivalence: case, space and underscore insensitive comparison,
// plus structural matching for names with embedded arguments
//

use std::hash::{Hash, Hasher};

use regex::Regex;

use crate::syntax::variables::search_variables;

/// Lowercase and drop all whitespace and underscores.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Build a full-match pattern for a name containing `${arg}` or
/// `${arg:regex}` placeholders. `None` if there are none or a custom pattern
/// does not compile.
fn embedded_pattern(name: &str) -> Option<Regex> {
    let placeholders = search_variables(name, "$");
    if placeholders.is_empty() {
        return None;
    }
    let chars: Vec<char> = name.chars().collect();
    let mut pattern = String::from("(?is)^");
    let mut cursor = 0;
    for placeholder in &placeholders {
        let literal: String = chars[cursor..placeholder.start].iter().collect();
        pattern.push_str(&regex::escape(&literal));
        match placeholder.base.split_once(':') {
            Some((_, custom)) if !custom.is_empty() => {
                pattern.push_str("(?:");
                pattern.push_str(custom);
                pattern.push(')');
            }
            _ => pattern.push_str("(.*?)"),
        }
        cursor = placeholder.end;
    }
    let tail: String = chars[cursor..].iter().collect();
    pattern.push_str(&regex::escape(&tail));
    pattern.push('$');

    match Regex::new(&pattern) {
        Ok(regex) => Some(regex),
        Err(err) => {
            log::debug!("Invalid embedded argument pattern in '{}': {}", name, err);
            None
        }
    }
}

/// A declared keyword name prepared for matching call sites.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    name: String,
    normalized: String,
    embedded: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let normalized = normalize(&name);
        let embedded = embedded_pattern(&name);
        Self {
            name,
            normalized,
            embedded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn has_embedded_arguments(&self) -> bool {
        self.embedded.is_some()
    }

    /// Does the call-site text `candidate` refer to this keyword?
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.embedded {
            Some(regex) => regex.is_match(candidate),
            None => normalize(candidate) == self.normalized,
        }
    }
}

impl PartialEq for KeywordMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for KeywordMatcher {}

impl Hash for KeywordMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialEq<str> for KeywordMatcher {
    fn eq(&self, other: &str) -> bool {
        self.matches(other)
    }
}

impl PartialEq<&str> for KeywordMatcher {
    fn eq(&self, other: &&str) -> bool {
        self.matches(other)
    }
}
