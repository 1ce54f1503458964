//
// syntax/variables.rs
//
// Finding `${var}` style references inside cell values, and unescaping
//

use super::{Token, TokenKind};

/// A variable reference found in a value. Offsets are code-point indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableMatch {
    pub start: usize,
    pub end: usize,
    pub identifier: char,
    /// Text between the braces.
    pub base: String,
}

impl VariableMatch {
    /// The full reference without item access, e.g. `${name}`.
    pub fn base_len(&self) -> usize {
        self.base.chars().count() + 3
    }
}

fn is_escaped(chars: &[char], idx: usize) -> bool {
    chars[..idx].iter().rev().take_while(|c| **c == '\\').count() % 2 == 1
}

/// Index just past the brace closing the one opened at `open`.
fn find_closing(chars: &[char], open: usize, left: char, right: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut idx = open;
    while idx < chars.len() {
        let c = chars[idx];
        if c == '\\' {
            idx += 2;
            continue;
        }
        if c == left {
            depth += 1;
        } else if c == right {
            depth -= 1;
            if depth == 0 {
                return Some(idx + 1);
            }
        }
        idx += 1;
    }
    None
}

/// All variable references in `value` whose identifier is one of `identifiers`.
///
/// Unterminated references are ignored.
pub fn search_variables(value: &str, identifiers: &str) -> Vec<VariableMatch> {
    let chars: Vec<char> = value.chars().collect();
    let mut found = Vec::new();
    let mut idx = 0;
    while idx + 1 < chars.len() {
        let c = chars[idx];
        if identifiers.contains(c) && chars[idx + 1] == '{' && !is_escaped(&chars, idx) {
            if let Some(mut end) = find_closing(&chars, idx + 1, '{', '}') {
                let base: String = chars[idx + 2..end - 1].iter().collect();
                if c != '%' {
                    while end < chars.len() && chars[end] == '[' {
                        match find_closing(&chars, end, '[', ']') {
                            Some(item_end) => end = item_end,
                            None => break,
                        }
                    }
                }
                found.push(VariableMatch {
                    start: idx,
                    end,
                    identifier: c,
                    base,
                });
                idx = end;
                continue;
            }
        }
        idx += 1;
    }
    found
}

/// True if `value` is exactly one variable reference.
pub fn is_variable(value: &str) -> bool {
    match search_variables(value, "$@&%").as_slice() {
        [only] => only.start == 0 && only.end == value.chars().count(),
        _ => false,
    }
}

/// True if `value` is a scalar variable, `${name}`.
pub fn is_scalar_variable(value: &str) -> bool {
    is_variable(value) && value.starts_with('$') && value.ends_with('}')
}

/// Assignment target such as `${x}=`, `${x} =` or `@{items}`.
pub fn is_assign(value: &str) -> bool {
    let trimmed = value.strip_suffix('=').map_or(value, str::trim_end);
    matches!(trimmed.chars().next(), Some('$' | '@' | '&')) && is_variable(trimmed)
}

/// Split a token into pieces: variable references become [`TokenKind::Variable`]
/// tokens, literal text keeps the original kind.
pub fn split_variables(token: &Token, identifiers: &str) -> Vec<Token> {
    let matches = search_variables(&token.value, identifiers);
    if matches.is_empty() {
        return vec![token.clone()];
    }
    let chars: Vec<char> = token.value.chars().collect();
    let mut pieces = Vec::new();
    let mut cursor = 0;
    for m in matches {
        if m.start > cursor {
            pieces.push(Token::new(
                token.kind,
                chars[cursor..m.start].iter().collect::<String>(),
                token.line,
                token.col + cursor,
            ));
        }
        pieces.push(Token::new(
            TokenKind::Variable,
            chars[m.start..m.end].iter().collect::<String>(),
            token.line,
            token.col + m.start,
        ));
        cursor = m.end;
    }
    if cursor < chars.len() {
        pieces.push(Token::new(
            token.kind,
            chars[cursor..].iter().collect::<String>(),
            token.line,
            token.col + cursor,
        ));
    }
    pieces
}

fn hex_char(digits: &[char]) -> Option<char> {
    let text: String = digits.iter().collect();
    u32::from_str_radix(&text, 16).ok().and_then(char::from_u32)
}

/// Resolve backslash escapes the way the test runner does before using a
/// cell value as a keyword name.
pub fn unescape(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut idx = 0;
    while idx < chars.len() {
        let c = chars[idx];
        if c != '\\' {
            out.push(c);
            idx += 1;
            continue;
        }
        let Some(&next) = chars.get(idx + 1) else {
            break;
        };
        let hex_len = match next {
            'x' => 2,
            'u' => 4,
            'U' => 8,
            _ => 0,
        };
        if hex_len > 0 {
            let digits = chars.get(idx + 2..idx + 2 + hex_len);
            if let Some(ch) = digits.and_then(hex_char) {
                out.push(ch);
                idx += 2 + hex_len;
                continue;
            }
        }
        match next {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            other => out.push(other),
        }
        idx += 2;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_finds_nested_and_item_access() {
        let found = search_variables("a ${x} b ${y${z}} @{list}[0] \\${no}", "$@&%");
        let spans: Vec<(usize, usize)> = found.iter().map(|m| (m.start, m.end)).collect();
        assert_eq!(spans, vec![(2, 6), (9, 17), (18, 28)]);
        assert_eq!(found[1].base, "y${z}");
    }

    #[test]
    fn test_identifier_filter() {
        assert!(search_variables("@{x}", "$").is_empty());
        assert_eq!(search_variables("${x}", "$").len(), 1);
    }

    #[test]
    fn test_is_variable_and_assign() {
        assert!(is_variable("${x}"));
        assert!(is_variable("&{dict}"));
        assert!(!is_variable("x${x}"));
        assert!(!is_variable("${x"));
        assert!(is_assign("${x}="));
        assert!(is_assign("${x} ="));
        assert!(is_assign("@{items}"));
        assert!(!is_assign("%{ENV}="));
        assert!(!is_assign("Log"));
    }

    #[test]
    fn test_split_variables_keeps_positions() {
        let token = Token::new(TokenKind::Keyword, "Given ${x} is set", 3, 4);
        let pieces = split_variables(&token, "$");
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], Token::new(TokenKind::Keyword, "Given ", 3, 4));
        assert_eq!(pieces[1], Token::new(TokenKind::Variable, "${x}", 3, 10));
        assert_eq!(pieces[2], Token::new(TokenKind::Keyword, " is set", 3, 14));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("Log"), "Log");
        assert_eq!(unescape("\\${x}"), "${x}");
        assert_eq!(unescape("a\\nb"), "a\nb");
        assert_eq!(unescape("\\x41\\u00e9"), "Aé");
        assert_eq!(unescape("\\\\"), "\\");
        assert_eq!(unescape("trailing\\"), "trailing");
    }
}
