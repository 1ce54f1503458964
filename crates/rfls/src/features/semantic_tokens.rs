//
// features/semantic_tokens.rs
//
// Full-document semantic tokens driven by the call-chain classifier
//

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use ropey::Rope;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokens, SemanticTokensLegend, Url,
};

use super::{DocumentRequest, FeatureBus, Services};
use crate::bus::HandlerDescriptor;
use crate::classifier::{CallChainWalker, TokenRole};
use crate::error::Cancelled;
use crate::library_doc::KeywordDoc;
use crate::namespace::Namespace;
use crate::perf::TimingGuard;
use crate::syntax::variables::{search_variables, split_variables};
use crate::syntax::{Model, StatementKind, Token, TokenKind};
use crate::utf16;
use crate::ROBOT_LANGUAGE_ID;

/// Token types in legend order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RfTokenType {
    Header,
    HeaderSetting,
    HeaderVariable,
    HeaderTestcase,
    HeaderKeyword,
    HeaderComment,
    Setting,
    SettingImport,
    TestcaseName,
    KeywordName,
    ControlFlow,
    Argument,
    Variable,
    KeywordCall,
    KeywordCallInner,
    NameCall,
    Continuation,
    Separator,
    ForSeparator,
    VariableBegin,
    VariableEnd,
    Escape,
    Namespace,
    Comment,
    Operator,
}

const TOKEN_TYPE_NAMES: &[&str] = &[
    "header",
    "headerSetting",
    "headerVariable",
    "headerTestcase",
    "headerKeyword",
    "headerComment",
    "setting",
    "settingImport",
    "testcaseName",
    "keywordName",
    "controlFlow",
    "argument",
    "variable",
    "keywordCall",
    "keywordCallInner",
    "nameCall",
    "continuation",
    "separator",
    "forSeparator",
    "variableBegin",
    "variableEnd",
    "escape",
    "namespace",
    "comment",
    "operator",
];

const TOKEN_MODIFIER_NAMES: &[&str] = &["builtin", "declaration", "documentation"];

pub const MOD_BUILTIN: u32 = 1;
pub const MOD_DECLARATION: u32 = 1 << 1;
pub const MOD_DOCUMENTATION: u32 = 1 << 2;

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: TOKEN_TYPE_NAMES
            .iter()
            .map(|name| SemanticTokenType::new(name))
            .collect(),
        token_modifiers: TOKEN_MODIFIER_NAMES
            .iter()
            .map(|name| SemanticTokenModifier::new(name))
            .collect(),
    }
}

fn kind_type(kind: TokenKind) -> Option<RfTokenType> {
    Some(match kind {
        TokenKind::SettingHeader => RfTokenType::HeaderSetting,
        TokenKind::VariableHeader => RfTokenType::HeaderVariable,
        TokenKind::TestCaseHeader => RfTokenType::HeaderTestcase,
        TokenKind::KeywordHeader => RfTokenType::HeaderKeyword,
        TokenKind::CommentHeader => RfTokenType::HeaderComment,
        TokenKind::Setting => RfTokenType::Setting,
        TokenKind::Import => RfTokenType::SettingImport,
        TokenKind::WithName => RfTokenType::ControlFlow,
        TokenKind::Name | TokenKind::Alias => RfTokenType::NameCall,
        TokenKind::TestCaseName => RfTokenType::TestcaseName,
        TokenKind::KeywordName => RfTokenType::KeywordName,
        TokenKind::Variable | TokenKind::Assign => RfTokenType::Variable,
        TokenKind::Keyword => RfTokenType::KeywordCall,
        TokenKind::Argument => RfTokenType::Argument,
        TokenKind::Control => RfTokenType::ControlFlow,
        TokenKind::ForSeparator => RfTokenType::ForSeparator,
        TokenKind::Comment => RfTokenType::Comment,
        TokenKind::Continuation => RfTokenType::Continuation,
        TokenKind::Separator | TokenKind::Eol | TokenKind::Error => return None,
    })
}

/// A token before delta encoding; positions in code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemToken {
    pub line: usize,
    pub col: usize,
    pub len: usize,
    pub token_type: RfTokenType,
    pub modifiers: u32,
}

#[derive(Debug, Default)]
struct Collector {
    tokens: Vec<SemToken>,
}

impl Collector {
    fn push(&mut self, line: usize, col: usize, len: usize, token_type: RfTokenType, modifiers: u32) {
        if len > 0 {
            self.tokens.push(SemToken {
                line,
                col,
                len,
                token_type,
                modifiers,
            });
        }
    }

    /// `${name}[item]` as begin, body and end, item access as variable.
    fn variable(&mut self, token: &Token) {
        let Some(found) = search_variables(&token.value, "$@&%").into_iter().next() else {
            self.push(token.line, token.col, token.len(), RfTokenType::Variable, 0);
            return;
        };
        let col = token.col + found.start;
        let base = found.base.chars().count();
        self.push(token.line, col, 2, RfTokenType::VariableBegin, 0);
        self.push(token.line, col + 2, base, RfTokenType::Variable, 0);
        self.push(token.line, col + 2 + base, 1, RfTokenType::VariableEnd, 0);
        let tail = found.end.saturating_sub(found.start + found.base_len());
        self.push(token.line, col + found.base_len(), tail, RfTokenType::Variable, 0);
    }

    /// Literal text with backslash escapes split out.
    fn literal(&mut self, token: &Token, token_type: RfTokenType, modifiers: u32) {
        if token_type != RfTokenType::Argument || !token.value.contains('\\') {
            self.push(token.line, token.col, token.len(), token_type, modifiers);
            return;
        }
        let chars: Vec<char> = token.value.chars().collect();
        let mut start = 0;
        let mut idx = 0;
        while idx < chars.len() {
            if chars[idx] != '\\' {
                idx += 1;
                continue;
            }
            self.push(token.line, token.col + start, idx - start, token_type, modifiers);
            let len = escape_len(&chars[idx..]);
            self.push(token.line, token.col + idx, len, RfTokenType::Escape, modifiers);
            idx += len;
            start = idx;
        }
        self.push(token.line, token.col + start, idx - start, token_type, modifiers);
    }

    fn with_variables(&mut self, token: &Token, token_type: RfTokenType, modifiers: u32) {
        for piece in split_variables(token, "$@&%") {
            if piece.kind == TokenKind::Variable {
                self.variable(&piece);
            } else {
                self.literal(&piece, token_type, modifiers);
            }
        }
    }

    /// Assignment or declared variable, with a trailing `=` as operator.
    fn assignment(&mut self, token: &Token) {
        let Some(body) = token.value.strip_suffix('=') else {
            self.variable(token);
            return;
        };
        let trimmed = body.trim_end();
        let var = Token::new(token.kind, trimmed, token.line, token.col);
        self.variable(&var);
        self.push(
            token.line,
            token.col + token.len() - 1,
            1,
            RfTokenType::Operator,
            0,
        );
    }

    fn call(
        &mut self,
        namespace: &Namespace,
        token: &Token,
        token_type: RfTokenType,
        keyword: Option<&Arc<KeywordDoc>>,
    ) {
        let modifiers = match keyword {
            Some(kw) if kw.is_builtin() => MOD_BUILTIN,
            _ => 0,
        };
        let qualified = keyword
            .and_then(|kw| namespace.split_qualified(&token.value).map(|split| (kw, split)))
            .filter(|(kw, (_, rest))| kw.matcher().matches(rest));
        match qualified {
            Some((_, (owner, rest))) => {
                let owner_len = owner.chars().count();
                self.push(token.line, token.col, owner_len, RfTokenType::Namespace, modifiers);
                self.push(token.line, token.col + owner_len, 1, RfTokenType::Operator, 0);
                let rest = Token::new(token.kind, rest, token.line, token.col + owner_len + 1);
                self.with_variables(&rest, token_type, modifiers);
            }
            None => self.with_variables(token, token_type, modifiers),
        }
    }
}

fn is_hex_run(chars: &[char], len: usize) -> bool {
    chars.len() >= len && chars[..len].iter().all(char::is_ascii_hexdigit)
}

/// Length in code points of the escape sequence starting at `chars[0]`.
fn escape_len(chars: &[char]) -> usize {
    match chars.get(1) {
        None => 1,
        Some('x') if is_hex_run(&chars[2..], 2) => 4,
        Some('u') if is_hex_run(&chars[2..], 4) => 6,
        Some('U') if is_hex_run(&chars[2..], 8) => 10,
        Some(_) => 2,
    }
}

/// Classify every statement of `model`. Checks `cancel` once per statement
/// and once per classified token.
pub fn collect_tokens(
    namespace: &Namespace,
    model: &Model,
    cancel: &CancellationToken,
) -> Result<Vec<SemToken>, Cancelled> {
    let mut out = Collector::default();
    for statement in &model.statements {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        let has_call = statement.tokens.iter().any(|t| t.kind == TokenKind::Keyword);
        let classified: HashMap<(usize, usize), (TokenRole, Option<Arc<KeywordDoc>>)> = if has_call {
            CallChainWalker::new(namespace, statement)
                .with_cancellation(cancel.clone())
                .classify()?
                .into_iter()
                .map(|c| ((c.token.line, c.token.col), (c.role, c.keyword)))
                .collect()
        } else {
            HashMap::new()
        };
        let documentation = statement.kind == StatementKind::Documentation;

        for token in &statement.tokens {
            let role = classified.get(&(token.line, token.col));
            match role {
                Some((TokenRole::Keyword, keyword)) => {
                    out.call(namespace, token, RfTokenType::KeywordCall, keyword.as_ref());
                    continue;
                }
                Some((TokenRole::InnerKeyword, keyword)) => {
                    out.call(namespace, token, RfTokenType::KeywordCallInner, keyword.as_ref());
                    continue;
                }
                Some((TokenRole::ControlFlow, _)) => {
                    out.push(token.line, token.col, token.len(), RfTokenType::ControlFlow, 0);
                    continue;
                }
                _ => {}
            }
            let Some(token_type) = kind_type(token.kind) else {
                continue;
            };
            match token.kind {
                TokenKind::Variable | TokenKind::Assign => out.assignment(token),
                TokenKind::TestCaseName | TokenKind::KeywordName => {
                    out.with_variables(token, token_type, MOD_DECLARATION)
                }
                TokenKind::Argument if documentation => {
                    out.push(token.line, token.col, token.len(), token_type, MOD_DOCUMENTATION)
                }
                kind if kind.allows_variables() => out.with_variables(token, token_type, 0),
                _ => out.push(token.line, token.col, token.len(), token_type, 0),
            }
        }
    }
    Ok(out.tokens)
}

/// Delta-encode `tokens` with UTF-16 columns taken from `rope`.
pub fn encode(rope: &Rope, tokens: &[SemToken]) -> Vec<SemanticToken> {
    let mut data = Vec::with_capacity(tokens.len());
    let mut line_cache: Option<(usize, String)> = None;
    let (mut prev_line, mut prev_start) = (0u32, 0u32);

    for token in tokens {
        let text = match &line_cache {
            Some((line, text)) if *line == token.line => text,
            _ => {
                let text = utf16::line_text(rope, token.line).unwrap_or_default();
                &line_cache.insert((token.line, text)).1
            }
        };
        let start = utf16::char_to_utf16_column(text, token.col);
        let end = utf16::char_to_utf16_column(text, token.col + token.len);
        if end <= start {
            continue;
        }
        let line = token.line as u32;
        let delta_line = line - prev_line;
        let delta_start = if delta_line == 0 { start - prev_start } else { start };
        data.push(SemanticToken {
            delta_line,
            delta_start,
            length: end - start,
            token_type: token.token_type as u32,
            token_modifiers_bitset: token.modifiers,
        });
        prev_line = line;
        prev_start = start;
    }
    data
}

#[derive(Debug)]
struct CachedTokens {
    revision: u64,
    namespace: Arc<Namespace>,
    data: Arc<Vec<SemanticToken>>,
}

/// Encoded tokens per document, valid for one revision and namespace.
#[derive(Debug, Default)]
pub struct SemanticTokenCache {
    entries: DashMap<Url, CachedTokens>,
}

impl SemanticTokenCache {
    pub fn get(&self, uri: &Url, revision: u64, namespace: &Arc<Namespace>) -> Option<Arc<Vec<SemanticToken>>> {
        self.entries
            .get(uri)
            .filter(|entry| entry.revision == revision && Arc::ptr_eq(&entry.namespace, namespace))
            .map(|entry| Arc::clone(&entry.data))
    }

    pub fn insert(&self, uri: Url, revision: u64, namespace: Arc<Namespace>, data: Arc<Vec<SemanticToken>>) {
        self.entries.insert(
            uri,
            CachedTokens {
                revision,
                namespace,
                data,
            },
        );
    }

    pub fn remove(&self, uri: &Url) {
        self.entries.remove(uri);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn full(services: &Services, req: DocumentRequest) -> anyhow::Result<Option<SemanticTokens>> {
    let doc = &req.document;
    let cache = &services.semantic_tokens;
    let data = match cache.get(doc.uri(), doc.snapshot.revision, &doc.namespace) {
        Some(data) => data,
        None => {
            let timer = TimingGuard::with_threshold("semantic_tokens", 100);
            let tokens = collect_tokens(&doc.namespace, &doc.model, &req.cancel)?;
            let data = Arc::new(encode(&doc.snapshot.rope, &tokens));
            timer.finish();
            log::trace!("{} semantic tokens for {}", data.len(), doc.uri());
            cache.insert(
                doc.uri().clone(),
                doc.snapshot.revision,
                Arc::clone(&doc.namespace),
                Arc::clone(&data),
            );
            data
        }
    };
    Ok(Some(SemanticTokens {
        result_id: None,
        data: data.as_ref().clone(),
    }))
}

pub fn register(bus: &mut FeatureBus, services: &Arc<Services>) {
    let services = Arc::clone(services);
    bus.semantic_tokens_full.register(
        HandlerDescriptor::new("semantic_tokens").languages([ROBOT_LANGUAGE_ID]),
        move |req: DocumentRequest| {
            let services = Arc::clone(&services);
            async move { full(&services, req).await }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_namespace, parse};

    /// Absolute (line, utf16 col, utf16 len, type, modifiers) per token.
    fn decode(data: &[SemanticToken]) -> Vec<(u32, u32, u32, u32, u32)> {
        let (mut line, mut col) = (0, 0);
        data.iter()
            .map(|t| {
                if t.delta_line > 0 {
                    line += t.delta_line;
                    col = t.delta_start;
                } else {
                    col += t.delta_start;
                }
                (line, col, t.length, t.token_type, t.token_modifiers_bitset)
            })
            .collect()
    }

    fn tokens_of(text: &str) -> Vec<(u32, u32, u32, u32, u32)> {
        let ns = build_namespace(text);
        let model = parse(text);
        let tokens = collect_tokens(&ns, &model, &CancellationToken::new()).unwrap();
        decode(&encode(&Rope::from_str(text), &tokens))
    }

    fn ty(t: RfTokenType) -> u32 {
        t as u32
    }

    #[test]
    fn test_legend_matches_enum() {
        let legend = legend();
        assert_eq!(legend.token_types.len(), RfTokenType::Operator as usize + 1);
        assert_eq!(legend.token_types[ty(RfTokenType::KeywordCallInner) as usize].as_str(), "keywordCallInner");
        assert_eq!(legend.token_modifiers.len(), 3);
    }

    #[test]
    fn test_builtin_call_and_declaration() {
        let tokens = tokens_of("*** Test Cases ***\nFirst\n    Log    hi\n");
        assert_eq!(
            tokens,
            vec![
                (0, 0, 18, ty(RfTokenType::HeaderTestcase), 0),
                (1, 0, 5, ty(RfTokenType::TestcaseName), MOD_DECLARATION),
                (2, 4, 3, ty(RfTokenType::KeywordCall), MOD_BUILTIN),
                (2, 11, 2, ty(RfTokenType::Argument), 0),
            ]
        );
    }

    #[test]
    fn test_run_keyword_if_inner_calls() {
        let text = "*** Keywords ***\nInner A\n    No Operation\nInner B\n    No Operation\nOuter\n    Run Keyword If    ${x}    Inner A    ELSE    Inner B\n";
        let tokens = tokens_of(text);
        let line6: Vec<_> = tokens.iter().filter(|t| t.0 == 6).map(|t| (t.1, t.3)).collect();
        assert!(line6.contains(&(4, ty(RfTokenType::KeywordCall))));
        assert!(line6.contains(&(30, ty(RfTokenType::KeywordCallInner))));
        assert!(line6.contains(&(41, ty(RfTokenType::ControlFlow))));
        assert!(line6.contains(&(49, ty(RfTokenType::KeywordCallInner))));
    }

    #[test]
    fn test_variable_split_into_parts() {
        let tokens = tokens_of("*** Test Cases ***\nT\n    Log    ${name}\n");
        let line2: Vec<_> = tokens.iter().filter(|t| t.0 == 2).map(|t| (t.1, t.2, t.3)).collect();
        assert_eq!(
            line2,
            vec![
                (4, 3, ty(RfTokenType::KeywordCall)),
                (11, 2, ty(RfTokenType::VariableBegin)),
                (13, 4, ty(RfTokenType::Variable)),
                (17, 1, ty(RfTokenType::VariableEnd)),
            ]
        );
    }

    #[test]
    fn test_assignment_operator() {
        let tokens = tokens_of("*** Test Cases ***\nT\n    ${x}=    Set Variable    1\n");
        let line2: Vec<_> = tokens.iter().filter(|t| t.0 == 2).map(|t| (t.1, t.3)).collect();
        assert_eq!(line2[0], (4, ty(RfTokenType::VariableBegin)));
        assert_eq!(line2[3], (8, ty(RfTokenType::Operator)));
        assert_eq!(line2[4], (13, ty(RfTokenType::KeywordCall)));
    }

    #[test]
    fn test_escapes_in_arguments() {
        let tokens = tokens_of("*** Test Cases ***\nT\n    Log    a\\nb\n");
        let line2: Vec<_> = tokens.iter().filter(|t| t.0 == 2).map(|t| (t.1, t.2, t.3)).collect();
        assert_eq!(
            line2[1..],
            [
                (11, 1, ty(RfTokenType::Argument)),
                (12, 2, ty(RfTokenType::Escape)),
                (14, 1, ty(RfTokenType::Argument)),
            ]
        );
    }

    #[test]
    fn test_utf16_lengths() {
        let tokens = tokens_of("*** Test Cases ***\nT\n    Log    😀x\n");
        let arg = tokens.iter().find(|t| t.0 == 2 && t.3 == ty(RfTokenType::Argument)).unwrap();
        assert_eq!((arg.1, arg.2), (11, 3));
    }

    #[test]
    fn test_qualified_call_split() {
        let tokens = tokens_of("*** Test Cases ***\nT\n    BuiltIn.Log    hi\n");
        let line2: Vec<_> = tokens.iter().filter(|t| t.0 == 2).map(|t| (t.1, t.2, t.3)).collect();
        assert_eq!(line2[0], (4, 7, ty(RfTokenType::Namespace)));
        assert_eq!(line2[1], (11, 1, ty(RfTokenType::Operator)));
        assert_eq!(line2[2], (12, 3, ty(RfTokenType::KeywordCall)));
    }

    #[test]
    fn test_cancelled_collection_yields_nothing() {
        let text = "*** Test Cases ***\nT\n    Log    hi\n";
        let ns = build_namespace(text);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(collect_tokens(&ns, &parse(text), &cancel).is_err());
    }

    #[test]
    fn test_escape_len() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(escape_len(&chars("\\x41rest")), 4);
        assert_eq!(escape_len(&chars("\\u00e9")), 6);
        assert_eq!(escape_len(&chars("\\xZZ")), 2);
        assert_eq!(escape_len(&chars("\\")), 1);
    }
}
