//
// classifier.rs
//
// Attributes the tokens of a keyword call to their roles, expanding
// meta-keywords (`Run Keyword`, `Run Keywords`, `Run Keyword If`, ...) into
// the calls they make. Driven by catalog metadata only.
//

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Cancelled, ResolveError};
use crate::library_doc::{KeywordDoc, MetaKeywordKind};
use crate::namespace::Namespace;
use crate::syntax::variables::{is_variable, unescape};
use crate::syntax::{Statement, Token, TokenKind};

const AND: &str = "AND";
const ELSE: &str = "ELSE";
const ELSE_IF: &str = "ELSE IF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenRole {
    /// Data before the call: assignments, the name of a fixture setting.
    Leading,
    /// The keyword called by the statement.
    Keyword,
    /// A keyword called through a meta-keyword.
    InnerKeyword,
    /// `AND`, `ELSE IF`, `ELSE`.
    ControlFlow,
    /// Condition or expected error of a meta-keyword; never dispatched.
    Condition,
    Argument,
}

#[derive(Debug, Clone)]
pub struct ClassifiedToken {
    pub token: Token,
    pub role: TokenRole,
    /// For keyword roles the resolved keyword; for arguments and conditions
    /// the keyword they are passed to.
    pub keyword: Option<Arc<KeywordDoc>>,
    /// Why a call could not be looked up at all, as opposed to not found.
    pub error: Option<ResolveError>,
}

impl ClassifiedToken {
    pub fn is_call(&self) -> bool {
        matches!(self.role, TokenRole::Keyword | TokenRole::InnerKeyword)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Condition,
    Keyword,
    Separator,
}

/// Pending work. Ranges index into the walker's token list.
#[derive(Debug, Clone)]
enum Frame {
    Emit {
        at: usize,
        end: usize,
        role: TokenRole,
        keyword: Option<Arc<KeywordDoc>>,
    },
    Call {
        at: usize,
        end: usize,
        inner: bool,
    },
    /// Remaining arguments of `Run Keywords`.
    Keywords {
        at: usize,
        end: usize,
        separated: bool,
    },
    /// Remaining arguments of `Run Keyword If`.
    Branches { at: usize, end: usize, next: Branch },
}

/// Lazy walk over one statement's data tokens.
///
/// Depth of the call chain costs stack frames on the heap, not recursion.
/// Cloning the walker restarts nothing; it forks the walk at its position.
#[derive(Debug, Clone)]
pub struct CallChainWalker<'a> {
    namespace: &'a Namespace,
    tokens: Vec<Token>,
    stack: Vec<Frame>,
    cancel: Option<CancellationToken>,
    done: bool,
}

impl<'a> CallChainWalker<'a> {
    /// Walk the data tokens of `statement`. The first [`TokenKind::Keyword`]
    /// token is the call; anything before it is emitted as leading data.
    pub fn new(namespace: &'a Namespace, statement: &Statement) -> Self {
        Self::from_tokens(namespace, statement.data_tokens().cloned().collect())
    }

    pub fn from_tokens(namespace: &'a Namespace, tokens: Vec<Token>) -> Self {
        let end = tokens.len();
        let mut stack = Vec::new();
        match tokens.iter().position(|t| t.kind == TokenKind::Keyword) {
            Some(call) => {
                stack.push(Frame::Call {
                    at: call,
                    end,
                    inner: false,
                });
                stack.push(Frame::Emit {
                    at: 0,
                    end: call,
                    role: TokenRole::Leading,
                    keyword: None,
                });
            }
            None => stack.push(Frame::Emit {
                at: 0,
                end,
                role: TokenRole::Leading,
                keyword: None,
            }),
        }
        Self {
            namespace,
            tokens,
            stack,
            cancel: None,
            done: false,
        }
    }

    /// Stop with [`Cancelled`] at the next token once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Collect the whole walk, or nothing if it was cancelled.
    pub fn classify(self) -> Result<Vec<ClassifiedToken>, Cancelled> {
        self.collect()
    }

    fn lookup(&self, token: &Token, inner: bool) -> Result<Option<Arc<KeywordDoc>>, ResolveError> {
        if !inner {
            return self.namespace.find_keyword(&token.value);
        }
        if is_variable(&token.value) {
            return Ok(None);
        }
        self.namespace.find_keyword(&unescape(&token.value))
    }

    fn value(&self, at: usize) -> &str {
        &self.tokens[at].value
    }

    /// First index in `from..end` holding one of the `stop` markers.
    fn find_control(&self, from: usize, end: usize, stop: &[&str]) -> Option<usize> {
        (from..end).find(|idx| stop.contains(&self.value(*idx)))
    }

    fn emit(&self, at: usize, role: TokenRole, keyword: Option<Arc<KeywordDoc>>) -> ClassifiedToken {
        ClassifiedToken {
            token: self.tokens[at].clone(),
            role,
            keyword,
            error: None,
        }
    }

    /// Queue what follows the keyword at `at`, according to its meta kind.
    fn expand(&mut self, at: usize, end: usize, keyword: Option<Arc<KeywordDoc>>) {
        let args = at + 1;
        if args >= end {
            return;
        }
        match keyword.as_ref().and_then(|kw| kw.meta_kind()) {
            None => self.stack.push(Frame::Emit {
                at: args,
                end,
                role: TokenRole::Argument,
                keyword,
            }),
            Some(MetaKeywordKind::RunKeyword) => self.stack.push(Frame::Call {
                at: args,
                end,
                inner: true,
            }),
            Some(MetaKeywordKind::WithCondition) => {
                self.stack.push(Frame::Call {
                    at: args + 1,
                    end,
                    inner: true,
                });
                self.stack.push(Frame::Emit {
                    at: args,
                    end: args + 1,
                    role: TokenRole::Condition,
                    keyword,
                });
            }
            Some(MetaKeywordKind::RunKeywords) => self.stack.push(Frame::Keywords {
                at: args,
                end,
                separated: false,
            }),
            Some(MetaKeywordKind::RunKeywordIf) => self.stack.push(Frame::Branches {
                at: args,
                end,
                next: Branch::Condition,
            }),
        }
    }

    fn step(&mut self, frame: Frame) -> Option<ClassifiedToken> {
        match frame {
            Frame::Emit {
                at,
                end,
                role,
                keyword,
            } => {
                if at >= end {
                    return None;
                }
                if at + 1 < end {
                    self.stack.push(Frame::Emit {
                        at: at + 1,
                        end,
                        role,
                        keyword: keyword.clone(),
                    });
                }
                Some(self.emit(at, role, keyword))
            }
            Frame::Call { at, end, inner } => {
                if at >= end {
                    return None;
                }
                let (keyword, error) = match self.lookup(&self.tokens[at], inner) {
                    Ok(keyword) => (keyword, None),
                    Err(error) => (None, Some(error)),
                };
                self.expand(at, end, keyword.clone());
                let role = if inner {
                    TokenRole::InnerKeyword
                } else {
                    TokenRole::Keyword
                };
                Some(ClassifiedToken {
                    error,
                    ..self.emit(at, role, keyword)
                })
            }
            Frame::Keywords { at, end, separated } => {
                if at >= end {
                    return None;
                }
                if self.value(at) == AND {
                    self.stack.push(Frame::Keywords {
                        at: at + 1,
                        end,
                        separated: true,
                    });
                    return Some(self.emit(at, TokenRole::ControlFlow, None));
                }
                // without any AND every argument is a keyword of its own
                let next_and = self.find_control(at + 1, end, &[AND]);
                let call_end = match next_and {
                    Some(idx) => idx,
                    None if separated => end,
                    None => at + 1,
                };
                self.stack.push(Frame::Keywords {
                    at: call_end,
                    end,
                    separated: separated || next_and.is_some(),
                });
                self.stack.push(Frame::Call {
                    at,
                    end: call_end,
                    inner: true,
                });
                None
            }
            Frame::Branches { at, end, next } => {
                if at >= end {
                    return None;
                }
                match next {
                    Branch::Condition => {
                        self.stack.push(Frame::Branches {
                            at: at + 1,
                            end,
                            next: Branch::Keyword,
                        });
                        Some(self.emit(at, TokenRole::Condition, None))
                    }
                    Branch::Keyword if [ELSE, ELSE_IF].contains(&self.value(at)) => {
                        // branch without a keyword
                        self.stack.push(Frame::Branches {
                            at,
                            end,
                            next: Branch::Separator,
                        });
                        None
                    }
                    Branch::Keyword => {
                        let nested = self
                            .lookup(&self.tokens[at], true)
                            .ok()
                            .flatten()
                            .and_then(|kw| kw.meta_kind())
                            == Some(MetaKeywordKind::RunKeywordIf);
                        // a nested `Run Keyword If` owns the remaining branches
                        let call_end = if nested {
                            end
                        } else {
                            self.find_control(at + 1, end, &[ELSE, ELSE_IF]).unwrap_or(end)
                        };
                        self.stack.push(Frame::Branches {
                            at: call_end,
                            end,
                            next: Branch::Separator,
                        });
                        self.stack.push(Frame::Call {
                            at,
                            end: call_end,
                            inner: true,
                        });
                        None
                    }
                    Branch::Separator => {
                        let next = if self.value(at) == ELSE_IF {
                            Branch::Condition
                        } else {
                            Branch::Keyword
                        };
                        self.stack.push(Frame::Branches {
                            at: at + 1,
                            end,
                            next,
                        });
                        Some(self.emit(at, TokenRole::ControlFlow, None))
                    }
                }
            }
        }
    }
}

impl Iterator for CallChainWalker<'_> {
    type Item = Result<ClassifiedToken, Cancelled>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            self.done = true;
            self.stack.clear();
            return Some(Err(Cancelled));
        }
        while let Some(frame) = self.stack.pop() {
            if let Some(classified) = self.step(frame) {
                return Some(Ok(classified));
            }
        }
        self.done = true;
        None
    }
}

impl std::iter::FusedIterator for CallChainWalker<'_> {}

/// The call token (outer or inner) under a position, if any.
pub fn call_at(
    namespace: &Namespace,
    statement: &Statement,
    line: usize,
    column: usize,
) -> Option<ClassifiedToken> {
    let pos = crate::utf16::CharPosition::new(line, column);
    CallChainWalker::new(namespace, statement)
        .filter_map(Result::ok)
        .find(|classified| classified.is_call() && classified.token.contains(pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::StatementKind;
    use crate::test_utils::{build_namespace, parse};

    const SUITE: &str = "*** Keywords ***\nInner A\n    No Operation\nInner B\n    No Operation\n";

    /// Classify the first keyword call in `body` (a keyword body line).
    fn classify(body: &str) -> Vec<(String, TokenRole)> {
        let text = format!("{SUITE}Outer\n{body}\n");
        let ns = build_namespace(&text);
        let model = parse(&text);
        let statement = model
            .statements
            .iter()
            .rev()
            .find(|s| s.kind == StatementKind::KeywordCall)
            .unwrap();
        CallChainWalker::new(&ns, statement)
            .classify()
            .unwrap()
            .into_iter()
            .map(|c| (c.token.value, c.role))
            .collect()
    }

    fn pairs(expected: &[(&str, TokenRole)]) -> Vec<(String, TokenRole)> {
        expected.iter().map(|(v, r)| (v.to_string(), *r)).collect()
    }

    use TokenRole::*;

    #[test]
    fn test_plain_call() {
        assert_eq!(
            classify("    ${x} =    Log    hello    WARN"),
            pairs(&[("${x} =", Leading), ("Log", Keyword), ("hello", Argument), ("WARN", Argument)])
        );
    }

    #[test]
    fn test_run_keyword_if_else() {
        assert_eq!(
            classify("    Run Keyword If    ${cond}    Inner A    ELSE    Inner B"),
            pairs(&[
                ("Run Keyword If", Keyword),
                ("${cond}", Condition),
                ("Inner A", InnerKeyword),
                ("ELSE", ControlFlow),
                ("Inner B", InnerKeyword),
            ])
        );
    }

    #[test]
    fn test_run_keyword_if_unresolved_branches() {
        assert_eq!(
            classify("    Run Keyword If    $x    Nope    1    ELSE IF    $y    Missing    ELSE    Gone    2"),
            pairs(&[
                ("Run Keyword If", Keyword),
                ("$x", Condition),
                ("Nope", InnerKeyword),
                ("1", Argument),
                ("ELSE IF", ControlFlow),
                ("$y", Condition),
                ("Missing", InnerKeyword),
                ("ELSE", ControlFlow),
                ("Gone", InnerKeyword),
                ("2", Argument),
            ])
        );
    }

    #[test]
    fn test_nested_run_keyword_if_owns_remaining_branches() {
        assert_eq!(
            classify("    Run Keyword If    $a    Run Keyword If    $b    Inner A    ELSE    Inner B"),
            pairs(&[
                ("Run Keyword If", Keyword),
                ("$a", Condition),
                ("Run Keyword If", InnerKeyword),
                ("$b", Condition),
                ("Inner A", InnerKeyword),
                ("ELSE", ControlFlow),
                ("Inner B", InnerKeyword),
            ])
        );
    }

    #[test]
    fn test_run_keyword_chain() {
        assert_eq!(
            classify("    Run Keyword And Ignore Error    Run Keyword    Log    message"),
            pairs(&[
                ("Run Keyword And Ignore Error", Keyword),
                ("Run Keyword", InnerKeyword),
                ("Log", InnerKeyword),
                ("message", Argument),
            ])
        );
    }

    #[test]
    fn test_run_keyword_with_condition() {
        assert_eq!(
            classify("    Run Keyword Unless    ${done}    Inner A    arg"),
            pairs(&[
                ("Run Keyword Unless", Keyword),
                ("${done}", Condition),
                ("Inner A", InnerKeyword),
                ("arg", Argument),
            ])
        );
    }

    #[test]
    fn test_run_keywords_with_and() {
        assert_eq!(
            classify("    Run Keywords    Inner A    AND    Log    one    two    AND    Inner B"),
            pairs(&[
                ("Run Keywords", Keyword),
                ("Inner A", InnerKeyword),
                ("AND", ControlFlow),
                ("Log", InnerKeyword),
                ("one", Argument),
                ("two", Argument),
                ("AND", ControlFlow),
                ("Inner B", InnerKeyword),
            ])
        );
    }

    #[test]
    fn test_run_keywords_without_and() {
        assert_eq!(
            classify("    Run Keywords    Inner A    Inner B    No Operation"),
            pairs(&[
                ("Run Keywords", Keyword),
                ("Inner A", InnerKeyword),
                ("Inner B", InnerKeyword),
                ("No Operation", InnerKeyword),
            ])
        );
    }

    #[test]
    fn test_meta_keyword_expansion() {
        let cases: &[(&str, &[(&str, TokenRole)])] = &[
            (
                "    Run Keywords    Inner A    AND    Inner B",
                &[("Run Keywords", Keyword), ("Inner A", InnerKeyword), ("AND", ControlFlow), ("Inner B", InnerKeyword)],
            ),
            (
                "    Run Keywords    Inner A    Inner B",
                &[("Run Keywords", Keyword), ("Inner A", InnerKeyword), ("Inner B", InnerKeyword)],
            ),
            (
                "    Run Keyword If    $c    Inner A    ELSE    Inner B",
                &[
                    ("Run Keyword If", Keyword),
                    ("$c", Condition),
                    ("Inner A", InnerKeyword),
                    ("ELSE", ControlFlow),
                    ("Inner B", InnerKeyword),
                ],
            ),
            (
                "    Run Keyword If    $a    Inner A    x    ELSE IF    $b    Inner B    ELSE    Log    y",
                &[
                    ("Run Keyword If", Keyword),
                    ("$a", Condition),
                    ("Inner A", InnerKeyword),
                    ("x", Argument),
                    ("ELSE IF", ControlFlow),
                    ("$b", Condition),
                    ("Inner B", InnerKeyword),
                    ("ELSE", ControlFlow),
                    ("Log", InnerKeyword),
                    ("y", Argument),
                ],
            ),
            (
                "    Run Keyword If    $a    ELSE    Inner B",
                &[
                    ("Run Keyword If", Keyword),
                    ("$a", Condition),
                    ("ELSE", ControlFlow),
                    ("Inner B", InnerKeyword),
                ],
            ),
            (
                "    Run Keywords    Given Inner A    AND    Then Inner B    arg",
                &[
                    ("Run Keywords", Keyword),
                    ("Given Inner A", InnerKeyword),
                    ("AND", ControlFlow),
                    ("Then Inner B", InnerKeyword),
                    ("arg", Argument),
                ],
            ),
            (
                "    Run Keyword And Expect Error    *boom*    Run Keywords    Inner A    AND    Inner B",
                &[
                    ("Run Keyword And Expect Error", Keyword),
                    ("*boom*", Condition),
                    ("Run Keywords", InnerKeyword),
                    ("Inner A", InnerKeyword),
                    ("AND", ControlFlow),
                    ("Inner B", InnerKeyword),
                ],
            ),
        ];
        for (body, expected) in cases {
            assert_eq!(classify(body), pairs(expected), "classifying {body:?}");
        }
    }

    #[test]
    fn test_bdd_prefixed_inner_names_resolve() {
        let text = format!("{SUITE}Outer\n    Run Keyword    When Inner B\n");
        let ns = build_namespace(&text);
        let model = parse(&text);
        let statement = model.statements.iter().rev().find(|s| s.kind == StatementKind::KeywordCall).unwrap();
        let out = CallChainWalker::new(&ns, statement).classify().unwrap();
        assert_eq!(out[1].role, InnerKeyword);
        assert_eq!(out[1].keyword.as_ref().unwrap().name, "Inner B");
    }

    #[test]
    fn test_unknown_namespace_is_recorded_on_the_call() {
        let text = format!("{SUITE}Outer\n    Run Keyword    Nowhere.Log    hi\n    Missing Keyword\n");
        let ns = build_namespace(&text);
        let model = parse(&text);
        let calls: Vec<_> = model
            .statements
            .iter()
            .filter(|s| s.kind == StatementKind::KeywordCall)
            .flat_map(|s| CallChainWalker::new(&ns, s).classify().unwrap())
            .filter(ClassifiedToken::is_call)
            .collect();

        let inner = calls.iter().find(|c| c.token.value == "Nowhere.Log").unwrap();
        assert!(inner.keyword.is_none());
        assert_eq!(inner.error, Some(ResolveError::UnknownNamespace("Nowhere".to_string())));

        let missing = calls.iter().find(|c| c.token.value == "Missing Keyword").unwrap();
        assert!(missing.keyword.is_none());
        assert!(missing.error.is_none());
    }

    #[test]
    fn test_variable_keyword_name_is_a_leaf() {
        let text = format!("{SUITE}Outer\n    Run Keyword    ${{name}}    arg\n");
        let ns = build_namespace(&text);
        let model = parse(&text);
        let statement = model.statements.iter().rev().find(|s| s.kind == StatementKind::KeywordCall).unwrap();
        let out = CallChainWalker::new(&ns, statement).classify().unwrap();
        assert_eq!(out[1].role, InnerKeyword);
        assert!(out[1].keyword.is_none());
        assert_eq!(out[2].role, Argument);
    }

    #[test]
    fn test_escaped_inner_name_is_unescaped() {
        let text = "*** Keywords ***\nSay #1\n    No Operation\nOuter\n    Run Keyword    Say \\#1\n";
        let ns = build_namespace(text);
        let model = parse(text);
        let statement = model.statements.iter().rev().find(|s| s.kind == StatementKind::KeywordCall).unwrap();
        let out = CallChainWalker::new(&ns, statement).classify().unwrap();
        assert_eq!(out[1].keyword.as_ref().unwrap().name, "Say #1");
    }

    #[test]
    fn test_cancellation_stops_the_walk() {
        let text = format!("{SUITE}Outer\n    Run Keywords    Inner A    AND    Inner B\n");
        let ns = build_namespace(&text);
        let model = parse(&text);
        let statement = model.statements.iter().rev().find(|s| s.kind == StatementKind::KeywordCall).unwrap();

        let cancel = CancellationToken::new();
        let mut walker = CallChainWalker::new(&ns, statement).with_cancellation(cancel.clone());
        assert!(matches!(walker.next(), Some(Ok(_))));
        cancel.cancel();
        assert!(matches!(walker.next(), Some(Err(Cancelled))));
        assert!(walker.next().is_none());

        let cancelled = CallChainWalker::new(&ns, statement).with_cancellation(cancel);
        assert!(cancelled.classify().is_err());
    }

    #[test]
    fn test_call_at_finds_inner_keyword() {
        let text = format!("{SUITE}Outer\n    Run Keyword    Inner B\n");
        let ns = build_namespace(&text);
        let model = parse(&text);
        let statement = model.statements.iter().rev().find(|s| s.kind == StatementKind::KeywordCall).unwrap();
        let line = statement.first_line();
        let found = call_at(&ns, statement, line, 22).unwrap();
        assert_eq!(found.role, InnerKeyword);
        assert_eq!(found.keyword.unwrap().name, "Inner B");
    }
}
