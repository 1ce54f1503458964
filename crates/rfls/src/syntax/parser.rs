//
// syntax/parser.rs
//
// Parser for the space separated test data format
//
// Cells are separated by two or more spaces or by a tab. A line starting
// with `...` continues the previous statement.
//

use super::variables::{is_assign, is_variable};
use super::{
    Block, BlockKind, DocumentParser, Model, SectionKind, Statement, StatementKind, Token, TokenKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PieceKind {
    Separator,
    Data,
    Comment,
}

#[derive(Debug, Clone)]
struct Piece {
    kind: PieceKind,
    col: usize,
    text: String,
}

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\u{a0}'
}

/// Split one physical line into separators, data cells and a trailing comment.
fn split_line(line: &str) -> Vec<Piece> {
    let chars: Vec<char> = line.chars().collect();
    let n = chars.len();
    let run_end = |mut i: usize| {
        while i < n && is_space(chars[i]) {
            i += 1;
        }
        i
    };

    let mut pieces = Vec::new();
    let mut i = 0;
    while i < n {
        if is_space(chars[i]) {
            let j = run_end(i);
            pieces.push(Piece {
                kind: PieceKind::Separator,
                col: i,
                text: chars[i..j].iter().collect(),
            });
            i = j;
            continue;
        }

        let start = i;
        if chars[i] == '#' {
            let mut end = n;
            while end > start && is_space(chars[end - 1]) {
                end -= 1;
            }
            pieces.push(Piece {
                kind: PieceKind::Comment,
                col: start,
                text: chars[start..end].iter().collect(),
            });
            if end < n {
                pieces.push(Piece {
                    kind: PieceKind::Separator,
                    col: end,
                    text: chars[end..].iter().collect(),
                });
            }
            break;
        }

        loop {
            while i < n && !is_space(chars[i]) {
                i += 1;
            }
            if i >= n {
                break;
            }
            let j = run_end(i);
            let is_separator = j == n || j - i >= 2 || chars[i..j].contains(&'\t');
            if is_separator {
                break;
            }
            i = j;
        }
        pieces.push(Piece {
            kind: PieceKind::Data,
            col: start,
            text: chars[start..i].iter().collect(),
        });
    }
    pieces
}

/// Physical line split into pieces, with its line number and break.
#[derive(Debug, Clone)]
struct Line {
    number: usize,
    pieces: Vec<Piece>,
    eol: &'static str,
    len: usize,
}

impl Line {
    fn data(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.iter().filter(|p| p.kind == PieceKind::Data)
    }

    fn first_data(&self) -> Option<&Piece> {
        self.data().next()
    }

    fn is_continuation(&self) -> bool {
        self.first_data().is_some_and(|p| p.text == "...")
    }

    fn starts_at_column_zero(&self) -> bool {
        self.pieces
            .first()
            .is_some_and(|p| p.kind == PieceKind::Data && p.col == 0)
    }
}

/// A statement before its cells are classified.
#[derive(Debug, Clone)]
struct Pending {
    kind: PendingKind,
    section: SectionKind,
    lines: Vec<Line>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Header(SectionKind),
    UnknownHeader,
    Empty,
    Comment,
    Setting,
    Variable,
    BlockName,
    Body,
}

impl PendingKind {
    fn continuable(self) -> bool {
        matches!(
            self,
            PendingKind::Setting | PendingKind::Variable | PendingKind::Body
        )
    }
}

fn section_for_header(cell: &str) -> Option<SectionKind> {
    let name = cell.trim_matches(|c: char| c == '*' || c.is_whitespace()).to_lowercase();
    match name.as_str() {
        "settings" | "setting" => Some(SectionKind::Settings),
        "variables" | "variable" => Some(SectionKind::Variables),
        "test cases" | "test case" | "tasks" | "task" => Some(SectionKind::TestCases),
        "keywords" | "keyword" => Some(SectionKind::Keywords),
        "comments" | "comment" => Some(SectionKind::Comments),
        _ => None,
    }
}

fn header_token_kind(section: SectionKind) -> TokenKind {
    match section {
        SectionKind::Settings => TokenKind::SettingHeader,
        SectionKind::Variables => TokenKind::VariableHeader,
        SectionKind::TestCases => TokenKind::TestCaseHeader,
        SectionKind::Keywords => TokenKind::KeywordHeader,
        SectionKind::Comments | SectionKind::Implicit => TokenKind::CommentHeader,
    }
}

const CONTROL_WORDS: &[&str] = &[
    "IF", "ELSE IF", "ELSE", "END", "WHILE", "TRY", "EXCEPT", "FINALLY", "BREAK", "CONTINUE",
    "RETURN",
];

const FOR_SEPARATORS: &[&str] = &["IN", "IN RANGE", "IN ENUMERATE", "IN ZIP"];

fn normalize_setting(name: &str) -> String {
    name.trim_end_matches(':')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Classify the data cells of a statement in the `*** Settings ***` section.
fn classify_setting(cells: &[&str]) -> (StatementKind, Vec<TokenKind>) {
    let mut kinds = Vec::with_capacity(cells.len());
    let Some(first) = cells.first() else {
        return (StatementKind::Error, kinds);
    };
    let rest = cells.len() - 1;
    let statement = match normalize_setting(first).as_str() {
        "library" => {
            kinds.push(TokenKind::Import);
            let mut alias_next = false;
            let mut after_alias = false;
            for (idx, cell) in cells.iter().enumerate().skip(1) {
                let kind = if idx == 1 {
                    TokenKind::Name
                } else if alias_next {
                    alias_next = false;
                    after_alias = true;
                    TokenKind::Alias
                } else if !after_alias && (*cell == "AS" || *cell == "WITH NAME") {
                    alias_next = true;
                    TokenKind::WithName
                } else if after_alias {
                    TokenKind::Error
                } else {
                    TokenKind::Argument
                };
                kinds.push(kind);
            }
            return (StatementKind::LibraryImport, kinds);
        }
        "resource" => {
            kinds.push(TokenKind::Import);
            kinds.extend((0..rest).map(|i| if i == 0 { TokenKind::Name } else { TokenKind::Error }));
            return (StatementKind::ResourceImport, kinds);
        }
        "variables" => {
            kinds.push(TokenKind::Import);
            kinds.extend((0..rest).map(|i| if i == 0 { TokenKind::Name } else { TokenKind::Argument }));
            return (StatementKind::VariablesImport, kinds);
        }
        "documentation" => StatementKind::Documentation,
        "suite setup" | "suite teardown" | "test setup" | "test teardown" | "task setup"
        | "task teardown" => StatementKind::Fixture,
        "test template" | "task template" => StatementKind::Template,
        "metadata" | "force tags" | "default tags" | "test tags" | "task tags" | "keyword tags"
        | "test timeout" | "task timeout" | "suite name" => StatementKind::Setting,
        _ => {
            kinds.extend(std::iter::repeat(TokenKind::Error).take(cells.len()));
            return (StatementKind::Error, kinds);
        }
    };
    kinds.push(TokenKind::Setting);
    push_setting_values(statement, &cells[1..], &mut kinds);
    (statement, kinds)
}

/// Kinds for the values following a fixture, template or plain setting name.
fn push_setting_values(statement: StatementKind, values: &[&str], kinds: &mut Vec<TokenKind>) {
    for (idx, value) in values.iter().enumerate() {
        let kind = match statement {
            StatementKind::Fixture | StatementKind::Template
                if idx == 0 && !value.eq_ignore_ascii_case("NONE") =>
            {
                TokenKind::Keyword
            }
            _ => TokenKind::Argument,
        };
        kinds.push(kind);
    }
}

/// Classify the data cells of a statement inside a test case or keyword.
fn classify_body(cells: &[&str]) -> (StatementKind, Vec<TokenKind>) {
    let mut kinds = Vec::with_capacity(cells.len());
    let Some(first) = cells.first() else {
        return (StatementKind::EmptyLine, kinds);
    };

    if first.starts_with('[') && first.ends_with(']') {
        let statement = match normalize_setting(&first[1..first.len() - 1]).as_str() {
            "documentation" => StatementKind::Documentation,
            "arguments" => StatementKind::Arguments,
            "setup" | "teardown" => StatementKind::Fixture,
            "template" => StatementKind::Template,
            "tags" | "timeout" | "return" => StatementKind::Setting,
            _ => StatementKind::Error,
        };
        kinds.push(if statement == StatementKind::Error {
            TokenKind::Error
        } else {
            TokenKind::Setting
        });
        push_setting_values(statement, &cells[1..], &mut kinds);
        return (statement, kinds);
    }

    if *first == "FOR" {
        kinds.push(TokenKind::Control);
        let mut seen_separator = false;
        for cell in &cells[1..] {
            let kind = if seen_separator {
                TokenKind::Argument
            } else if FOR_SEPARATORS.contains(cell) {
                seen_separator = true;
                TokenKind::ForSeparator
            } else {
                TokenKind::Variable
            };
            kinds.push(kind);
        }
        return (StatementKind::ForHeader, kinds);
    }

    if CONTROL_WORDS.contains(first) {
        kinds.push(TokenKind::Control);
        kinds.extend(std::iter::repeat(TokenKind::Argument).take(cells.len() - 1));
        return (StatementKind::Control, kinds);
    }

    let mut idx = 0;
    while idx + 1 < cells.len() && is_assign(cells[idx]) {
        kinds.push(TokenKind::Assign);
        idx += 1;
    }
    if idx + 1 == cells.len() && is_assign(cells[idx]) && cells[idx].ends_with('=') {
        // nothing to call
        kinds.push(TokenKind::Assign);
        return (StatementKind::Error, kinds);
    }
    kinds.push(TokenKind::Keyword);
    kinds.extend(std::iter::repeat(TokenKind::Argument).take(cells.len() - idx - 1));
    (StatementKind::KeywordCall, kinds)
}

fn classify_variable(cells: &[&str]) -> (StatementKind, Vec<TokenKind>) {
    let mut kinds = Vec::with_capacity(cells.len());
    let Some(first) = cells.first() else {
        return (StatementKind::EmptyLine, kinds);
    };
    let name = first.trim_end_matches('=').trim_end();
    if !is_variable(name) {
        kinds.extend(std::iter::repeat(TokenKind::Error).take(cells.len()));
        return (StatementKind::Error, kinds);
    }
    kinds.push(TokenKind::Variable);
    kinds.extend(std::iter::repeat(TokenKind::Argument).take(cells.len() - 1));
    (StatementKind::VariableDefinition, kinds)
}

/// Build tokens for a pending statement, given kinds for its data cells.
fn build_tokens(pending: &Pending, data_kinds: &[TokenKind], header_kind: Option<TokenKind>) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut data_idx = 0;
    for line in &pending.lines {
        let continuation = line.is_continuation();
        let mut continuation_seen = false;
        for piece in &line.pieces {
            let kind = match piece.kind {
                PieceKind::Separator => TokenKind::Separator,
                PieceKind::Comment => TokenKind::Comment,
                PieceKind::Data if continuation && !continuation_seen => {
                    continuation_seen = true;
                    TokenKind::Continuation
                }
                PieceKind::Data => {
                    let kind = header_kind
                        .or_else(|| data_kinds.get(data_idx).copied())
                        .unwrap_or(TokenKind::Error);
                    data_idx += 1;
                    kind
                }
            };
            tokens.push(Token::new(kind, piece.text.clone(), line.number, piece.col));
        }
        tokens.push(Token::new(TokenKind::Eol, line.eol, line.number, line.len));
    }
    tokens
}

fn finish(pending: Pending) -> Statement {
    let cells: Vec<&str> = pending
        .lines
        .iter()
        .flat_map(|line| {
            let skip = usize::from(line.is_continuation());
            line.data().skip(skip).map(|p| p.text.as_str())
        })
        .collect();

    let (kind, data_kinds, header_kind) = match pending.kind {
        PendingKind::Header(section) => (
            StatementKind::SectionHeader,
            Vec::new(),
            Some(header_token_kind(section)),
        ),
        PendingKind::UnknownHeader => (StatementKind::Error, Vec::new(), Some(TokenKind::Error)),
        PendingKind::Empty => (StatementKind::EmptyLine, Vec::new(), None),
        PendingKind::Comment => (StatementKind::Comment, Vec::new(), Some(TokenKind::Comment)),
        PendingKind::BlockName => {
            let (kind, token) = if pending.section == SectionKind::Keywords {
                (StatementKind::KeywordName, TokenKind::KeywordName)
            } else {
                (StatementKind::TestCaseName, TokenKind::TestCaseName)
            };
            (kind, vec![token], None)
        }
        PendingKind::Setting => {
            let (kind, kinds) = classify_setting(&cells);
            (kind, kinds, None)
        }
        PendingKind::Variable => {
            let (kind, kinds) = classify_variable(&cells);
            (kind, kinds, None)
        }
        PendingKind::Body => {
            let (kind, kinds) = classify_body(&cells);
            (kind, kinds, None)
        }
    };

    let mut tokens = build_tokens(&pending, &data_kinds, header_kind);
    if let PendingKind::Header(_) = pending.kind {
        // only the first cell names the section
        let mut first = true;
        for token in tokens.iter_mut().filter(|t| !t.kind.is_non_data()) {
            if !first {
                token.kind = TokenKind::Comment;
            }
            first = false;
        }
    }

    Statement {
        kind,
        section: pending.section,
        tokens,
    }
}

/// The default parser for `.robot` and `.resource` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaceSeparatedParser;

impl SpaceSeparatedParser {
    pub fn new() -> Self {
        Self
    }

    fn lines(text: &str) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut rest = text;
        let mut number = 0;
        loop {
            let (content, eol, next) = match rest.find('\n') {
                Some(idx) => (&rest[..idx], "\n", Some(&rest[idx + 1..])),
                None => (rest, "", None),
            };
            if next.is_none() && content.is_empty() && number > 0 {
                break;
            }
            lines.push(Line {
                number,
                pieces: split_line(content),
                eol,
                len: content.chars().count(),
            });
            number += 1;
            match next {
                Some(next) => rest = next,
                None => break,
            }
        }
        lines
    }
}

impl DocumentParser for SpaceSeparatedParser {
    fn parse(&self, text: &str) -> Model {
        let mut pending: Vec<Pending> = Vec::new();
        let mut section = SectionKind::Implicit;

        for line in Self::lines(text) {
            let Some(first) = line.pieces.iter().find(|p| p.kind != PieceKind::Separator) else {
                pending.push(Pending {
                    kind: PendingKind::Empty,
                    section,
                    lines: vec![line],
                });
                continue;
            };

            if first.kind == PieceKind::Data && first.col == 0 && first.text.starts_with('*') {
                let kind = match section_for_header(&first.text) {
                    Some(new_section) => {
                        section = new_section;
                        PendingKind::Header(new_section)
                    }
                    None => PendingKind::UnknownHeader,
                };
                pending.push(Pending {
                    kind,
                    section,
                    lines: vec![line],
                });
                continue;
            }

            if first.kind == PieceKind::Comment
                || matches!(section, SectionKind::Implicit | SectionKind::Comments)
            {
                pending.push(Pending {
                    kind: PendingKind::Comment,
                    section,
                    lines: vec![line],
                });
                continue;
            }

            if line.is_continuation() {
                if let Some(last) = pending.last_mut().filter(|p| p.kind.continuable()) {
                    last.lines.push(line);
                    continue;
                }
            }

            match section {
                SectionKind::Settings => pending.push(Pending {
                    kind: PendingKind::Setting,
                    section,
                    lines: vec![line],
                }),
                SectionKind::Variables => pending.push(Pending {
                    kind: PendingKind::Variable,
                    section,
                    lines: vec![line],
                }),
                SectionKind::TestCases | SectionKind::Keywords => {
                    if line.starts_at_column_zero() && !line.is_continuation() {
                        // `Name    Keyword    arg` puts the first body statement on the name line
                        let split = line
                            .pieces
                            .iter()
                            .skip(1)
                            .position(|p| p.kind != PieceKind::Separator)
                            .map(|idx| idx + 1);
                        match split.filter(|_| line.data().count() > 1) {
                            Some(idx) => {
                                let name_line = Line {
                                    pieces: line.pieces[..idx].to_vec(),
                                    ..line.clone()
                                };
                                let body_line = Line {
                                    pieces: line.pieces[idx..].to_vec(),
                                    ..line
                                };
                                pending.push(Pending {
                                    kind: PendingKind::BlockName,
                                    section,
                                    lines: vec![name_line],
                                });
                                pending.push(Pending {
                                    kind: PendingKind::Body,
                                    section,
                                    lines: vec![body_line],
                                });
                            }
                            None => pending.push(Pending {
                                kind: PendingKind::BlockName,
                                section,
                                lines: vec![line],
                            }),
                        }
                    } else {
                        pending.push(Pending {
                            kind: PendingKind::Body,
                            section,
                            lines: vec![line],
                        });
                    }
                }
                SectionKind::Implicit | SectionKind::Comments => {}
            }
        }

        let statements: Vec<Statement> = pending.into_iter().map(finish).collect();
        let blocks = collect_blocks(&statements);
        Model { statements, blocks }
    }
}

fn collect_blocks(statements: &[Statement]) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    for (idx, statement) in statements.iter().enumerate() {
        let kind = match statement.kind {
            StatementKind::TestCaseName => Some(BlockKind::TestCase),
            StatementKind::KeywordName => Some(BlockKind::Keyword),
            _ => None,
        };
        if kind.is_some() || statement.kind == StatementKind::SectionHeader {
            if let Some(open) = blocks.last_mut() {
                if open.body.end == usize::MAX {
                    open.body.end = idx;
                }
            }
        }
        if let Some(kind) = kind {
            blocks.push(Block {
                kind,
                header: idx,
                body: idx + 1..usize::MAX,
            });
        }
    }
    if let Some(open) = blocks.last_mut() {
        if open.body.end == usize::MAX {
            open.body.end = statements.len();
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Model {
        SpaceSeparatedParser.parse(text)
    }

    fn data(statement: &Statement) -> Vec<(TokenKind, &str)> {
        statement
            .data_tokens()
            .map(|t| (t.kind, t.value.as_str()))
            .collect()
    }

    #[test]
    fn test_split_line_cells() {
        let pieces = split_line("    Log    hello world\targ  # note  ");
        let kinds: Vec<(PieceKind, &str, usize)> = pieces
            .iter()
            .map(|p| (p.kind, p.text.as_str(), p.col))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (PieceKind::Separator, "    ", 0),
                (PieceKind::Data, "Log", 4),
                (PieceKind::Separator, "    ", 7),
                (PieceKind::Data, "hello world", 11),
                (PieceKind::Separator, "\t", 22),
                (PieceKind::Data, "arg", 23),
                (PieceKind::Separator, "  ", 26),
                (PieceKind::Comment, "# note", 28),
                (PieceKind::Separator, "  ", 34),
            ]
        );
    }

    #[test]
    fn test_settings_imports() {
        let model = parse(
            "*** Settings ***\n\
             Library    Collections\n\
             Library    Remote    http://x:8270    AS    Rem\n\
             Resource    common.resource\n\
             Suite Setup    Open Browser    chrome\n",
        );
        let imports: Vec<_> = model.imports().collect();
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].import_name().unwrap().value, "Collections");
        assert_eq!(imports[1].import_args(), vec!["http://x:8270"]);
        assert_eq!(imports[1].alias().unwrap().value, "Rem");
        assert_eq!(imports[2].kind, StatementKind::ResourceImport);

        let fixture = &model.statements[4];
        assert_eq!(fixture.kind, StatementKind::Fixture);
        assert_eq!(
            data(fixture),
            vec![
                (TokenKind::Setting, "Suite Setup"),
                (TokenKind::Keyword, "Open Browser"),
                (TokenKind::Argument, "chrome"),
            ]
        );
    }

    #[test]
    fn test_keyword_section_blocks_and_calls() {
        let model = parse(
            "*** Keywords ***\n\
             My Keyword\n\
             \x20   [Arguments]    ${a}    ${b}=default\n\
             \x20   ${x}    ${y}=    Split    ${a}\n\
             \x20   FOR    ${i}    IN RANGE    3\n\
             \x20       Log    ${i}\n\
             \x20   END\n\
             \n\
             Other\n\
             \x20   No Operation\n",
        );
        assert_eq!(model.blocks.len(), 2);
        let first = &model.blocks[0];
        assert_eq!(model.block_name(first).unwrap().value, "My Keyword");
        let body = model.statements_of(first);
        assert_eq!(body[0].kind, StatementKind::Arguments);
        assert_eq!(
            data(&body[1]),
            vec![
                (TokenKind::Assign, "${x}"),
                (TokenKind::Assign, "${y}="),
                (TokenKind::Keyword, "Split"),
                (TokenKind::Argument, "${a}"),
            ]
        );
        assert_eq!(
            data(&body[2]),
            vec![
                (TokenKind::Control, "FOR"),
                (TokenKind::Variable, "${i}"),
                (TokenKind::ForSeparator, "IN RANGE"),
                (TokenKind::Argument, "3"),
            ]
        );
        assert_eq!(body[4].kind, StatementKind::Control);
        assert_eq!(model.block_name(&model.blocks[1]).unwrap().value, "Other");
    }

    #[test]
    fn test_continuation_joins_statement() {
        let model = parse(
            "*** Test Cases ***\n\
             Case\n\
             \x20   Run Keywords    Log    a\n\
             \x20   ...    AND    Log    b\n",
        );
        let call = &model.statements[2];
        assert_eq!(call.kind, StatementKind::KeywordCall);
        assert_eq!(call.first_line(), 2);
        assert_eq!(call.last_line(), 3);
        assert!(call.get_token(TokenKind::Continuation).is_some());
        let args: Vec<&str> = call
            .get_tokens(TokenKind::Argument)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(args, vec!["Log", "a", "AND", "Log", "b"]);
    }

    #[test]
    fn test_name_line_with_body() {
        let model = parse("*** Test Cases ***\nCase    Log    hi\n");
        assert_eq!(model.statements[1].kind, StatementKind::TestCaseName);
        assert_eq!(
            data(&model.statements[2]),
            vec![(TokenKind::Keyword, "Log"), (TokenKind::Argument, "hi")]
        );
        assert_eq!(model.blocks[0].body, 2..3);
    }

    #[test]
    fn test_comments_and_unknown_header() {
        let model = parse("leading text\n*** Nope ***\n# comment\n*** Comments ***\nfree text\n");
        assert_eq!(model.statements[0].kind, StatementKind::Comment);
        assert_eq!(model.statements[1].kind, StatementKind::Error);
        assert_eq!(model.statements[2].kind, StatementKind::Comment);
        assert_eq!(model.statements[4].kind, StatementKind::Comment);
        assert_eq!(model.section_at_line(4), SectionKind::Comments);
    }
}
