//
// syntax/mod.rs
//
// Statement and token model consumed by the resolution engine, plus the
// parser seam that produces it
//

pub mod parser;
pub mod variables;

pub use parser::SpaceSeparatedParser;

use crate::utf16::{CharPosition, CharRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    SettingHeader,
    VariableHeader,
    TestCaseHeader,
    KeywordHeader,
    CommentHeader,

    /// A setting name such as `Documentation` or `[Tags]`.
    Setting,
    /// `Library`, `Resource` or `Variables`.
    Import,
    /// `AS` / `WITH NAME` inside a library import.
    WithName,
    /// Import name, or the alias after `AS`.
    Name,
    Alias,

    TestCaseName,
    KeywordName,
    Variable,
    Assign,
    Keyword,
    Argument,

    /// `FOR`, `IF`, `ELSE IF`, `ELSE`, `END`, `RETURN`, `WHILE`, ...
    Control,
    /// `IN`, `IN RANGE`, `IN ENUMERATE`, `IN ZIP`.
    ForSeparator,

    Comment,
    Separator,
    Continuation,
    Eol,
    Error,
}

impl TokenKind {
    /// Tokens that carry no data of the statement.
    pub fn is_non_data(self) -> bool {
        matches!(
            self,
            TokenKind::Separator | TokenKind::Eol | TokenKind::Continuation | TokenKind::Comment
        )
    }

    pub fn is_header(self) -> bool {
        matches!(
            self,
            TokenKind::SettingHeader
                | TokenKind::VariableHeader
                | TokenKind::TestCaseHeader
                | TokenKind::KeywordHeader
                | TokenKind::CommentHeader
        )
    }

    /// Token kinds whose value may contain `${var}` style references.
    pub fn allows_variables(self) -> bool {
        matches!(
            self,
            TokenKind::Name
                | TokenKind::Alias
                | TokenKind::Argument
                | TokenKind::Keyword
                | TokenKind::KeywordName
                | TokenKind::TestCaseName
        )
    }
}

/// One lexical token. `line` is zero-based; `col` counts code points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
            col,
        }
    }

    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn end_col(&self) -> usize {
        self.col + self.len()
    }

    pub fn range(&self) -> CharRange {
        CharRange::on_line(self.line, self.col, self.end_col())
    }

    pub fn contains(&self, pos: CharPosition) -> bool {
        pos.line == self.line && self.col <= pos.column && pos.column <= self.end_col()
    }

    /// Same token reinterpreted as another kind.
    pub fn with_kind(&self, kind: TokenKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// Content before the first section header.
    Implicit,
    Settings,
    Variables,
    TestCases,
    Keywords,
    Comments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    SectionHeader,
    LibraryImport,
    ResourceImport,
    VariablesImport,
    /// Suite, test or keyword setup/teardown.
    Fixture,
    Template,
    Documentation,
    Setting,
    VariableDefinition,
    TestCaseName,
    KeywordName,
    Arguments,
    KeywordCall,
    ForHeader,
    Control,
    Comment,
    EmptyLine,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub section: SectionKind,
    pub tokens: Vec<Token>,
}

impl Statement {
    pub fn get_token(&self, kind: TokenKind) -> Option<&Token> {
        self.tokens.iter().find(|t| t.kind == kind)
    }

    pub fn get_tokens(&self, kind: TokenKind) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(move |t| t.kind == kind)
    }

    pub fn data_tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| !t.kind.is_non_data())
    }

    pub fn first_line(&self) -> usize {
        self.tokens.first().map_or(0, |t| t.line)
    }

    pub fn last_line(&self) -> usize {
        self.tokens.last().map_or(0, |t| t.line)
    }

    pub fn range(&self) -> CharRange {
        match (self.tokens.first(), self.tokens.last()) {
            (Some(first), Some(last)) => CharRange::new(
                CharPosition::new(first.line, first.col),
                CharPosition::new(last.line, last.end_col()),
            ),
            _ => CharRange::default(),
        }
    }

    /// The data token under `pos`, if any.
    pub fn token_at(&self, pos: CharPosition) -> Option<&Token> {
        self.tokens
            .iter()
            .filter(|t| !t.kind.is_non_data() || t.kind == TokenKind::Comment)
            .find(|t| t.contains(pos))
    }

    pub fn import_name(&self) -> Option<&Token> {
        self.get_token(TokenKind::Name)
    }

    /// Import arguments, up to `AS`/`WITH NAME`.
    pub fn import_args(&self) -> Vec<String> {
        self.tokens
            .iter()
            .take_while(|t| t.kind != TokenKind::WithName)
            .filter(|t| t.kind == TokenKind::Argument)
            .map(|t| t.value.clone())
            .collect()
    }

    pub fn alias(&self) -> Option<&Token> {
        self.get_token(TokenKind::Alias)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    TestCase,
    Keyword,
}

/// A test case or keyword definition: its name statement and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Index of the name statement in [`Model::statements`].
    pub header: usize,
    /// Statement indices of the body, exclusive of the header.
    pub body: std::ops::Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    pub statements: Vec<Statement>,
    pub blocks: Vec<Block>,
}

impl Model {
    pub fn statements_of(&self, block: &Block) -> &[Statement] {
        &self.statements[block.body.clone()]
    }

    pub fn block_name<'a>(&'a self, block: &Block) -> Option<&'a Token> {
        let kind = match block.kind {
            BlockKind::TestCase => TokenKind::TestCaseName,
            BlockKind::Keyword => TokenKind::KeywordName,
        };
        self.statements.get(block.header)?.get_token(kind)
    }

    pub fn keyword_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| b.kind == BlockKind::Keyword)
    }

    pub fn imports(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter().filter(|s| {
            matches!(
                s.kind,
                StatementKind::LibraryImport
                    | StatementKind::ResourceImport
                    | StatementKind::VariablesImport
            )
        })
    }

    /// The statement spanning `line`.
    pub fn statement_at_line(&self, line: usize) -> Option<&Statement> {
        self.statements
            .iter()
            .find(|s| s.first_line() <= line && line <= s.last_line())
    }

    /// The section that `line` belongs to.
    pub fn section_at_line(&self, line: usize) -> SectionKind {
        self.statements
            .iter()
            .take_while(|s| s.first_line() <= line)
            .last()
            .map_or(SectionKind::Implicit, |s| s.section)
    }

    /// Last non-blank line of the `*** Keywords ***` section, if present.
    pub fn keyword_section_end(&self) -> Option<usize> {
        self.statements
            .iter()
            .filter(|s| s.section == SectionKind::Keywords && s.kind != StatementKind::EmptyLine)
            .map(Statement::last_line)
            .max()
    }
}

/// Turns document text into a [`Model`].
pub trait DocumentParser: Send + Sync {
    fn parse(&self, text: &str) -> Model;
}
