//
// features/completion.rs
//
// Completion of headers, settings, keywords and variables
//

use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionResponse, CompletionTextEdit, Documentation, TextEdit, Url,
};

use super::{AnalyzedDocument, CompletionRequest, FeatureBus, Services};
use crate::bus::HandlerDescriptor;
use crate::classifier::{call_at, TokenRole};
use crate::library_doc::KeywordDoc;
use crate::syntax::{SectionKind, TokenKind};
use crate::utf16::{self, CharPosition, CharRange};
use crate::ROBOT_LANGUAGE_ID;

pub const TRIGGER_CHARACTERS: &[&str] = &["$", "{", ".", "*", "["];

const SECTION_HEADERS: &[&str] = &[
    "*** Settings ***",
    "*** Variables ***",
    "*** Test Cases ***",
    "*** Keywords ***",
    "*** Comments ***",
];

const SUITE_SETTINGS: &[&str] = &[
    "Library",
    "Resource",
    "Variables",
    "Documentation",
    "Metadata",
    "Suite Setup",
    "Suite Teardown",
    "Test Setup",
    "Test Teardown",
    "Test Template",
    "Test Timeout",
    "Test Tags",
    "Force Tags",
    "Default Tags",
    "Keyword Tags",
];

const TEST_SETTINGS: &[&str] = &[
    "[Documentation]",
    "[Tags]",
    "[Setup]",
    "[Teardown]",
    "[Template]",
    "[Timeout]",
];

const KEYWORD_SETTINGS: &[&str] = &[
    "[Documentation]",
    "[Tags]",
    "[Arguments]",
    "[Return]",
    "[Teardown]",
    "[Timeout]",
];

/// Payload carried by keyword items until they are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordItemData {
    pub uri: Url,
    pub name: String,
    pub libname: String,
}

/// The cell around a position on one line, in code points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub start: usize,
    pub end: usize,
    /// Text from the cell start up to the position.
    pub prefix: String,
}

/// Cells are separated by a tab or by two or more spaces.
pub fn cell_at(line: &str, column: usize) -> Cell {
    let chars: Vec<char> = line.chars().collect();
    let column = column.min(chars.len());
    let is_break = |idx: usize| {
        chars[idx] == '\t'
            || (chars[idx] == ' '
                && ((idx > 0 && chars[idx - 1] == ' ') || chars.get(idx + 1) == Some(&' ')))
    };

    let mut start = column;
    while start > 0 && !is_break(start - 1) {
        start -= 1;
    }
    let mut end = column;
    while end < chars.len() && !is_break(end) {
        end += 1;
    }
    Cell {
        start,
        end,
        prefix: chars[start..column].iter().collect(),
    }
}

/// Start of a variable reference opened before `column` and not yet closed.
fn open_variable(line: &str, cell: &Cell, column: usize) -> Option<usize> {
    let chars: Vec<char> = line.chars().collect();
    let column = column.min(chars.len());
    let mut idx = column;
    while idx > cell.start + 1 {
        idx -= 1;
        match chars[idx] {
            '}' => return None,
            '{' if matches!(chars[idx - 1], '$' | '@' | '&' | '%') => return Some(idx - 1),
            _ => {}
        }
    }
    None
}

fn item(label: &str, kind: CompletionItemKind, rope: &ropey::Rope, range: CharRange, order: usize) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(kind),
        sort_text: Some(format!("{order:05}")),
        text_edit: Some(CompletionTextEdit::Edit(TextEdit {
            range: utf16::range_to_wire(rope, range),
            new_text: label.to_string(),
        })),
        ..Default::default()
    }
}

fn fixed_items(labels: &[&str], kind: CompletionItemKind, doc: &AnalyzedDocument, range: CharRange) -> Vec<CompletionItem> {
    labels
        .iter()
        .enumerate()
        .map(|(order, label)| item(label, kind, &doc.snapshot.rope, range, order))
        .collect()
}

fn keyword_item(doc: &AnalyzedDocument, keyword: &KeywordDoc, range: CharRange, order: usize) -> CompletionItem {
    let mut item = item(&keyword.name, CompletionItemKind::FUNCTION, &doc.snapshot.rope, range, order);
    item.detail = Some(keyword.libname.clone());
    item.data = serde_json::to_value(KeywordItemData {
        uri: doc.uri().clone(),
        name: keyword.name.clone(),
        libname: keyword.libname.clone(),
    })
    .ok();
    item
}

fn keyword_items(doc: &AnalyzedDocument, line: usize, cell: &Cell) -> Vec<CompletionItem> {
    let namespace = &doc.namespace;

    if let Some((qualifier, _)) = cell.prefix.rsplit_once('.') {
        if !namespace.owners_named(qualifier).is_empty() {
            let start = cell.start + qualifier.chars().count() + 1;
            let range = CharRange::on_line(line, start, cell.end);
            return namespace
                .keywords_of(qualifier)
                .iter()
                .enumerate()
                .map(|(order, kw)| keyword_item(doc, kw, range, order))
                .collect();
        }
    }

    let range = CharRange::on_line(line, cell.start, cell.end);
    let mut items: Vec<CompletionItem> = namespace
        .keywords()
        .enumerate()
        .map(|(order, (_, kw))| keyword_item(doc, kw, range, order))
        .collect();

    let owners: IndexSet<&str> = namespace
        .libraries()
        .iter()
        .map(|lib| lib.name.as_str())
        .chain(namespace.resources().iter().map(|res| res.name.as_str()))
        .collect();
    let offset = items.len();
    items.extend(
        owners
            .into_iter()
            .enumerate()
            .map(|(order, owner)| item(owner, CompletionItemKind::MODULE, &doc.snapshot.rope, range, offset + order)),
    );
    items
}

fn variable_items(doc: &AnalyzedDocument, line: usize, open: usize, line_text: &str, column: usize) -> Vec<CompletionItem> {
    let chars: Vec<char> = line_text.chars().collect();
    let identifier = chars.get(open).copied().unwrap_or('$');
    let end = if chars.get(column) == Some(&'}') { column + 1 } else { column };
    let range = CharRange::on_line(line, open, end);
    doc.namespace
        .variables()
        .values()
        .enumerate()
        .map(|(order, var)| {
            let label: String = std::iter::once(identifier).chain(var.name.chars().skip(1)).collect();
            let mut item = item(&label, CompletionItemKind::VARIABLE, &doc.snapshot.rope, range, order);
            item.detail = Some(var.value.clone());
            item
        })
        .collect()
}

/// Whether the cell at `cell.start` names a keyword to call.
fn expects_keyword(doc: &AnalyzedDocument, pos: CharPosition, cell: &Cell, line_text: &str) -> bool {
    let at = CharPosition::new(pos.line, cell.start);
    if let Some(statement) = doc.statement_at(pos) {
        if let Some(token) = statement.token_at(at) {
            if token.kind == TokenKind::Keyword {
                return true;
            }
        }
        if let Some(call) = call_at(&doc.namespace, statement, pos.line, cell.start) {
            return call.role == TokenRole::InnerKeyword || call.role == TokenRole::Keyword;
        }
    }
    let section = doc.model.section_at_line(pos.line);
    let in_body = matches!(section, SectionKind::TestCases | SectionKind::Keywords);
    let leading_blank = line_text.chars().take(cell.start).all(char::is_whitespace);
    in_body && cell.start > 0 && leading_blank
}

/// Completion items for `pos`, or nothing when no kind of item applies.
pub fn complete(doc: &AnalyzedDocument, pos: CharPosition) -> Vec<CompletionItem> {
    let Some(line_text) = doc.snapshot.line(pos.line) else {
        return Vec::new();
    };
    let cell = cell_at(&line_text, pos.column);
    let section = doc.model.section_at_line(pos.line);
    let whole_cell = CharRange::on_line(pos.line, cell.start, cell.end);

    if cell.start == 0 && cell.prefix.starts_with('*') {
        return fixed_items(SECTION_HEADERS, CompletionItemKind::KEYWORD, doc, whole_cell);
    }
    if let Some(open) = open_variable(&line_text, &cell, pos.column) {
        return variable_items(doc, pos.line, open, &line_text, pos.column);
    }
    if cell.start == 0 && section == SectionKind::Settings {
        return fixed_items(SUITE_SETTINGS, CompletionItemKind::KEYWORD, doc, whole_cell);
    }
    if cell.start > 0 && cell.prefix.starts_with('[') {
        match section {
            SectionKind::TestCases => {
                return fixed_items(TEST_SETTINGS, CompletionItemKind::KEYWORD, doc, whole_cell)
            }
            SectionKind::Keywords => {
                return fixed_items(KEYWORD_SETTINGS, CompletionItemKind::KEYWORD, doc, whole_cell)
            }
            _ => {}
        }
    }
    if expects_keyword(doc, pos, &cell, &line_text) {
        return keyword_items(doc, pos.line, &cell);
    }
    Vec::new()
}

/// Fill in signature and documentation of a keyword item.
pub async fn resolve_item(services: &Services, mut item: CompletionItem) -> anyhow::Result<CompletionItem> {
    let Some(data) = item.data.clone() else {
        return Ok(item);
    };
    let Ok(data) = serde_json::from_value::<KeywordItemData>(data) else {
        return Ok(item);
    };
    let snapshot = services.documents().snapshot(&data.uri)?;
    let namespace = services.resolver.namespace(&snapshot).await?;
    let keyword = namespace
        .keywords()
        .map(|(_, kw)| kw)
        .find(|kw| kw.name == data.name && kw.libname == data.libname);
    if let Some(keyword) = keyword {
        item.documentation = Some(Documentation::String(keyword.to_plain_text()));
    }
    Ok(item)
}

pub fn register(bus: &mut FeatureBus, services: &Arc<Services>) {
    bus.completion.register(
        HandlerDescriptor::new("completion")
            .languages([ROBOT_LANGUAGE_ID])
            .trigger_characters(TRIGGER_CHARACTERS.iter().copied()),
        |req: CompletionRequest| async move {
            let items = complete(&req.document, req.position);
            anyhow::Ok((!items.is_empty()).then_some(CompletionResponse::Array(items)))
        },
    );

    let services = Arc::clone(services);
    bus.completion_resolve.register(
        HandlerDescriptor::new("completion_resolve"),
        move |item: CompletionItem| {
            let services = Arc::clone(&services);
            async move { resolve_item(&services, item).await }
        },
    );
}
