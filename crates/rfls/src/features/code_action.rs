//
// features/code_action.rs
//
// Documentation and quick-fix code actions
//

use tower_lsp::lsp_types::{
    CodeAction, CodeActionContext, CodeActionKind, CodeActionOrCommand, CodeActionTriggerKind, Command,
};

use super::commands::{CREATE_KEYWORD, SHOW_DOCUMENTATION};
use super::{AnalyzedDocument, CodeActionRequest, FeatureBus};
use crate::bus::HandlerDescriptor;
use crate::classifier::call_at;
use crate::syntax::variables::is_variable;
use crate::syntax::{StatementKind, TokenKind};
use crate::utf16::CharPosition;
use crate::ROBOT_LANGUAGE_ID;

pub fn open_documentation_kind() -> CodeActionKind {
    CodeActionKind::new("source.openDocumentation")
}

pub fn create_keyword_kind() -> CodeActionKind {
    CodeActionKind::new("quickfix.createKeyword")
}

/// `context.only` filters by kind prefix, `source` admits `source.openDocumentation`.
fn requested(context: &CodeActionContext, kind: &CodeActionKind) -> bool {
    match &context.only {
        None => true,
        Some(only) => only.iter().any(|wanted| {
            kind.as_str() == wanted.as_str() || kind.as_str().starts_with(&format!("{}.", wanted.as_str()))
        }),
    }
}

/// Quick fixes are offered when asked for, or when the client asks on its own.
fn quick_fixes_wanted(context: &CodeActionContext) -> bool {
    let asked = context
        .only
        .as_ref()
        .is_some_and(|only| only.iter().any(|k| create_keyword_kind().as_str().starts_with(k.as_str())));
    let automatic = context
        .trigger_kind
        .map_or(true, |kind| kind == CodeActionTriggerKind::AUTOMATIC);
    asked || automatic
}

fn action(title: String, kind: CodeActionKind, command: &str, arguments: Vec<serde_json::Value>) -> CodeActionOrCommand {
    CodeActionOrCommand::CodeAction(CodeAction {
        title: title.clone(),
        kind: Some(kind),
        command: Some(Command {
            title,
            command: command.to_string(),
            arguments: Some(arguments),
        }),
        ..Default::default()
    })
}

/// Code actions for the position at the start of the requested range.
pub fn code_actions(doc: &AnalyzedDocument, pos: CharPosition, context: &CodeActionContext) -> Vec<CodeActionOrCommand> {
    let Some(statement) = doc.statement_at(pos) else {
        return Vec::new();
    };
    let uri = serde_json::Value::String(doc.uri().to_string());
    let mut actions = Vec::new();

    let import = statement
        .token_at(pos)
        .filter(|t| t.kind == TokenKind::Name)
        .filter(|_| matches!(statement.kind, StatementKind::LibraryImport | StatementKind::ResourceImport));
    if let Some(token) = import {
        if requested(context, &open_documentation_kind()) {
            actions.push(action(
                format!("Open Documentation for '{}'", token.value),
                open_documentation_kind(),
                SHOW_DOCUMENTATION,
                vec![uri, serde_json::Value::String(token.value.clone())],
            ));
        }
        return actions;
    }

    let Some(call) = call_at(&doc.namespace, statement, pos.line, pos.column) else {
        return actions;
    };
    let name = serde_json::Value::String(call.token.value.clone());
    match &call.keyword {
        Some(keyword) => {
            if requested(context, &open_documentation_kind()) {
                actions.push(action(
                    format!("Open Documentation for '{}'", keyword.name),
                    open_documentation_kind(),
                    SHOW_DOCUMENTATION,
                    vec![uri, name],
                ));
            }
        }
        None if !is_variable(&call.token.value) => {
            if requested(context, &create_keyword_kind()) && quick_fixes_wanted(context) {
                actions.push(action(
                    format!("Create Keyword '{}'", call.token.value),
                    create_keyword_kind(),
                    CREATE_KEYWORD,
                    vec![uri, name],
                ));
            }
        }
        None => {}
    }
    actions
}

pub fn register(bus: &mut FeatureBus) {
    bus.code_action.register(
        HandlerDescriptor::new("code_action")
            .languages([ROBOT_LANGUAGE_ID])
            .code_action_kinds([open_documentation_kind(), create_keyword_kind()]),
        |req: CodeActionRequest| async move {
            anyhow::Ok(code_actions(&req.document, req.range.start, &req.context))
        },
    );
}
