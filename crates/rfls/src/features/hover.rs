//
// features/hover.rs
//
// Keyword and import documentation on hover
//

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind};

use super::commands::documentation_for;
use super::{AnalyzedDocument, FeatureBus, PositionRequest};
use crate::bus::HandlerDescriptor;
use crate::classifier::call_at;
use crate::syntax::{StatementKind, Token, TokenKind};
use crate::utf16::{self, CharPosition};
use crate::ROBOT_LANGUAGE_ID;

fn markdown(doc: &AnalyzedDocument, token: &Token, value: String) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(utf16::range_to_wire(&doc.snapshot.rope, token.range())),
    }
}

/// Documentation for the keyword call, keyword definition or import name
/// under `pos`.
pub fn hover(doc: &AnalyzedDocument, pos: CharPosition) -> Option<Hover> {
    let statement = doc.statement_at(pos)?;
    let token = statement.token_at(pos)?;

    match (statement.kind, token.kind) {
        (StatementKind::LibraryImport | StatementKind::ResourceImport, TokenKind::Name) => {
            let text = documentation_for(doc, &token.value)?;
            let (title, body) = text.split_once("\n\n").unwrap_or((text.as_str(), ""));
            let value = if body.is_empty() {
                format!("**{}**", title)
            } else {
                format!("**{}**\n\n{}", title, body)
            };
            Some(markdown(doc, token, value))
        }
        (_, TokenKind::KeywordName) => {
            let keyword = doc
                .namespace
                .own_keywords()
                .iter()
                .find(|kw| kw.line == Some(token.line as u32) && kw.name == token.value)?;
            Some(markdown(doc, token, keyword.to_markdown(true)))
        }
        _ => {
            let call = call_at(&doc.namespace, statement, pos.line, pos.column)?;
            let keyword = call.keyword.as_ref()?;
            Some(markdown(doc, &call.token, keyword.to_markdown(true)))
        }
    }
}

pub fn register(bus: &mut FeatureBus) {
    bus.hover.register(
        HandlerDescriptor::new("hover").languages([ROBOT_LANGUAGE_ID]),
        |req: PositionRequest| async move { anyhow::Ok(hover(&req.document, req.position)) },
    );
}
