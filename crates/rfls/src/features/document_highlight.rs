//
// features/document_highlight.rs
//
// Highlight every call of the keyword under the cursor
//

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{DocumentHighlight, DocumentHighlightKind};

use super::{AnalyzedDocument, FeatureBus, PositionRequest};
use crate::bus::HandlerDescriptor;
use crate::classifier::{call_at, CallChainWalker};
use crate::error::Cancelled;
use crate::library_doc::{KeywordDoc, KeywordSource};
use crate::syntax::{Token, TokenKind};
use crate::utf16::{self, CharPosition};
use crate::ROBOT_LANGUAGE_ID;

fn target(doc: &AnalyzedDocument, pos: CharPosition) -> Option<Arc<KeywordDoc>> {
    let statement = doc.statement_at(pos)?;
    let token = statement.token_at(pos)?;
    if token.kind == TokenKind::KeywordName {
        return doc
            .namespace
            .own_keywords()
            .iter()
            .find(|kw| kw.line == Some(token.line as u32) && kw.name == token.value)
            .cloned();
    }
    call_at(&doc.namespace, statement, pos.line, pos.column)?.keyword
}

fn highlight(doc: &AnalyzedDocument, token: &Token, kind: DocumentHighlightKind) -> DocumentHighlight {
    DocumentHighlight {
        range: utf16::range_to_wire(&doc.snapshot.rope, token.range()),
        kind: Some(kind),
    }
}

/// The definition (when local) and every call of the keyword under `pos`.
pub fn document_highlight(
    doc: &AnalyzedDocument,
    pos: CharPosition,
    cancel: &CancellationToken,
) -> Result<Option<Vec<DocumentHighlight>>, Cancelled> {
    let Some(keyword) = target(doc, pos) else {
        return Ok(None);
    };

    let mut out = Vec::new();
    for statement in &doc.model.statements {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if keyword.kind == KeywordSource::Local {
            let definition = statement
                .get_token(TokenKind::KeywordName)
                .filter(|name| keyword.line == Some(name.line as u32) && name.value == keyword.name);
            if let Some(name) = definition {
                out.push(highlight(doc, name, DocumentHighlightKind::WRITE));
                continue;
            }
        }
        if !statement.tokens.iter().any(|t| t.kind == TokenKind::Keyword) {
            continue;
        }
        let calls = CallChainWalker::new(&doc.namespace, statement)
            .with_cancellation(cancel.clone())
            .classify()?;
        for call in calls.iter().filter(|c| c.is_call()) {
            if call.keyword.as_deref() == Some(keyword.as_ref()) {
                out.push(highlight(doc, &call.token, DocumentHighlightKind::READ));
            }
        }
    }
    Ok(Some(out))
}

pub fn register(bus: &mut FeatureBus) {
    bus.document_highlight.register(
        HandlerDescriptor::new("document_highlight").languages([ROBOT_LANGUAGE_ID]),
        |req: PositionRequest| async move {
            anyhow::Ok(document_highlight(&req.document, req.position, &req.cancel)?)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use tower_lsp::lsp_types::{Position, Range};

    use crate::document_store::DocumentStore;
    use crate::test_utils::{build_namespace, parse, test_uri};

    fn analyzed(text: &str) -> AnalyzedDocument {
        let store = DocumentStore::new();
        let uri = test_uri("suite.robot");
        store.open(&uri, ROBOT_LANGUAGE_ID, text, 1);
        AnalyzedDocument {
            snapshot: store.snapshot(&uri).unwrap(),
            model: parse(text),
            namespace: Arc::new(build_namespace(text)),
        }
    }

    const SUITE: &str = "*** Test Cases ***\nT\n    Step\n    Run Keywords    step    AND    Log    x\n\n*** Keywords ***\nStep\n    Log    y\n";

    fn ranges(pos: CharPosition) -> Vec<(Range, DocumentHighlightKind)> {
        let doc = analyzed(SUITE);
        document_highlight(&doc, pos, &CancellationToken::new())
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|h| (h.range, h.kind.unwrap()))
            .collect()
    }

    fn range(line: u32, start: u32, end: u32) -> Range {
        Range::new(Position::new(line, start), Position::new(line, end))
    }

    #[test]
    fn test_calls_and_definition_of_local_keyword() {
        let expected = vec![
            (range(2, 4, 8), DocumentHighlightKind::READ),
            (range(3, 20, 24), DocumentHighlightKind::READ),
            (range(6, 0, 4), DocumentHighlightKind::WRITE),
        ];
        assert_eq!(ranges(CharPosition::new(2, 5)), expected);
        assert_eq!(ranges(CharPosition::new(6, 1)), expected);
    }

    #[test]
    fn test_library_keyword_calls() {
        assert_eq!(
            ranges(CharPosition::new(7, 5)),
            vec![
                (range(3, 35, 38), DocumentHighlightKind::READ),
                (range(7, 4, 7), DocumentHighlightKind::READ),
            ]
        );
    }

    #[test]
    fn test_nothing_under_cursor() {
        let doc = analyzed(SUITE);
        let none = document_highlight(&doc, CharPosition::new(3, 41), &CancellationToken::new()).unwrap();
        assert!(none.is_none());
    }
}
