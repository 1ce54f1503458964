//
// features/diagnostics.rs
//
// Unknown keywords, unknown namespaces and failed imports
//

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};

use super::{AnalyzedDocument, DocumentRequest, FeatureBus};
use crate::bus::HandlerDescriptor;
use crate::classifier::CallChainWalker;
use crate::error::{Cancelled, ResolveError};
use crate::syntax::variables::search_variables;
use crate::syntax::TokenKind;
use crate::utf16::{self, CharRange};
use crate::ROBOT_LANGUAGE_ID;

pub const SOURCE: &str = "rfls";

pub const KEYWORD_NOT_FOUND: &str = "KeywordNotFound";
pub const UNKNOWN_NAMESPACE: &str = "UnknownNamespace";
pub const EMPTY_KEYWORD_NAME: &str = "EmptyKeywordName";
pub const IMPORT_FAILED: &str = "ImportFailed";

fn diagnostic(doc: &AnalyzedDocument, range: CharRange, code: &str, message: String) -> Diagnostic {
    Diagnostic {
        range: utf16::range_to_wire(&doc.snapshot.rope, range),
        severity: Some(DiagnosticSeverity::ERROR),
        code: Some(NumberOrString::String(code.to_string())),
        source: Some(SOURCE.to_string()),
        message,
        ..Default::default()
    }
}

/// Names computed at run time cannot be checked.
fn is_dynamic(name: &str) -> bool {
    !search_variables(name, "$@&%").is_empty()
}

fn import_diagnostics(doc: &AnalyzedDocument, out: &mut Vec<Diagnostic>) {
    let namespace = &doc.namespace;
    for library in namespace.libraries() {
        if !library.explicit || &library.source_uri != doc.uri() {
            continue;
        }
        if let Some(error) = library.error() {
            out.push(diagnostic(
                doc,
                library.range,
                IMPORT_FAILED,
                format!("Importing library '{}' failed: {}", library.import_name, error),
            ));
        }
    }
    for resource in namespace.resources() {
        if &resource.source_uri != doc.uri() {
            continue;
        }
        if let Some(error) = &resource.error {
            out.push(diagnostic(
                doc,
                resource.range,
                IMPORT_FAILED,
                format!("Importing resource '{}' failed: {}", resource.import_name, error),
            ));
        }
    }
}

/// Every problem found in `doc`, in document order per category.
pub fn diagnostics(doc: &AnalyzedDocument, cancel: &CancellationToken) -> Result<Vec<Diagnostic>, Cancelled> {
    let mut out = Vec::new();
    import_diagnostics(doc, &mut out);

    for statement in &doc.model.statements {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if !statement.tokens.iter().any(|t| t.kind == TokenKind::Keyword) {
            continue;
        }
        let classified = CallChainWalker::new(&doc.namespace, statement)
            .with_cancellation(cancel.clone())
            .classify()?;
        for call in classified.iter().filter(|c| c.is_call() && c.keyword.is_none()) {
            let name = call.token.value.as_str();
            let range = call.token.range();
            match &call.error {
                Some(ResolveError::UnknownNamespace(qualifier)) => out.push(diagnostic(
                    doc,
                    range,
                    UNKNOWN_NAMESPACE,
                    format!("No keyword with name '{}' found: '{}' is not an imported library or resource", name, qualifier),
                )),
                Some(ResolveError::EmptyName) => out.push(diagnostic(
                    doc,
                    range,
                    EMPTY_KEYWORD_NAME,
                    "Keyword name cannot be empty".to_string(),
                )),
                None if is_dynamic(name) || name.eq_ignore_ascii_case("NONE") => {}
                None => out.push(diagnostic(
                    doc,
                    range,
                    KEYWORD_NOT_FOUND,
                    format!("No keyword with name '{}' found", name),
                )),
            }
        }
    }
    Ok(out)
}

pub fn register(bus: &mut FeatureBus) {
    bus.diagnostics.register(
        HandlerDescriptor::new("diagnostics").languages([ROBOT_LANGUAGE_ID]),
        |req: DocumentRequest| async move { anyhow::Ok(diagnostics(&req.document, &req.cancel)?) },
    );
}
