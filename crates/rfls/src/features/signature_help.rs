//
// features/signature_help.rs
//
// Parameter hints for the keyword whose arguments are being typed
//

use std::sync::Arc;

use tower_lsp::lsp_types::{
    Documentation, MarkupContent, MarkupKind, ParameterInformation, ParameterLabel, SignatureHelp,
    SignatureInformation,
};

use super::{AnalyzedDocument, FeatureBus, SignatureHelpRequest};
use crate::bus::HandlerDescriptor;
use crate::classifier::{CallChainWalker, TokenRole};
use crate::error::Cancelled;
use crate::library_doc::KeywordDoc;
use crate::utf16::CharPosition;
use crate::ROBOT_LANGUAGE_ID;

/// Characters that start or move to the next argument.
pub const TRIGGER_CHARACTERS: &[&str] = &[" ", "\t"];

/// The call whose arguments `pos` is in, the argument index and the text of
/// that argument so far.
fn active_call(
    doc: &AnalyzedDocument,
    pos: CharPosition,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Option<(Arc<KeywordDoc>, usize, Option<String>)>, Cancelled> {
    let Some(statement) = doc.statement_at(pos) else {
        return Ok(None);
    };
    let classified = CallChainWalker::new(&doc.namespace, statement)
        .with_cancellation(cancel.clone())
        .classify()?;

    let mut current: Option<Arc<KeywordDoc>> = None;
    let mut seen: usize = 0;
    let mut last: Option<(bool, Option<String>)> = None;
    for item in classified {
        let token = &item.token;
        if (token.line, token.col) > (pos.line, pos.column) {
            break;
        }
        let past = token.line < pos.line || pos.column > token.end_col();
        match item.role {
            TokenRole::Keyword | TokenRole::InnerKeyword => {
                if !past {
                    // still typing the keyword name
                    return Ok(None);
                }
                current = item.keyword;
                seen = 0;
            }
            TokenRole::Argument => seen += 1,
            TokenRole::Leading | TokenRole::ControlFlow | TokenRole::Condition => current = None,
        }
        last = Some((past, (item.role == TokenRole::Argument && !past).then(|| token.value.clone())));
    }

    let (Some(keyword), Some((past, typed))) = (current, last) else {
        return Ok(None);
    };
    let index = if past { seen } else { seen.saturating_sub(1) };
    Ok(Some((keyword, index, typed)))
}

fn signature(keyword: &KeywordDoc, active: Option<usize>) -> SignatureInformation {
    let documentation = keyword.to_markdown(false);
    SignatureInformation {
        label: keyword.signature(),
        documentation: (!documentation.is_empty()).then(|| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: documentation,
            })
        }),
        parameters: Some(
            keyword
                .args
                .iter()
                .map(|arg| ParameterInformation {
                    label: ParameterLabel::Simple(arg.clone()),
                    documentation: None,
                })
                .collect(),
        ),
        active_parameter: active.map(|idx| idx as u32),
    }
}

pub fn signature_help(
    doc: &AnalyzedDocument,
    pos: CharPosition,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Option<SignatureHelp>, Cancelled> {
    let Some((keyword, index, typed)) = active_call(doc, pos, cancel)? else {
        return Ok(None);
    };
    let active = keyword.active_parameter(index, typed.as_deref());
    Ok(Some(SignatureHelp {
        signatures: vec![signature(&keyword, active)],
        active_signature: Some(0),
        active_parameter: active.map(|idx| idx as u32),
    }))
}

pub fn register(bus: &mut FeatureBus) {
    bus.signature_help.register(
        HandlerDescriptor::new("signature_help")
            .languages([ROBOT_LANGUAGE_ID])
            .trigger_characters(TRIGGER_CHARACTERS.iter().copied()),
        |req: SignatureHelpRequest| async move {
            anyhow::Ok(signature_help(&req.document, req.position, &req.cancel)?)
        },
    );
}
