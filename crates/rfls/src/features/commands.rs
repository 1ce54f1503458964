//
// features/commands.rs
//
// Commands referenced by code actions
//

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tower_lsp::lsp_types::{Range, TextEdit, Url, WorkspaceEdit};

use super::{AnalyzedDocument, FeatureBus, Services};
use crate::bus::{Command, CommandOutput};
use crate::error::{CommandError, DocumentError};
use crate::syntax::StatementKind;
use crate::utf16::{self, CharPosition};

pub const SHOW_DOCUMENTATION: &str = "rfls.showDocumentation";
pub const CREATE_KEYWORD: &str = "rfls.createKeyword";

const STUB_BODY: &str = "    Fail    Not implemented";

/// `[uri, name]`, the argument shape shared by every command.
fn uri_and_name(command: &str, arguments: &[serde_json::Value]) -> Result<(Url, String), CommandError> {
    let invalid = |reason: &str| CommandError::InvalidArguments {
        command: command.to_string(),
        reason: reason.to_string(),
    };
    let [uri, name, ..] = arguments else {
        return Err(invalid("expected [uri, name]"));
    };
    let uri = uri
        .as_str()
        .and_then(|s| Url::parse(s).ok())
        .ok_or_else(|| invalid("first argument must be a document uri"))?;
    let name = name
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| invalid("second argument must be a non-empty name"))?;
    Ok((uri, name.to_string()))
}

/// Analyze the document a command names. A document the store does not hold
/// is a bad argument, not a failure of the command.
async fn analyze_argument(services: &Services, command: &str, uri: &Url) -> Result<AnalyzedDocument, CommandError> {
    let err = match services.analyze(uri).await {
        Ok(doc) => return Ok(doc),
        Err(err) => err,
    };
    if let Some(doc_err) = err.downcast_ref::<DocumentError>() {
        return Err(CommandError::InvalidArguments {
            command: command.to_string(),
            reason: doc_err.to_string(),
        });
    }
    Err(CommandError::Failed(err))
}

/// Plain-text documentation of a keyword, library or resource known to `doc`.
pub fn documentation_for(doc: &AnalyzedDocument, name: &str) -> Option<String> {
    let namespace = &doc.namespace;
    if let Some(keyword) = namespace.resolve(name) {
        return Some(keyword.to_plain_text());
    }
    if let Some(library) = namespace.libraries().iter().find(|lib| lib.name == name || lib.import_name == name) {
        return Some(match &library.catalog {
            Ok(catalog) if catalog.version.is_empty() => format!("{}\n\n{}", catalog.name, catalog.doc),
            Ok(catalog) => format!("{} {}\n\n{}", catalog.name, catalog.version, catalog.doc),
            Err(error) => format!("{}\n\n{}", library.import_name, error),
        });
    }
    let resource = namespace
        .resources()
        .iter()
        .find(|res| res.name == name || res.import_name == name)?;
    let signatures: Vec<String> = resource.keywords.iter().map(|kw| kw.signature()).collect();
    Some(format!("{}\n\n{}", resource.import_name, signatures.join("\n")))
}

struct ShowDocumentation {
    services: Arc<Services>,
}

#[async_trait]
impl Command for ShowDocumentation {
    async fn execute(&self, arguments: Vec<serde_json::Value>) -> Result<CommandOutput, CommandError> {
        let (uri, name) = uri_and_name(SHOW_DOCUMENTATION, &arguments)?;
        let doc = analyze_argument(&self.services, SHOW_DOCUMENTATION, &uri).await?;
        let documentation = documentation_for(&doc, &name).ok_or_else(|| CommandError::InvalidArguments {
            command: SHOW_DOCUMENTATION.to_string(),
            reason: format!("nothing named '{}' in {}", name, uri),
        })?;
        Ok(CommandOutput {
            value: Some(serde_json::json!({
                "title": name,
                "documentation": documentation,
            })),
            edit: None,
        })
    }
}

/// Edit adding a stub keyword `name` to the keywords section of `doc`,
/// creating the section at the end of the document when it is missing.
pub fn create_keyword_edit(doc: &AnalyzedDocument, name: &str) -> WorkspaceEdit {
    let rope = &doc.snapshot.rope;
    let (position, new_text) = match doc.model.keyword_section_end() {
        Some(line) => {
            let len = doc.snapshot.line(line).map_or(0, |text| text.chars().count());
            let header_only = doc
                .model
                .statement_at_line(line)
                .is_some_and(|s| s.kind == StatementKind::SectionHeader);
            let gap = if header_only { "\n" } else { "\n\n" };
            (
                utf16::position_to_wire(rope, CharPosition::new(line, len)),
                format!("{gap}{name}\n{STUB_BODY}"),
            )
        }
        None => {
            let text = doc.snapshot.text();
            let prefix = if text.is_empty() {
                ""
            } else if text.ends_with('\n') {
                "\n"
            } else {
                "\n\n"
            };
            let last = rope.len_lines().saturating_sub(1);
            let len = doc.snapshot.line(last).map_or(0, |text| text.chars().count());
            (
                utf16::position_to_wire(rope, CharPosition::new(last, len)),
                format!("{prefix}*** Keywords ***\n{name}\n{STUB_BODY}\n"),
            )
        }
    };
    let edit = TextEdit {
        range: Range::new(position, position),
        new_text,
    };
    WorkspaceEdit {
        changes: Some(HashMap::from([(doc.uri().clone(), vec![edit])])),
        ..Default::default()
    }
}

struct CreateKeyword {
    services: Arc<Services>,
}

#[async_trait]
impl Command for CreateKeyword {
    async fn execute(&self, arguments: Vec<serde_json::Value>) -> Result<CommandOutput, CommandError> {
        let (uri, name) = uri_and_name(CREATE_KEYWORD, &arguments)?;
        let doc = analyze_argument(&self.services, CREATE_KEYWORD, &uri).await?;
        log::debug!("Creating keyword '{}' in {}", name, uri);
        Ok(CommandOutput {
            value: None,
            edit: Some(create_keyword_edit(&doc, &name)),
        })
    }
}

pub fn register(bus: &mut FeatureBus, services: &Arc<Services>) -> Result<(), CommandError> {
    bus.commands.register(
        SHOW_DOCUMENTATION,
        ShowDocumentation {
            services: Arc::clone(services),
        },
    )?;
    bus.commands.register(
        CREATE_KEYWORD,
        CreateKeyword {
            services: Arc::clone(services),
        },
    )?;
    Ok(())
}
