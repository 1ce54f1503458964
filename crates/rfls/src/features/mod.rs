//
// features/mod.rs
//
// Language features as bus handlers. Handlers work in code points; the world
// state converts positions at the protocol boundary.
//

pub mod code_action;
pub mod commands;
pub mod completion;
pub mod declaration;
pub mod diagnostics;
pub mod document_highlight;
pub mod hover;
pub mod lifecycle;
pub mod semantic_tokens;
pub mod signature_help;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::request::GotoDeclarationResponse;
use tower_lsp::lsp_types::{
    CodeActionContext, CodeActionOrCommand, CompletionContext, CompletionItem, CompletionResponse, Diagnostic,
    DocumentHighlight, Hover, SemanticTokens, SignatureHelp, SignatureHelpContext, Url,
};

use crate::bus::{CommandRegistry, Event};
use crate::document_store::{DocumentSnapshot, DocumentStore};
use crate::error::DocumentError;
use crate::namespace::{Namespace, NamespaceResolver};
use crate::syntax::{Model, Statement};
use crate::utf16::{CharPosition, CharRange};

pub use semantic_tokens::SemanticTokenCache;

/// Shared collaborators handed to every handler.
#[derive(Debug)]
pub struct Services {
    pub resolver: Arc<NamespaceResolver>,
    pub semantic_tokens: SemanticTokenCache,
}

impl Services {
    pub fn new(resolver: Arc<NamespaceResolver>) -> Self {
        Self {
            resolver,
            semantic_tokens: SemanticTokenCache::default(),
        }
    }

    pub fn documents(&self) -> &Arc<DocumentStore> {
        self.resolver.documents()
    }

    /// Parse and resolve the current content of `uri`.
    pub async fn analyze(&self, uri: &Url) -> anyhow::Result<AnalyzedDocument> {
        let snapshot = self.documents().snapshot(uri)?;
        self.analyze_snapshot(snapshot).await
    }

    pub async fn analyze_snapshot(&self, snapshot: DocumentSnapshot) -> anyhow::Result<AnalyzedDocument> {
        let namespace = self.resolver.namespace(&snapshot).await?;
        let model = self.resolver.parser().parse(&snapshot.text());
        Ok(AnalyzedDocument {
            snapshot,
            model,
            namespace,
        })
    }
}

/// A document snapshot with its parsed model and namespace.
#[derive(Debug)]
pub struct AnalyzedDocument {
    pub snapshot: DocumentSnapshot,
    pub model: Model,
    pub namespace: Arc<Namespace>,
}

impl AnalyzedDocument {
    pub fn uri(&self) -> &Url {
        &self.snapshot.uri
    }

    pub fn statement_at(&self, pos: CharPosition) -> Option<&Statement> {
        self.model.statement_at_line(pos.line)
    }
}

/// Sync notification payload.
#[derive(Debug, Clone)]
pub struct DocumentEvent {
    pub uri: Url,
    pub language_id: String,
    /// The text differs from what the store had before.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct DocumentRequest {
    pub document: Arc<AnalyzedDocument>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct PositionRequest {
    pub document: Arc<AnalyzedDocument>,
    pub position: CharPosition,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub document: Arc<AnalyzedDocument>,
    pub position: CharPosition,
    pub context: Option<CompletionContext>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct SignatureHelpRequest {
    pub document: Arc<AnalyzedDocument>,
    pub position: CharPosition,
    pub context: Option<SignatureHelpContext>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct CodeActionRequest {
    pub document: Arc<AnalyzedDocument>,
    pub range: CharRange,
    pub context: CodeActionContext,
    pub cancel: CancellationToken,
}

/// Every extension point of the server.
#[derive(Debug)]
pub struct FeatureBus {
    pub did_open: Event<DocumentEvent, ()>,
    pub did_change: Event<DocumentEvent, ()>,
    pub did_close: Event<DocumentEvent, ()>,
    pub did_save: Event<DocumentEvent, ()>,
    pub completion: Event<CompletionRequest, Option<CompletionResponse>>,
    pub completion_resolve: Event<CompletionItem, CompletionItem>,
    pub declaration: Event<PositionRequest, Option<GotoDeclarationResponse>>,
    pub hover: Event<PositionRequest, Option<Hover>>,
    pub signature_help: Event<SignatureHelpRequest, Option<SignatureHelp>>,
    pub document_highlight: Event<PositionRequest, Option<Vec<DocumentHighlight>>>,
    /// Diagnostics with ranges already in wire units.
    pub diagnostics: Event<DocumentRequest, Vec<Diagnostic>>,
    pub code_action: Event<CodeActionRequest, Vec<CodeActionOrCommand>>,
    pub semantic_tokens_full: Event<DocumentRequest, Option<SemanticTokens>>,
    pub commands: CommandRegistry,
}

impl Default for FeatureBus {
    fn default() -> Self {
        Self {
            did_open: Event::new("textDocument/didOpen"),
            did_change: Event::new("textDocument/didChange"),
            did_close: Event::new("textDocument/didClose"),
            did_save: Event::new("textDocument/didSave"),
            completion: Event::new("textDocument/completion"),
            completion_resolve: Event::new("completionItem/resolve"),
            declaration: Event::new("textDocument/declaration"),
            hover: Event::new("textDocument/hover"),
            signature_help: Event::new("textDocument/signatureHelp"),
            document_highlight: Event::new("textDocument/documentHighlight"),
            diagnostics: Event::new("textDocument/publishDiagnostics"),
            code_action: Event::new("textDocument/codeAction"),
            semantic_tokens_full: Event::new("textDocument/semanticTokens/full"),
            commands: CommandRegistry::new(),
        }
    }
}

impl FeatureBus {
    /// A bus with every built-in feature registered.
    pub fn with_features(services: &Arc<Services>) -> Result<Self, crate::error::CommandError> {
        let mut bus = Self::default();
        lifecycle::register(&mut bus, services);
        completion::register(&mut bus, services);
        declaration::register(&mut bus, services);
        hover::register(&mut bus);
        signature_help::register(&mut bus);
        document_highlight::register(&mut bus);
        diagnostics::register(&mut bus);
        code_action::register(&mut bus);
        semantic_tokens::register(&mut bus, services);
        commands::register(&mut bus, services)?;
        Ok(bus)
    }
}

/// Error for a request against a document the store does not have.
pub fn not_opened(uri: &Url) -> anyhow::Error {
    DocumentError::NotOpened(uri.clone()).into()
}
