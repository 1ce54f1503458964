//
// state.rs
//
// Shared server state: documents, resolver, feature bus and configuration
//

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::request::{GotoDeclarationParams, GotoDeclarationResponse};
use tower_lsp::lsp_types::*;

use crate::bus::{any_handler, for_language, CommandOutput};
use crate::config::ServerConfig;
use crate::document_store::{CloseOutcome, DocumentSnapshot, DocumentStore, Owner};
use crate::error::{CommandError, DocumentError};
use crate::features::declaration::merge_responses;
use crate::features::semantic_tokens;
use crate::features::{
    AnalyzedDocument, CodeActionRequest, CompletionRequest, DocumentEvent, DocumentRequest, FeatureBus,
    PositionRequest, Services, SignatureHelpRequest,
};
use crate::introspection::{LibraryIntrospector, SpecFileIntrospector};
use crate::namespace::NamespaceResolver;
use crate::syntax::{DocumentParser, SpaceSeparatedParser};
use crate::utf16::{self, CharPosition};

/// Everything the server knows, shared by all in-flight requests.
///
/// Synchronization notifications mutate the document store before their first
/// await point, so edits to one document apply in the order they arrive.
#[derive(Debug)]
pub struct WorldState {
    pub documents: Arc<DocumentStore>,
    pub services: Arc<Services>,
    pub bus: FeatureBus,
    config: RwLock<ServerConfig>,
    link_support: AtomicBool,
    /// Set once `initialize` has advertised the text sync kind.
    sync_negotiated: AtomicBool,
}

impl WorldState {
    pub fn new(config: ServerConfig) -> Result<Self, CommandError> {
        Self::with_collaborators(
            config,
            Arc::new(SpaceSeparatedParser::new()),
            Arc::new(SpecFileIntrospector::new()),
        )
    }

    pub fn with_collaborators(
        config: ServerConfig,
        parser: Arc<dyn DocumentParser>,
        introspector: Arc<dyn LibraryIntrospector>,
    ) -> Result<Self, CommandError> {
        let documents = Arc::new(DocumentStore::new());
        let resolver = Arc::new(NamespaceResolver::with_limits(
            Arc::clone(&documents),
            parser,
            introspector,
            config.library_workers,
            config.catalog_cache_capacity,
        ));
        resolver.set_search_paths(config.library_search_paths.clone());
        let services = Arc::new(Services::new(resolver));
        let bus = FeatureBus::with_features(&services)?;
        Ok(Self {
            documents,
            services,
            bus,
            config: RwLock::new(config),
            link_support: AtomicBool::new(false),
            sync_negotiated: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> RwLockReadGuard<'_, ServerConfig> {
        self.config.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn link_support(&self) -> bool {
        self.link_support.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------------
    // Negotiation and configuration
    // ------------------------------------------------------------------------

    pub fn initialize(&self, params: &InitializeParams) -> InitializeResult {
        let link_support = params
            .capabilities
            .text_document
            .as_ref()
            .and_then(|td| td.declaration.as_ref())
            .and_then(|decl| decl.link_support)
            .unwrap_or(false);
        self.link_support.store(link_support, Ordering::Relaxed);
        log::info!("Client declaration link support: {}", link_support);

        if let Some(options) = &params.initialization_options {
            self.update_config(options);
        }

        let capabilities = self.capabilities();
        self.sync_negotiated.store(true, Ordering::Relaxed);
        InitializeResult {
            server_info: Some(ServerInfo {
                name: "rfls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities,
        }
    }

    /// Merge `settings` into the active configuration.
    ///
    /// The text sync kind is fixed once `initialize` has advertised it.
    pub fn update_config(&self, settings: &serde_json::Value) {
        let updated = {
            let mut config = self.config.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut updated = config.merged(settings);
            if updated.sync_kind != config.sync_kind && self.sync_negotiated.load(Ordering::Relaxed) {
                log::warn!(
                    "Ignoring sync {:?}: {:?} was negotiated at initialize",
                    updated.sync_kind,
                    config.sync_kind
                );
                updated.sync_kind = config.sync_kind;
            }
            if updated.library_workers != config.library_workers {
                log::info!("libraries.workers takes effect on restart");
            }
            *config = updated.clone();
            updated
        };
        let resolver = &self.services.resolver;
        if resolver.set_search_paths(updated.library_search_paths.clone()) {
            self.services.semantic_tokens.clear();
        }
        resolver.catalogs().resize(updated.catalog_cache_capacity);
        updated.log();
    }

    pub fn capabilities(&self) -> ServerCapabilities {
        let config = self.config();
        let trigger_characters = self.bus.completion.trigger_characters();
        let commit_characters = self.bus.completion.commit_characters();
        let code_action_kinds = self.bus.code_action.code_action_kinds();
        let signature_triggers = self.bus.signature_help.trigger_characters();

        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(config.sync_kind),
                save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                    include_text: Some(true),
                })),
                ..Default::default()
            })),
            completion_provider: Some(CompletionOptions {
                trigger_characters: Some(trigger_characters),
                all_commit_characters: (!commit_characters.is_empty()).then_some(commit_characters),
                resolve_provider: Some(true),
                ..Default::default()
            }),
            declaration_provider: Some(DeclarationCapability::Simple(true)),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            signature_help_provider: Some(SignatureHelpOptions {
                retrigger_characters: Some(signature_triggers.clone()),
                trigger_characters: Some(signature_triggers),
                ..Default::default()
            }),
            document_highlight_provider: Some(OneOf::Left(true)),
            code_action_provider: Some(CodeActionProviderCapability::Options(CodeActionOptions {
                code_action_kinds: Some(code_action_kinds),
                ..Default::default()
            })),
            execute_command_provider: Some(ExecuteCommandOptions {
                commands: self.bus.commands.ids(),
                ..Default::default()
            }),
            semantic_tokens_provider: Some(SemanticTokensServerCapabilities::SemanticTokensOptions(
                SemanticTokensOptions {
                    legend: semantic_tokens::legend(),
                    full: Some(SemanticTokensFullOptions::Bool(true)),
                    range: None,
                    ..Default::default()
                },
            )),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------------
    // Synchronization
    //
    // Each returns whether other documents may need their highlighting
    // refreshed.
    // ------------------------------------------------------------------------

    fn event(&self, uri: &Url, language_id: &str, changed: bool) -> DocumentEvent {
        DocumentEvent {
            uri: uri.clone(),
            language_id: language_id.to_string(),
            changed,
        }
    }

    fn has_importers(&self, uri: &Url) -> bool {
        !self.services.resolver.importers_of(uri).is_empty()
    }

    pub async fn did_open(&self, params: DidOpenTextDocumentParams) -> anyhow::Result<bool> {
        let doc = params.text_document;
        let outcome = self.documents.open(&doc.uri, &doc.language_id, &doc.text, doc.version);
        log::trace!("Opened {} (created: {}, changed: {})", doc.uri, outcome.created, outcome.changed);

        let event = self.event(&doc.uri, &doc.language_id, outcome.changed);
        self.bus.did_open.collect(event.clone(), for_language(&doc.language_id)).await;
        if outcome.changed {
            self.bus.did_change.collect(event, for_language(&doc.language_id)).await;
        }

        let max_documents = self.config().max_documents;
        if self.documents.len() > max_documents {
            log::warn!(
                "{} documents in the store (soft limit {})",
                self.documents.len(),
                max_documents
            );
        }
        Ok(outcome.changed && self.has_importers(&doc.uri))
    }

    pub async fn did_change(&self, params: DidChangeTextDocumentParams) -> anyhow::Result<bool> {
        let uri = params.text_document.uri;
        let sync_kind = self.config().sync_kind;
        let changed = self.documents.apply_changes(
            &uri,
            params.text_document.version,
            sync_kind,
            params.content_changes,
        )?;
        let snapshot = self.documents.snapshot(&uri)?;
        self.bus
            .did_change
            .collect(self.event(&uri, &snapshot.language_id, changed), for_language(&snapshot.language_id))
            .await;
        Ok(changed && self.has_importers(&uri))
    }

    pub async fn did_close(&self, params: DidCloseTextDocumentParams) -> anyhow::Result<bool> {
        let uri = params.text_document.uri;
        let language_id = self
            .documents
            .get(&uri)
            .map(|snapshot| snapshot.language_id)
            .unwrap_or_default();
        let outcome = self.documents.close(&uri, &Owner::Editor);
        match outcome {
            CloseOutcome::Unknown => return Err(DocumentError::NotOpened(uri).into()),
            CloseOutcome::Removed => log::trace!("Closed and dropped {}", uri),
            CloseOutcome::Retained => log::trace!("Closed {}, still referenced", uri),
        }
        let refresh = self.has_importers(&uri);
        self.bus
            .did_close
            .collect(self.event(&uri, &language_id, false), for_language(&language_id))
            .await;
        Ok(refresh)
    }

    pub async fn did_save(&self, params: DidSaveTextDocumentParams) -> anyhow::Result<bool> {
        let uri = params.text_document.uri;
        let changed = self.documents.save(&uri, params.text.as_deref())?;
        let snapshot = self.documents.snapshot(&uri)?;
        let event = self.event(&uri, &snapshot.language_id, changed);
        if changed {
            self.bus
                .did_change
                .collect(event.clone(), for_language(&snapshot.language_id))
                .await;
        }
        self.bus.did_save.collect(event, for_language(&snapshot.language_id)).await;
        Ok(changed && self.has_importers(&uri))
    }

    /// Reconcile background file-system changes.
    ///
    /// Documents open in the editor are left alone. Anything else the store
    /// holds is closed and dropped so the next build reads it from disk.
    pub async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) -> bool {
        let mut latest: IndexMap<Url, FileChangeType> = IndexMap::new();
        for change in params.changes {
            latest.insert(change.uri, change.typ);
        }

        let mut refresh = false;
        for (uri, typ) in latest {
            if self.documents.is_open_in_editor(&uri) {
                continue;
            }
            log::debug!("Watched file {:?}: {}", typ, uri);
            if uri.path().ends_with(".json") {
                self.services.resolver.catalogs().clear();
                self.services.resolver.invalidate_all();
                self.services.semantic_tokens.clear();
                refresh = true;
                continue;
            }
            if typ == FileChangeType::CREATED {
                // A new file can satisfy an import that failed before.
                self.services.resolver.invalidate_all();
                self.services.semantic_tokens.clear();
                refresh = true;
            }
            refresh |= self.has_importers(&uri);
            match self.documents.get(&uri) {
                Some(snapshot) => {
                    self.bus
                        .did_close
                        .collect(
                            self.event(&uri, &snapshot.language_id, false),
                            for_language(&snapshot.language_id),
                        )
                        .await;
                    self.documents.force_close(&uri);
                }
                None => {
                    self.services.resolver.invalidate(&uri);
                }
            }
        }
        refresh
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    async fn analyze(&self, uri: &Url) -> anyhow::Result<Arc<AnalyzedDocument>> {
        let snapshot = self.documents.snapshot(uri)?;
        Ok(Arc::new(self.services.analyze_snapshot(snapshot).await?))
    }

    fn position(snapshot: &DocumentSnapshot, position: Position) -> Result<CharPosition, DocumentError> {
        utf16::position_from_wire(&snapshot.rope, position).ok_or_else(|| DocumentError::InvalidPosition {
            uri: snapshot.uri.clone(),
            line: position.line,
            character: position.character,
        })
    }

    pub async fn completion(&self, params: CompletionParams) -> anyhow::Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let triggered = params
            .context
            .as_ref()
            .is_some_and(|ctx| ctx.trigger_kind == CompletionTriggerKind::TRIGGER_CHARACTER);
        if triggered {
            let debounce = self.config().completion_debounce();
            tokio::time::sleep(debounce).await;
        }

        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let document = self.analyze(&uri).await?;
        let position = Self::position(&document.snapshot, params.text_document_position.position)?;
        let language_id = document.snapshot.language_id.clone();
        let request = CompletionRequest {
            document,
            position,
            context: params.context,
            cancel,
        };

        let mut items = Vec::new();
        let mut incomplete = false;
        for response in self.bus.completion.collect(request, for_language(&language_id)).await.into_iter().flatten() {
            match response {
                CompletionResponse::Array(more) => items.extend(more),
                CompletionResponse::List(list) => {
                    incomplete |= list.is_incomplete;
                    items.extend(list.items);
                }
            }
        }
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: incomplete,
            items,
        })))
    }

    pub async fn completion_resolve(&self, item: CompletionItem) -> anyhow::Result<CompletionItem> {
        let mut results = self.bus.completion_resolve.collect(item.clone(), any_handler).await;
        if results.len() > 1 {
            log::warn!("{} handlers resolved '{}', keeping the last", results.len(), item.label);
        }
        Ok(results.pop().unwrap_or(item))
    }

    pub async fn declaration(
        &self,
        params: GotoDeclarationParams,
    ) -> anyhow::Result<Option<GotoDeclarationResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let document = self.analyze(&uri).await?;
        let position = Self::position(&document.snapshot, params.text_document_position_params.position)?;
        let language_id = document.snapshot.language_id.clone();
        let request = PositionRequest {
            document,
            position,
            cancel,
        };
        let responses = self
            .bus
            .declaration
            .collect(request, for_language(&language_id))
            .await
            .into_iter()
            .flatten()
            .collect();
        Ok(merge_responses(responses, self.link_support()))
    }

    async fn position_request(
        &self,
        params: TextDocumentPositionParams,
        cancel: CancellationToken,
    ) -> anyhow::Result<(PositionRequest, String)> {
        let document = self.analyze(&params.text_document.uri).await?;
        let position = Self::position(&document.snapshot, params.position)?;
        let language_id = document.snapshot.language_id.clone();
        Ok((
            PositionRequest {
                document,
                position,
                cancel,
            },
            language_id,
        ))
    }

    pub async fn hover(&self, params: HoverParams) -> anyhow::Result<Option<Hover>> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let (request, language_id) = self
            .position_request(params.text_document_position_params, cancel)
            .await?;
        Ok(self
            .bus
            .hover
            .collect(request, for_language(&language_id))
            .await
            .into_iter()
            .flatten()
            .next())
    }

    pub async fn signature_help(&self, params: SignatureHelpParams) -> anyhow::Result<Option<SignatureHelp>> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let (request, language_id) = self
            .position_request(params.text_document_position_params, cancel)
            .await?;
        let request = SignatureHelpRequest {
            document: request.document,
            position: request.position,
            context: params.context,
            cancel: request.cancel,
        };
        Ok(self
            .bus
            .signature_help
            .collect(request, for_language(&language_id))
            .await
            .into_iter()
            .flatten()
            .next())
    }

    pub async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> anyhow::Result<Option<Vec<DocumentHighlight>>> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let (request, language_id) = self
            .position_request(params.text_document_position_params, cancel)
            .await?;
        let highlights: Vec<DocumentHighlight> = self
            .bus
            .document_highlight
            .collect(request, for_language(&language_id))
            .await
            .into_iter()
            .flatten()
            .flatten()
            .collect();
        Ok((!highlights.is_empty()).then_some(highlights))
    }

    /// Diagnostics of `uri` from every handler, and the version they describe.
    pub async fn diagnostics(&self, uri: &Url) -> anyhow::Result<(Vec<Diagnostic>, Option<i32>)> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let document = self.analyze(uri).await?;
        let version = document.snapshot.version;
        let language_id = document.snapshot.language_id.clone();
        let diagnostics = self
            .bus
            .diagnostics
            .collect(DocumentRequest { document, cancel }, for_language(&language_id))
            .await
            .into_iter()
            .flatten()
            .collect();
        Ok((diagnostics, version))
    }

    /// Documents the editor has open.
    pub fn editor_documents(&self) -> Vec<Url> {
        self.documents
            .uris()
            .into_iter()
            .filter(|uri| self.documents.is_open_in_editor(uri))
            .collect()
    }

    pub async fn code_action(&self, params: CodeActionParams) -> anyhow::Result<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let document = self.analyze(&uri).await?;
        let range = utf16::range_from_wire(&document.snapshot.rope, params.range).ok_or_else(|| {
            DocumentError::InvalidPosition {
                uri: uri.clone(),
                line: params.range.start.line,
                character: params.range.start.character,
            }
        })?;
        let language_id = document.snapshot.language_id.clone();
        let request = CodeActionRequest {
            document,
            range,
            context: params.context,
            cancel,
        };
        let actions: Vec<CodeActionOrCommand> = self
            .bus
            .code_action
            .collect(request, for_language(&language_id))
            .await
            .into_iter()
            .flatten()
            .collect();
        Ok((!actions.is_empty()).then_some(actions))
    }

    pub async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> anyhow::Result<Option<SemanticTokensResult>> {
        let uri = params.text_document.uri;
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let document = self.analyze(&uri).await?;
        let language_id = document.snapshot.language_id.clone();
        let request = DocumentRequest { document, cancel };
        let tokens = self
            .bus
            .semantic_tokens_full
            .collect(request, for_language(&language_id))
            .await
            .into_iter()
            .flatten()
            .next();
        Ok(tokens.map(SemanticTokensResult::Tokens))
    }

    pub async fn execute_command(&self, params: ExecuteCommandParams) -> Result<CommandOutput, CommandError> {
        log::debug!("Executing {}", params.command);
        self.bus.commands.execute(&params.command, params.arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticIntrospector;
    use crate::ROBOT_LANGUAGE_ID;

    fn state() -> WorldState {
        WorldState::with_collaborators(
            ServerConfig::default(),
            Arc::new(SpaceSeparatedParser::new()),
            Arc::new(StaticIntrospector::new()),
        )
        .unwrap()
    }

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///workspace/{}", name)).unwrap()
    }

    async fn open(state: &WorldState, uri: &Url, text: &str) {
        state
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri.clone(),
                    language_id: ROBOT_LANGUAGE_ID.to_string(),
                    version: 1,
                    text: text.to_string(),
                },
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_capabilities_union_registered_handlers() {
        let caps = state().capabilities();
        let completion = caps.completion_provider.unwrap();
        assert!(completion.trigger_characters.unwrap().contains(&"$".to_string()));
        assert!(completion.all_commit_characters.is_none());
        let commands = caps.execute_command_provider.unwrap().commands;
        assert_eq!(commands, vec!["rfls.showDocumentation", "rfls.createKeyword"]);
        let Some(CodeActionProviderCapability::Options(actions)) = caps.code_action_provider else {
            panic!("expected code action options");
        };
        assert_eq!(actions.code_action_kinds.unwrap().len(), 2);
        let signature_help = caps.signature_help_provider.unwrap();
        assert_eq!(signature_help.trigger_characters.unwrap(), vec![" ", "\t"]);
        assert!(caps.hover_provider.is_some());
        assert!(caps.document_highlight_provider.is_some());
    }

    #[test]
    fn test_initialize_reads_link_support() {
        let state = state();
        let params = InitializeParams {
            capabilities: ClientCapabilities {
                text_document: Some(TextDocumentClientCapabilities {
                    declaration: Some(GotoCapability {
                        dynamic_registration: None,
                        link_support: Some(true),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            initialization_options: Some(serde_json::json!({ "rfls": { "sync": "full" } })),
            ..Default::default()
        };
        let result = state.initialize(&params);
        assert!(state.link_support());
        let Some(TextDocumentSyncCapability::Options(sync)) = result.capabilities.text_document_sync else {
            panic!("expected sync options");
        };
        assert_eq!(sync.change, Some(TextDocumentSyncKind::FULL));
    }

    #[tokio::test]
    async fn test_sync_kind_is_fixed_after_initialize() {
        let state = state();
        state.initialize(&InitializeParams::default());
        state.update_config(&serde_json::json!({ "rfls": { "sync": "full", "completion": { "debounceMs": 5 } } }));
        assert_eq!(state.config().sync_kind, TextDocumentSyncKind::INCREMENTAL);
        assert_eq!(state.config().completion_debounce_ms, 5);

        let uri = uri("suite.robot");
        open(&state, &uri, "*** Test Cases ***\nT\n    Log    hi\n").await;
        state
            .did_change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri.clone(),
                    version: 2,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: Some(Range::new(Position::new(2, 11), Position::new(2, 13))),
                    range_length: None,
                    text: "there".to_string(),
                }],
            })
            .await
            .unwrap();
        assert_eq!(
            state.documents.snapshot(&uri).unwrap().text(),
            "*** Test Cases ***\nT\n    Log    there\n"
        );
    }

    #[test]
    fn test_sync_kind_from_initialization_options_is_honoured() {
        let state = state();
        state.update_config(&serde_json::json!({ "sync": "full" }));
        assert_eq!(state.config().sync_kind, TextDocumentSyncKind::FULL);
    }

    #[tokio::test]
    async fn test_diagnostics_through_the_bus() {
        let state = state();
        let uri = uri("suite.robot");
        open(&state, &uri, "*** Test Cases ***\nT\n    Nowhere.Log    hi\n    Log    fine\n").await;
        let (diagnostics, version) = state.diagnostics(&uri).await.unwrap();
        assert_eq!(version, Some(1));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].code,
            Some(NumberOrString::String("UnknownNamespace".to_string()))
        );
        assert_eq!(state.editor_documents(), vec![uri]);
    }

    #[tokio::test]
    async fn test_hover_and_signature_help_through_the_bus() {
        let state = state();
        let uri = uri("suite.robot");
        open(&state, &uri, "*** Test Cases ***\nT\n    Log    hi\n").await;
        let position = TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position: Position::new(2, 5),
        };
        let hover = state
            .hover(HoverParams {
                text_document_position_params: position.clone(),
                work_done_progress_params: Default::default(),
            })
            .await
            .unwrap();
        assert!(hover.is_some());

        let help = state
            .signature_help(SignatureHelpParams {
                context: None,
                text_document_position_params: TextDocumentPositionParams {
                    position: Position::new(2, 12),
                    ..position
                },
                work_done_progress_params: Default::default(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(help.active_parameter, Some(0));
        assert!(help.signatures[0].label.starts_with("Log"));
    }

    #[tokio::test]
    async fn test_close_unknown_document_is_an_error() {
        let state = state();
        let err = state
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri("missing.robot") },
            })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<DocumentError>(), Some(DocumentError::NotOpened(_))));
    }

    #[tokio::test]
    async fn test_change_to_unopened_document_is_an_error() {
        let state = state();
        let result = state
            .did_change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri("missing.robot"),
                    version: 2,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: "x".to_string(),
                }],
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_semantic_tokens_through_the_bus() {
        let state = state();
        let uri = uri("suite.robot");
        open(&state, &uri, "*** Test Cases ***\nT\n    Log    hi\n").await;
        let result = state
            .semantic_tokens_full(SemanticTokensParams {
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
                text_document: TextDocumentIdentifier { uri },
            })
            .await
            .unwrap();
        let Some(SemanticTokensResult::Tokens(tokens)) = result else {
            panic!("expected tokens");
        };
        assert!(!tokens.data.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_position_is_rejected() {
        let state = state();
        let uri = uri("suite.robot");
        open(&state, &uri, "*** Test Cases ***\n").await;
        let err = state
            .declaration(GotoDeclarationParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: Position::new(40, 0),
                },
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DocumentError>(),
            Some(DocumentError::InvalidPosition { .. })
        ));
    }

    #[tokio::test]
    async fn test_watched_change_drops_unopened_resource() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("common.resource"), "*** Keywords ***\nShared\n    No Operation\n").unwrap();
        let suite = Url::from_file_path(dir.path().join("suite.robot")).unwrap();
        let resource = Url::from_file_path(dir.path().join("common.resource")).unwrap();

        let state = state();
        open(&state, &suite, "*** Settings ***\nResource    common.resource\n").await;
        state.analyze(&suite).await.unwrap();
        assert!(state.documents.contains(&resource));

        let refresh = state
            .did_change_watched_files(DidChangeWatchedFilesParams {
                changes: vec![
                    FileEvent::new(resource.clone(), FileChangeType::CHANGED),
                    FileEvent::new(resource.clone(), FileChangeType::CHANGED),
                ],
            })
            .await;
        assert!(refresh);
        assert!(!state.documents.contains(&resource));
        let revision = state.documents.snapshot(&suite).unwrap().revision;
        assert!(state.services.resolver.cached(&suite, revision).is_none());
    }

    #[tokio::test]
    async fn test_watched_change_ignores_editor_documents() {
        let state = state();
        let uri = uri("open.resource");
        open(&state, &uri, "*** Keywords ***\nK\n    No Operation\n").await;
        state
            .did_change_watched_files(DidChangeWatchedFilesParams {
                changes: vec![FileEvent::new(uri.clone(), FileChangeType::DELETED)],
            })
            .await;
        assert!(state.documents.is_open_in_editor(&uri));
    }
}
