//
// backend.rs
//
// Language server protocol front end over the world state
//

use std::sync::Arc;

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::config::ServerConfig;
use crate::error::to_jsonrpc;
use crate::perf;
use crate::state::WorldState;

const WATCHED_GLOBS: [&str; 4] = ["**/*.robot", "**/*.resource", "**/*.libspec.json", "**/*.json"];

pub struct Backend {
    client: Client,
    state: Arc<WorldState>,
}

impl Backend {
    pub fn new(client: Client, state: Arc<WorldState>) -> Self {
        Self { client, state }
    }

    /// Report the outcome of a synchronization notification.
    ///
    /// Notifications have no response, so errors go to the log and to the
    /// user.
    async fn after_sync(&self, method: &str, uri: &Url, outcome: anyhow::Result<bool>) {
        match outcome {
            Ok(refresh) => {
                if self.state.documents.is_open_in_editor(uri) {
                    self.publish_diagnostics(uri).await;
                }
                if refresh {
                    self.refresh_dependents(Some(uri)).await;
                }
            }
            Err(err) => {
                log::error!("{}: {:#}", method, err);
                self.client
                    .show_message(MessageType::ERROR, format!("rfls: {}: {:#}", method, err))
                    .await;
            }
        }
    }

    async fn publish_diagnostics(&self, uri: &Url) {
        match self.state.diagnostics(uri).await {
            Ok((diagnostics, version)) => {
                let current = self.state.documents.version(uri);
                if current != version {
                    log::trace!(
                        "Skipping diagnostics for {}: version changed (was {:?}, now {:?})",
                        uri,
                        version,
                        current
                    );
                    return;
                }
                self.client.publish_diagnostics(uri.clone(), diagnostics, version).await;
            }
            Err(err) => log::warn!("Diagnostics for {} failed: {:#}", uri, err),
        }
    }

    /// Other documents may resolve differently now: re-highlight them and
    /// republish their diagnostics.
    async fn refresh_dependents(&self, changed: Option<&Url>) {
        self.refresh_semantic_tokens().await;
        for uri in self.state.editor_documents() {
            if Some(&uri) != changed {
                self.publish_diagnostics(&uri).await;
            }
        }
    }

    async fn refresh_semantic_tokens(&self) {
        if let Err(err) = self.client.semantic_tokens_refresh().await {
            log::debug!("semanticTokens/refresh not delivered: {}", err);
        }
    }

    async fn register_file_watchers(&self) {
        let watchers = WATCHED_GLOBS
            .iter()
            .map(|glob| FileSystemWatcher {
                glob_pattern: GlobPattern::String(glob.to_string()),
                kind: None,
            })
            .collect();
        let options = DidChangeWatchedFilesRegistrationOptions { watchers };
        let registration = Registration {
            id: "rfls-watched-files".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(options).ok(),
        };
        if let Err(err) = self.client.register_capability(vec![registration]).await {
            log::warn!("Could not register file watchers: {}", err);
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        log::info!("Initializing rfls");
        Ok(self.state.initialize(&params))
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("rfls initialized");
        self.register_file_watchers().await;
    }

    async fn shutdown(&self) -> Result<()> {
        log::info!("rfls shutting down");
        perf::log_summary();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let outcome = self.state.did_open(params).await;
        self.after_sync("textDocument/didOpen", &uri, outcome).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let outcome = self.state.did_change(params).await;
        self.after_sync("textDocument/didChange", &uri, outcome).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let outcome = self.state.did_close(params).await;
        if outcome.is_ok() {
            self.client.publish_diagnostics(uri.clone(), Vec::new(), None).await;
        }
        self.after_sync("textDocument/didClose", &uri, outcome).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        let outcome = self.state.did_save(params).await;
        self.after_sync("textDocument/didSave", &uri, outcome).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        log::trace!("Configuration changed");
        self.state.update_config(&params.settings);
        self.refresh_dependents(None).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        if self.state.did_change_watched_files(params).await {
            self.refresh_dependents(None).await;
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        self.state.completion(params).await.map_err(to_jsonrpc)
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        self.state.completion_resolve(item).await.map_err(to_jsonrpc)
    }

    async fn goto_declaration(
        &self,
        params: request::GotoDeclarationParams,
    ) -> Result<Option<request::GotoDeclarationResponse>> {
        self.state.declaration(params).await.map_err(to_jsonrpc)
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        self.state.hover(params).await.map_err(to_jsonrpc)
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        self.state.signature_help(params).await.map_err(to_jsonrpc)
    }

    async fn document_highlight(&self, params: DocumentHighlightParams) -> Result<Option<Vec<DocumentHighlight>>> {
        self.state.document_highlight(params).await.map_err(to_jsonrpc)
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        self.state.code_action(params).await.map_err(to_jsonrpc)
    }

    async fn semantic_tokens_full(&self, params: SemanticTokensParams) -> Result<Option<SemanticTokensResult>> {
        self.state.semantic_tokens_full(params).await.map_err(to_jsonrpc)
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<serde_json::Value>> {
        let output = self.state.execute_command(params).await?;
        if let Some(edit) = output.edit {
            let response = self.client.apply_edit(edit).await?;
            if !response.applied {
                log::warn!(
                    "Client rejected workspace edit: {}",
                    response.failure_reason.unwrap_or_default()
                );
            }
        }
        Ok(output.value)
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let state = Arc::new(WorldState::new(ServerConfig::default())?);
    let (service, socket) = LspService::build(move |client| Backend::new(client, Arc::clone(&state))).finish();
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
