//! LSP server for INTERLIS.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::analysis::DocumentStore;
use crate::compiler::{CommandCompiler, CompilationCache, Compiler};
use crate::config::ClientSettings;
use crate::discovery::{ModelDiscovery, RepositoryModelDiscovery};
use crate::error::FeatureResult;
use crate::handlers::{self, FeatureContext};
use crate::uri::{read_document, to_filesystem_path};

/// State shared between the protocol handlers and blocking feature work.
struct ServerState {
    documents: DocumentStore,
    cache: CompilationCache,
    compiler: Arc<dyn Compiler>,
    discovery: Arc<dyn ModelDiscovery>,
    settings: RwLock<ClientSettings>,
}

/// INTERLIS Language Server.
pub struct InterlisLanguageServer {
    /// LSP client for sending notifications
    client: Client,
    state: Arc<ServerState>,
}

impl InterlisLanguageServer {
    /// Create a server using the external compiler and configured
    /// repositories.
    pub fn new(client: Client) -> Self {
        Self::with_services(
            client,
            Arc::new(CommandCompiler::new()),
            Arc::new(RepositoryModelDiscovery::new()),
        )
    }

    /// Create a server with explicit compiler and discovery services.
    pub fn with_services(
        client: Client,
        compiler: Arc<dyn Compiler>,
        discovery: Arc<dyn ModelDiscovery>,
    ) -> Self {
        Self {
            client,
            state: Arc::new(ServerState {
                documents: DocumentStore::new(),
                cache: CompilationCache::new(),
                compiler,
                discovery,
                settings: RwLock::new(ClientSettings::default()),
            }),
        }
    }

    /// Run a feature on the blocking pool.
    ///
    /// Dropping the returned future (client cancellation) fires the token the
    /// feature polls.
    async fn run_feature<T, F>(&self, name: &'static str, feature: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FeatureContext<'_>, &dyn ModelDiscovery) -> FeatureResult<T> + Send + 'static,
    {
        let token = CancellationToken::new();
        let _guard = token.clone().drop_guard();
        let settings = self.state.settings.read().await.clone();
        let state = Arc::clone(&self.state);

        let task = tokio::task::spawn_blocking(move || {
            let ctx = FeatureContext {
                documents: &state.documents,
                cache: &state.cache,
                compiler: state.compiler.as_ref(),
                settings: &settings,
                cancel: &token,
            };
            feature(&ctx, state.discovery.as_ref())
        });

        match task.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_cancelled() {
                    tracing::debug!("{} cancelled", name);
                } else {
                    tracing::warn!("{} failed: {}", name, e);
                }
                Err(e.into())
            }
            Err(e) => {
                tracing::error!("{} panicked: {}", name, e);
                Err(Error::internal_error())
            }
        }
    }

    /// Compile a document and publish its diagnostics.
    async fn validate(&self, uri: Url) {
        let Some(path) = to_filesystem_path(uri.as_str()) else {
            return;
        };
        let version = self.state.documents.get_version(&uri);
        let settings = self.state.settings.read().await.clone();
        let state = Arc::clone(&self.state);
        let task_uri = uri.clone();

        let task = tokio::task::spawn_blocking(move || {
            let outcome = state.cache.get_or_compile(
                task_uri.as_str(),
                state.compiler.as_ref(),
                &settings,
                &CancellationToken::new(),
            )?;
            let text = match state.documents.get_text(&task_uri) {
                Some(text) => text.to_string(),
                None => read_document(&task_uri).unwrap_or_default(),
            };
            Ok::<_, crate::error::FeatureError>(handlers::diagnostics::to_diagnostics(
                &outcome, &path, &text,
            ))
        });

        match task.await {
            Ok(Ok(diagnostics)) => {
                tracing::debug!("Publishing {} diagnostics for {}", diagnostics.len(), uri);
                self.client
                    .publish_diagnostics(uri, diagnostics, version)
                    .await;
            }
            Ok(Err(e)) => tracing::warn!("Validation of {} failed: {}", uri, e),
            Err(e) => tracing::error!("Validation of {} panicked: {}", uri, e),
        }
    }

    /// Apply new settings; a changed compiler or repository set drops the
    /// compilation cache.
    async fn apply_settings(&self, settings: ClientSettings) {
        {
            let mut current = self.state.settings.write().await;
            let changed = current.repository_key() != settings.repository_key()
                || current.compiler_command() != settings.compiler_command();
            if changed {
                tracing::info!("Settings changed, clearing compilation cache");
                self.state.cache.clear();
            }
            *current = settings.clone();
        }

        let discovery = Arc::clone(&self.state.discovery);
        tokio::spawn(async move {
            discovery.refresh(&settings).await;
        });
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for InterlisLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        tracing::info!("Initializing INTERLIS Language Server");
        self.apply_settings(ClientSettings::from_value(
            params.initialization_options.as_ref(),
        ))
        .await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                position_encoding: Some(PositionEncodingKind::UTF16),
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![".".to_string(), ":".to_string()]),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Left(true)),
                document_on_type_formatting_provider: Some(DocumentOnTypeFormattingOptions {
                    first_trigger_character: "=".to_string(),
                    more_trigger_character: None,
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "interlis-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::info!("INTERLIS Language Server initialized");
        self.client
            .log_message(MessageType::INFO, "INTERLIS Language Server ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down INTERLIS Language Server");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        tracing::debug!("Document opened: {}", doc.uri);
        self.state
            .documents
            .open(doc.uri.clone(), &doc.text, Some(doc.version));
        self.validate(doc.uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        tracing::debug!("Document changed: {}", params.text_document.uri);
        self.state.documents.apply_patch(
            &params.text_document.uri,
            Some(params.text_document.version),
            &params.content_changes,
        );
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!("Document saved: {}", uri);
        self.state.cache.invalidate(uri.as_str());
        self.validate(uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!("Document closed: {}", uri);
        self.state.documents.close(&uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        tracing::debug!("Configuration changed");
        self.apply_settings(ClientSettings::from_value(Some(&params.settings)))
            .await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let items = self
            .run_feature("completion", move |ctx, discovery| {
                handlers::completion::get_completions(ctx, discovery, &uri, position)
            })
            .await?;
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        self.run_feature("definition", move |ctx, _| {
            handlers::goto_definition::goto_definition(ctx, &uri, position)
        })
        .await
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let new_name = params.new_name;

        let edit = self
            .run_feature("rename", move |ctx, _| {
                handlers::rename::rename(ctx, &uri, position, &new_name)
            })
            .await?;
        Ok(Some(edit))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;

        let symbols = self
            .run_feature("documentSymbol", move |ctx, _| {
                handlers::symbols::get_document_symbols(ctx, &uri)
            })
            .await?;
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn on_type_formatting(
        &self,
        params: DocumentOnTypeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let ch = params.ch;

        let edits = self
            .run_feature("onTypeFormatting", move |ctx, _| {
                let Some(text) = ctx.document_text(&uri)? else {
                    return Ok(vec![]);
                };
                let edits = handlers::auto_close::on_type_edits(&text, position, &ch);
                if ctx.settings.strip_caret_sentinel {
                    Ok(handlers::auto_close::strip_caret(edits))
                } else {
                    Ok(edits)
                }
            })
            .await?;

        if edits.is_empty() {
            Ok(None)
        } else {
            Ok(Some(edits))
        }
    }
}
