//! INTERLIS Language Server - Main entry point
//!
//! Provides LSP support for INTERLIS models with:
//! - Diagnostics from the external model compiler
//! - Cross-file rename of model elements
//! - Completion for IMPORTS lists and type references
//! - Auto-closing of CLASS/STRUCTURE/TOPIC/MODEL headers on `=`

use interlis_lsp::server::InterlisLanguageServer;
use tower_lsp::{LspService, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Setup logging to stderr (LSP uses stdout for protocol)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interlis_lsp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting INTERLIS Language Server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(InterlisLanguageServer::new);

    Server::new(stdin, stdout, socket).serve(service).await;
}
