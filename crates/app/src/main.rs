mod routes;

use clap::Parser;
use pdf_rag_core::{AppConfig, PdfTextExtractor, RagPipeline, VectorIndex};
use routes::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag-server", version)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let embedder = config.build_embedder();
    let blob = config.build_blob_store();
    let index = config.build_vector_index();

    index
        .ensure_schema()
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let pipeline = RagPipeline::new(PdfTextExtractor, embedder, blob, index, config.chunking);
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %addr,
        "pdf-rag-server boot"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to install ctrl-c handler");
    }
}
