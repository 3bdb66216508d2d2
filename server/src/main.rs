use anyhow::Result;
use clap::Parser;
use sift_core::EngineConfig;
use sift_server::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// Serve search, suggestions and moderation over HTTP.
#[derive(Parser)]
struct Args {
    /// Index directory; created on first start
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Token required in X-ADMIN-TOKEN for ingestion and moderation routes
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,
    /// Blobs per content bucket; only used when the index is created
    #[arg(long, default_value_t = EngineConfig::default().bucket_size)]
    bucket_size: u32,
    /// Do not keep compressed full content for newly ingested documents
    #[arg(long)]
    no_content: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = EngineConfig {
        bucket_size: args.bucket_size,
        store_content: !args.no_content,
        ..EngineConfig::default()
    };
    let state = AppState::open(&args.index, config, args.admin_token)?;
    if state.admin_token.is_none() {
        tracing::warn!("no admin token configured; admin routes will reject every request");
    }
    let stats = state.engine.stats()?;
    let engine = state.engine.clone();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        index = %args.index.display(),
        documents = stats.documents,
        terms = stats.terms,
        "server listening"
    );
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    engine.flush()?;
    Ok(())
}
