//! PDFX Server
//!
//! MCP server exposing `extract-document-contents`: text from PDFs and
//! images, with OCR for scanned pages. Serves many sessions over SSE, or a
//! single session over stdio.

use std::net::SocketAddr;

use anyhow::Context;
use axum::http::HeaderName;
use clap::Parser;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdfx_server::config::{Config, TransportKind};
use pdfx_server::routes;
use pdfx_server::state::AppState;
use pdfx_server::transport::{self, SESSION_HEADER};

#[derive(Debug, Parser)]
#[command(name = "pdfx-server", version, about)]
struct Cli {
    /// Address to bind (SSE transport)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (SSE transport)
    #[arg(long)]
    port: Option<u16>,

    /// Session transport
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    dotenvy::dotenv().ok();

    let transport_kind = cli.transport.unwrap_or_else(|| {
        std::env::var("PDFX_TRANSPORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(TransportKind::Sse)
    });

    // Initialize tracing; stdout belongs to the protocol in stdio mode
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pdfx_server=debug,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.server.transport = transport_kind;

    tracing::info!("Starting PDFX Server v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.pipeline.temp_dir).with_context(|| {
        format!(
            "Failed to create temp directory {}",
            config.pipeline.temp_dir.display()
        )
    })?;

    let app_state = AppState::from_config(config.clone());
    let sweeper = app_state.dispatcher().start_idle_sweeper();

    match config.server.transport {
        TransportKind::Stdio => {
            tracing::info!("Serving a single session on stdio");
            transport::stdio::run(app_state.dispatcher().clone())
                .await
                .context("stdio transport failed")?;
            app_state.shutdown().await;
        }
        TransportKind::Sse => serve_http(&config, app_state).await?,
    }

    sweeper.abort();

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn serve_http(config: &Config, app_state: AppState) -> anyhow::Result<()> {
    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_HEADER)]);

    // Build router
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("PDFX Server listening on {}", addr);
    tracing::info!("SSE endpoint: http://{}/sse", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open SSE streams only end once their sessions are closed
            app_state.shutdown().await;
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
