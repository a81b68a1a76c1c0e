//! pdfedit server
//!
//! HTTP front end for uploading PDFs, previewing pages, committing text
//! replacements, overlays and metadata edits, and exporting the result as
//! PDF, DOCX, or a zip of page images.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::header,
    routing::{get, post},
    Router,
};
use clap::Parser;
use pdfedit_core::{
    LopdfEngine, PdfEditor, PdfiumRasterizer, Rasterizer, Storage, StorageConfig,
    UnavailableRasterizer,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;

use api::{
    handle_download, handle_edit, handle_export, handle_health, handle_metadata, handle_page_count,
    handle_preview, handle_preview_after_edits, handle_upload,
};

/// Command-line arguments for the pdfedit server
#[derive(Parser, Debug)]
#[command(name = "pdfedit-server")]
#[command(about = "PDF edit, preview, and export server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory holding the uploads/ and processed/ areas
    #[arg(long, env = "PDFEDIT_STORAGE_ROOT", default_value = "./storage")]
    storage_root: PathBuf,

    /// Largest accepted request body, in megabytes
    #[arg(long, default_value = "100")]
    max_upload_mb: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub editor: Arc<PdfEditor<LopdfEngine>>,
}

/// Build the router with all API routes and middleware
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/pdf/upload", post(handle_upload))
        .route("/api/pdf/pagecount/:file_name", get(handle_page_count))
        .route("/api/pdf/preview/:file_name", get(handle_preview))
        .route("/api/pdf/edit", post(handle_edit))
        .route("/api/pdf/export", post(handle_export))
        .route("/api/pdf/download/:file_name", get(handle_download))
        .route("/api/pdf/preview-after-edits", post(handle_preview_after_edits))
        .route("/api/pdf/metadata/:file_name", get(handle_metadata))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn rasterizer() -> Arc<dyn Rasterizer> {
    match PdfiumRasterizer::new() {
        Ok(pdfium) => Arc::new(pdfium),
        Err(e) => {
            warn!("Page rendering disabled: {}", e);
            Arc::new(UnavailableRasterizer::new(e.to_string()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Storage areas and engine
    let storage = Storage::open(&StorageConfig {
        root: args.storage_root.clone(),
    })?;
    let editor = PdfEditor::new(storage, LopdfEngine::new(rasterizer()));
    let state = AppState {
        editor: Arc::new(editor),
    };

    // Build router
    let app = build_router(state, args.max_upload_mb * 1024 * 1024);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Storage root: {}", args.storage_root.display());

    axum::serve(listener, app).await?;

    Ok(())
}
