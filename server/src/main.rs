use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use batch_converter_core::batch::{Converter, ConverterParts};
use batch_converter_core::config::ConversionConfig;
use batch_converter_core::notify::CollectingNotifier;
use batch_converter_core::store::{JsonFileStore, KeyValueStore, MemoryStore};

mod handlers;

/// Uploads are whole videos; axum's 2 MB default is far too small.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

use handlers::AppState;

fn open_store() -> Result<Arc<dyn KeyValueStore>> {
    match std::env::var_os("BATCH_CONVERTER_STATE") {
        Some(path) => {
            let store = JsonFileStore::open(&path)
                .with_context(|| format!("Failed to open state file {}", path.to_string_lossy()))?;
            log::info!("Persisting history and stats to {}", store.path().display());
            Ok(Arc::new(store))
        }
        None => {
            log::info!("BATCH_CONVERTER_STATE not set, history and stats are kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let notifier = Arc::new(CollectingNotifier::new());
    let converter = Converter::new(
        ConversionConfig::default(),
        ConverterParts::new(open_store()?, notifier.clone()),
    );
    let state = AppState {
        converter: Arc::new(Mutex::new(converter)),
        notifier,
    };

    // Build router
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/convert", post(handlers::convert))
        .route("/history", get(handlers::history).delete(handlers::clear_history))
        .route("/stats", get(handlers::stats))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Server address
    let addr = std::env::var("BATCH_CONVERTER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    log::info!("Batch Converter Server running on http://{}", addr);
    log::info!("API endpoints:");
    log::info!("   POST   /convert - Convert uploaded images/videos");
    log::info!("   GET    /history - Recent conversions");
    log::info!("   DELETE /history - Clear conversion history");
    log::info!("   GET    /stats   - Usage counters");
    log::info!("   GET    /health  - Health check");

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn root() -> &'static str {
    "Batch Converter Server v0.1.0\n\nAPI Endpoints:\n  POST   /convert\n  GET    /history\n  DELETE /history\n  GET    /stats\n  GET    /health\n"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
