use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use super::api::{self, AppState};
use super::cache::DEFAULT_TTL;
use super::db::{DbHandle, ShopDb};
use super::ws;

/// Path clients subscribe to for push updates.
pub const PUSH_PATH: &str = "/ws/admin/workflow/";

/// Path for pending-count and today's-appointments updates.
pub const APPOINTMENTS_PATH: &str = "/ws/customers/appointments/";

/// Configuration for the shop server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cache_ttl: Duration,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8040,
            db_path: PathBuf::from(".shopflow/shop.db"),
            cache_ttl: DEFAULT_TTL,
            dev_mode: false,
        }
    }
}

/// Shared state over an opened database.
pub fn build_state(db: ShopDb, cache_ttl: Duration) -> Arc<AppState> {
    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    let (appointments_tx, _rx) = broadcast::channel::<String>(64);
    Arc::new(AppState::new(
        DbHandle::new(db),
        ws_tx,
        appointments_tx,
        cache_ttl,
    ))
}

/// Build the full application router: REST API plus the push socket.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let app = api::api_router()
        .route(PUSH_PATH, get(ws::ws_handler))
        .route(APPOINTMENTS_PATH, get(ws::appointments_ws_handler))
        .with_state(state);
    if dev_mode {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Serve `router` on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

/// Start the shop server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = ShopDb::new(&config.db_path).context("Failed to initialize shop database")?;
    let state = build_state(db, config.cache_ttl);
    let app = build_router(state, config.dev_mode);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        db = %config.db_path.display(),
        dev = config.dev_mode,
        "shop server listening"
    );
    println!("Shopflow running at http://{}", local_addr);

    serve(listener, app, shutdown_signal()).await?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
