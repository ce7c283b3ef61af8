//! Local query API.

mod handlers;

pub use handlers::*;

use crate::scheduler::Scheduler;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    /// File re-read by `POST /api/reload`.
    pub config_path: PathBuf,
}

/// HTTP server for interactive status queries.
pub struct Server {
    state: AppState,
    port: u16,
}

impl Server {
    pub fn new(scheduler: Arc<Scheduler>, config_path: PathBuf, port: u16) -> Self {
        Self {
            state: AppState {
                scheduler,
                config_path,
            },
            port,
        }
    }

    /// Start the server and run until `shutdown` completes.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let router = routes(self.state.clone());

        tracing::info!("Query API listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Build the router with all routes.
pub fn routes(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/api/targets", get(handlers::handle_get_targets))
        .route("/api/targets/{name}/status", get(handlers::handle_status))
        .route("/api/targets/{name}/chart", get(handlers::handle_chart))
        .route(
            "/api/targets/{name}/reply/{channel_id}",
            post(handlers::handle_reply),
        )
        .route("/api/refresh", post(handlers::handle_refresh))
        .route("/api/reload", post(handlers::handle_reload))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
