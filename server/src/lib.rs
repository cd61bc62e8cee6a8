//! HTTP ingestion endpoint for link requests.
//!
//! `POST /add/` queues a JSON array of `{edition_id, archive_id}` objects and
//! `GET /status/` reports the queue counts. Both require an API key in the
//! `access_token` header whose hash is listed in the key file.

mod auth;
mod error;
mod routes;

pub use auth::API_KEY_HEADER;
pub use auth::ApiKeyFile;
pub use auth::hash_api_key;
pub use error::ApiError;
pub use routes::AddResponse;
pub use routes::PostedLink;

use axum::Router;
use axum::routing::get;
use axum::routing::post;
use backlink_state::WorkItemStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    store: Arc<WorkItemStore>,
    api_keys: ApiKeyFile,
}

impl AppState {
    pub fn new(store: Arc<WorkItemStore>, api_keys: ApiKeyFile) -> Self {
        Self { store, api_keys }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/add/", post(routes::add_links))
        .route("/add", post(routes::add_links))
        .route("/status/", get(routes::queue_status))
        .route("/status", get(routes::queue_status))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled, then finish in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "listening for link requests");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("http server stopped");
    Ok(())
}
