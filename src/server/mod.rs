//! Download gateway
//!
//! Serves `GET /stream/{token}/{id}/{name}` and a health probe. The only
//! state is the storage channel and the link secret, both injected.

mod error;
mod stream;

pub use error::AppError;
pub use stream::{content_disposition, stream_file};

use crate::config::ServerConfig;
use crate::crypto::LinkSecret;
use crate::error::Result;
use crate::storage::StorageChannel;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    storage: Arc<dyn StorageChannel>,
    secret: Arc<LinkSecret>,
}

impl AppState {
    /// Create the gateway state
    pub fn new(storage: Arc<dyn StorageChannel>, secret: LinkSecret) -> Self {
        AppState {
            storage,
            secret: Arc::new(secret),
        }
    }

    /// Storage the files are fetched from
    pub fn storage(&self) -> &dyn StorageChannel {
        self.storage.as_ref()
    }

    /// Secret the link tokens are checked against
    pub fn secret(&self) -> &LinkSecret {
        &self.secret
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    storage_connected: bool,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        storage_connected: state.storage().is_connected(),
    })
}

/// Build the gateway router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream/:token/:id/:name", get(stream_file))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(config: &ServerConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
    info!("Server running on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_storage_state() {
        let store = Arc::new(MemoryStore::default());
        let app = router(AppState::new(store.clone(), LinkSecret::from("k")));

        store.set_connected(false);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["storage_connected"], false);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = router(AppState::new(
            Arc::new(MemoryStore::default()),
            LinkSecret::from("k"),
        ));

        let req = Request::builder()
            .uri("/stream/only-a-token")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn app_error_statuses() {
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::Busy.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
