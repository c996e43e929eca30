//! HTTP routes
//!
//! `/config` and `/health` are read-only snapshots. `/stream` hands the
//! response body to a `StreamHandler`; query strings are never inspected.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};

use crate::broadcast::Broadcaster;
use crate::capture::{HealthMonitor, HealthSnapshot};
use crate::config::Config;
use crate::stream::StreamHandler;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    /// Immutable startup configuration
    pub config: Arc<Config>,
    /// Frame fan-out hub
    pub broadcaster: Broadcaster,
    /// Read side of the capture health channel
    pub health: HealthMonitor,
    stream_limit: Option<Arc<Semaphore>>,
}

impl AppState {
    /// Build handler state; `config.max_clients > 0` caps concurrent streams
    pub fn new(config: Arc<Config>, broadcaster: Broadcaster, health: HealthMonitor) -> Self {
        let stream_limit = if config.max_clients > 0 {
            Some(Arc::new(Semaphore::new(config.max_clients)))
        } else {
            None
        };

        Self {
            config,
            broadcaster,
            health,
            stream_limit,
        }
    }
}

/// `/health` response body
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `"ok"` or `"degraded"`
    pub status: &'static str,
    /// Whether capture is producing frames
    pub healthy: bool,
    /// Capture health, flattened into the body
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
    /// Connected stream clients
    pub subscribers: usize,
}

/// Build the router with CORS open to GET from any origin
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/stream", get(stream))
        .route("/config", get(config))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn stream(State(state): State<AppState>) -> Response {
    let permit = match &state.stream_limit {
        Some(limit) => match Arc::clone(limit).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(
                    max_clients = state.config.max_clients,
                    "Stream client rejected: limit reached"
                );
                return (StatusCode::SERVICE_UNAVAILABLE, "stream client limit reached")
                    .into_response();
            }
        },
        None => None,
    };

    let handler = StreamHandler::new(&state.broadcaster);
    match permit {
        Some(permit) => handler.with_permit(permit).into_response(),
        None => handler.into_response(),
    }
}

async fn config(State(state): State<AppState>) -> Json<Config> {
    Json(Config::clone(&state.config))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let snapshot = state.health.snapshot();
    let healthy = snapshot.is_healthy();

    let report = HealthReport {
        status: if healthy { "ok" } else { "degraded" },
        healthy,
        snapshot,
        subscribers: state.broadcaster.subscriber_count(),
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(report))
}
