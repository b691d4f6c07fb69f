//! HTTP surface of the gateway
//!
//! - `POST /replace` - rotate to a fresh worker
//! - everything else  - forwarded verbatim to the active worker

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use llmgate_core::{Registry, Result};

use crate::proxy;
use crate::replace::{ReplacementController, RotationOutcome};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Active-worker registry
    pub registry: Arc<Registry>,

    /// Rotation controller
    pub controller: Arc<ReplacementController>,

    /// Outbound HTTP client for proxied requests
    pub client: reqwest::Client,

    /// Port the workers serve on
    pub worker_port: u16,
}

impl AppState {
    /// Create a new AppState
    pub fn new(
        registry: Arc<Registry>,
        controller: Arc<ReplacementController>,
        worker_port: u16,
    ) -> Result<Self> {
        // Redirects pass through to the caller rather than being chased.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            registry,
            controller,
            client,
            worker_port,
        })
    }
}

/// Build the gateway router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/replace", post(trigger_replace))
        // Every other method/path is proxied to the active worker.
        .fallback(proxy::forward)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Administrative trigger for worker rotation.
///
/// Blocks for the full rotation (bounded by the readiness stall timeout)
/// and reports the outcome. Concurrent triggers collapse into the rotation
/// already in progress.
async fn trigger_replace(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.replace().await {
        Ok(RotationOutcome::Completed { worker }) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "replaced", "worker": worker })),
        ),
        Ok(RotationOutcome::InProgress) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "status": "rotation already in progress" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Worker rotation failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "status": "failed", "error": e.to_string() })),
            )
        }
    }
}
