// SPDX-License-Identifier: GPL-3.0-only

//! HTTP control plane
//!
//! | route | method | action |
//! |---|---|---|
//! | `/health` | GET | liveness plus pipeline state |
//! | `/stats` | GET | statistics snapshot |
//! | `/config` | GET | current configuration |
//! | `/config` | POST | partial configuration update |
//! | `/get` | GET | cameras and encoders |
//! | `/get/{device}` | GET | resolutions of one camera |
//!
//! Every response carries `Access-Control-Allow-Origin: *`.

mod server;

pub use server::spawn;

use crate::capabilities::CapabilityProvider;
use crate::config::ConfigUpdate;
use crate::controller::ControlHandle;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// State shared by all handlers
#[derive(Clone)]
pub struct ApiState {
    pub control: ControlHandle,
    pub capabilities: Arc<dyn CapabilityProvider>,
}

impl ApiState {
    pub fn new(control: ControlHandle, capabilities: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            control,
            capabilities,
        }
    }
}

/// Build the control plane router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/config", get(get_config).post(post_config))
        .route("/get", get(list_capabilities))
        .route("/get/{*device}", get(device_capabilities))
        .fallback(not_found)
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let status = state.control.status();
    Json(json!({
        "status": "healthy",
        "pipeline": status.lifecycle.to_string(),
        "encoder": status.encoder,
    }))
}

async fn stats(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.control.stats())
}

async fn get_config(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.control.config())
}

async fn post_config(State(state): State<ApiState>, body: Bytes) -> Response {
    let update = match ConfigUpdate::from_json(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Rejected configuration update");
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid JSON"}))).into_response();
        }
    };

    let control = state.control.clone();
    match tokio::task::spawn_blocking(move || control.apply_update(&update)).await {
        Ok(class) => {
            debug!(change = ?class, "Configuration update applied");
            Json(json!({"status": "configuration updated"})).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Configuration update task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal Error"})),
            )
                .into_response()
        }
    }
}

async fn list_capabilities(State(state): State<ApiState>) -> Response {
    let provider = Arc::clone(&state.capabilities);
    let listing = tokio::task::spawn_blocking(move || (provider.cameras(), provider.encoders())).await;

    match listing {
        Ok((cameras, encoders)) => Json(json!({
            "cameras": cameras,
            "encoders": encoders,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Capability listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal Error"})),
            )
                .into_response()
        }
    }
}

async fn device_capabilities(
    State(state): State<ApiState>,
    Path(device): Path<String>,
) -> Response {
    let provider = Arc::clone(&state.capabilities);
    let name = device.clone();
    match tokio::task::spawn_blocking(move || provider.resolutions(&name)).await {
        Ok(resolutions) => Json(json!({
            "camera": device,
            "supported_resolutions": resolutions,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, device = %device, "Resolution probe failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal Error"})),
            )
                .into_response()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not Found"})))
}
