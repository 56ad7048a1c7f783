use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::json;

use crate::adapter::{AdapterStatus, InitOptions};
use crate::http::server::AppState;
use crate::sync::SyncError;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type HandlerError = (StatusCode, Json<ErrorBody>);

fn failed(error: SyncError) -> HandlerError {
    tracing::error!(%error, "Admin-triggered pass failed");
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}

pub async fn get_status(State(state): State<AppState>) -> Json<AdapterStatus> {
    Json(state.adapter.status())
}

/// Runs the pass to completion before answering.
pub async fn post_resync(
    State(state): State<AppState>,
    Json(options): Json<InitOptions>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    tracing::info!(?options, "Resync requested");
    state.adapter.resync(&options).await.map_err(failed)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn post_events(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let handled = state.adapter.process_webhooks().await.map_err(failed)?;
    Ok(Json(json!({ "handled": handled })))
}

pub async fn delete_consumers(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    tracing::warn!("Consumer wipe requested");
    let deleted = state.adapter.wipe_consumers().await.map_err(failed)?;
    Ok(Json(json!({ "deleted": deleted })))
}
