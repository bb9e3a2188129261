use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tradebot_market_data::AcquisitionStatus;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(flatten)]
    status: AcquisitionStatus,
    generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetResponse {
    source_id: String,
    reset: bool,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.coordinator.status(),
        generated_at: Utc::now(),
    })
}

async fn reset_source(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ResetResponse>> {
    if !state.coordinator.reset_source(&id) {
        return Err(ApiError::NotFound(format!("Unknown source: {}", id)));
    }
    tracing::info!("Circuit breaker for {} reset by operator", id);
    Ok(Json(ResetResponse {
        source_id: id,
        reset: true,
    }))
}

async fn reset_all_sources(State(state): State<Arc<AppState>>) -> Json<AcquisitionStatus> {
    state.coordinator.reset_all_sources();
    tracing::info!("All circuit breakers reset by operator");
    Json(state.coordinator.status())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_status))
        .route("/sources/reset", post(reset_all_sources))
        .route("/sources/{id}/reset", post(reset_source))
}
