use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tradebot_market_data::{AcquiredQuote, PriorityClass};

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteQuery {
    priority: Option<String>,
    timeout_ms: Option<u64>,
}

impl QuoteQuery {
    fn priority(&self) -> ApiResult<PriorityClass> {
        match self.priority.as_deref() {
            None => Ok(PriorityClass::NormalEntry),
            Some(raw) => raw.parse().map_err(ApiError::BadRequest),
        }
    }

    /// Requested deadline, capped so the outer request timeout never wins.
    fn deadline(&self, cap: Duration) -> ApiResult<Duration> {
        match self.timeout_ms {
            None => Ok(cap),
            Some(0) => Err(ApiError::BadRequest(
                "timeoutMs must be greater than zero".to_string(),
            )),
            Some(ms) => Ok(Duration::from_millis(ms).min(cap)),
        }
    }
}

async fn get_quote(
    Path(symbol): Path<String>,
    Query(query): Query<QuoteQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AcquiredQuote>> {
    let priority = query.priority()?;
    let deadline = Instant::now() + query.deadline(state.default_deadline)?;

    let (result, diagnostics) = state
        .coordinator
        .get_quote_with_diagnostics(&symbol, priority, deadline)
        .await;
    if result.is_err() {
        tracing::info!("{} ({}) unavailable: {}", symbol, priority, diagnostics.summary());
    }
    Ok(Json(result?))
}

async fn get_emergency_exit_quote(
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AcquiredQuote>> {
    let acquired = state.coordinator.get_emergency_exit_quote(&symbol).await?;
    if acquired.is_stale() {
        tracing::warn!("Emergency exit for {} is using a stale price", symbol);
    }
    Ok(Json(acquired))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes/{symbol}", get(get_quote))
        .route("/quotes/{symbol}/emergency-exit", get(get_emergency_exit_quote))
}
