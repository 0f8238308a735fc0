use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use bias_core::{CompositeResult, Signal};
use chrono::{DateTime, Utc};
use gateway::{keys, HitRateRow};
use serde::Deserialize;

use crate::error::{ApiResponse, AppError};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/composite", get(get_composite))
        .route("/signals", get(get_signals))
        .route("/outcomes/hit-rates", get(get_hit_rates))
}

async fn get_composite(State(state): State<AppState>) -> Result<Json<ApiResponse<CompositeResult>>, AppError> {
    match state.gateway.cache.get_json::<CompositeResult>(keys::BIAS_COMPOSITE_LATEST) {
        Some(composite) => Ok(Json(ApiResponse::success(composite))),
        None => Err(AppError::not_found("no composite has been computed yet")),
    }
}

#[derive(Deserialize)]
struct SignalsQuery {
    symbol: Option<String>,
    #[serde(rename = "type")]
    signal_type: Option<String>,
    since: Option<DateTime<Utc>>,
}

async fn get_signals(
    State(state): State<AppState>,
    Query(query): Query<SignalsQuery>,
) -> Result<Json<ApiResponse<Vec<Signal>>>, AppError> {
    let signals = state
        .gateway
        .store
        .active_signals(query.symbol.as_deref(), query.signal_type.as_deref(), query.since)
        .await?;
    Ok(Json(ApiResponse::success(signals)))
}

async fn get_hit_rates(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<HitRateRow>>>, AppError> {
    let rows = state.gateway.store.hit_rates_by_type_zone().await?;
    Ok(Json(ApiResponse::success(rows)))
}
