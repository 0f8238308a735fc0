use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    gateway_reachable: bool,
    breaker_engaged: bool,
    last_recompute_at: Option<chrono::DateTime<chrono::Utc>>,
    uptime_seconds: i64,
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Unauthenticated per §6 / auth_middleware's exemption list. Reports
/// gateway reachability, breaker engagement, and last recompute time so
/// an operator can tell "up" from "up but stale" at a glance.
async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let gateway_reachable = state.gateway.store.get_breaker_state().await.is_ok();
    let breaker = state.engine_ctx.breaker_snapshot().await;
    let last_recompute_at: Option<chrono::DateTime<chrono::Utc>> =
        state.gateway.cache.get_json::<bias_core::CompositeResult>(gateway::keys::BIAS_COMPOSITE_LATEST).map(|c| c.computed_at);

    Json(HealthBody {
        gateway_reachable,
        breaker_engaged: breaker.is_engaged(),
        last_recompute_at,
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}
