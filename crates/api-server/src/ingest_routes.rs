use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use bias_core::{
    BiasLevel, BreakerTrigger, CompositeResult, Direction, FactorReading, ReadingSource, TimestampSource,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_scorer::CandidateSignal;

use crate::error::{ApiResponse, AppError};
use crate::state::AppState;

pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest/factor", post(ingest_factor))
        .route("/ingest/breaker", post(ingest_breaker))
        .route("/ingest/signal", post(ingest_signal))
}

#[derive(Deserialize)]
struct FactorUpdateRequest {
    factor_id: String,
    score: f64,
    /// Producer-supplied bias label; derived from `score` when omitted.
    #[serde(default)]
    signal: Option<String>,
    #[serde(default)]
    detail: String,
    source: String,
    #[serde(default)]
    observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    raw: serde_json::Value,
    producer_id: String,
}

#[derive(Serialize)]
struct FactorUpdateResponse {
    accepted: bool,
    reason: Option<String>,
    composite: Option<CompositeResult>,
}

fn parse_reading_source(s: &str) -> Result<ReadingSource, AppError> {
    Ok(match s {
        "SCHEDULED_PULL" => ReadingSource::ScheduledPull,
        "WEBHOOK" => ReadingSource::Webhook,
        "MANUAL" => ReadingSource::Manual,
        "FALLBACK_CACHE" => ReadingSource::FallbackCache,
        other => return Err(AppError::not_found(format!("unknown reading source '{other}'"))),
    })
}

fn parse_bias_level(s: &str) -> Option<BiasLevel> {
    Some(match s {
        "URSA_MAJOR" => BiasLevel::UrsaMajor,
        "URSA_MINOR" => BiasLevel::UrsaMinor,
        "NEUTRAL" => BiasLevel::Neutral,
        "TORO_MINOR" => BiasLevel::ToroMinor,
        "TORO_MAJOR" => BiasLevel::ToroMajor,
        _ => return None,
    })
}

async fn ingest_factor(
    State(state): State<AppState>,
    Json(req): Json<FactorUpdateRequest>,
) -> Result<Json<ApiResponse<FactorUpdateResponse>>, AppError> {
    let source = parse_reading_source(&req.source)?;
    let signal_label = req
        .signal
        .as_deref()
        .and_then(parse_bias_level)
        .unwrap_or_else(|| BiasLevel::from_score(req.score));

    let now = Utc::now();
    let reading = FactorReading {
        factor_id: req.factor_id.as_str().into(),
        score: req.score,
        signal_label,
        detail: req.detail,
        source,
        observed_at: req.observed_at,
        ingested_at: now,
        raw: req.raw,
        timestamp_source: if req.observed_at.is_none() && matches!(source, ReadingSource::Webhook) {
            TimestampSource::IngestionFallback
        } else {
            TimestampSource::SourceEvent
        },
    };

    let outcome = state.ingestion.ingest(reading, &req.producer_id).await;
    let composite = state.gateway.cache.get_json::<CompositeResult>(gateway::keys::BIAS_COMPOSITE_LATEST);

    Ok(Json(ApiResponse::success(FactorUpdateResponse {
        accepted: outcome.accepted,
        reason: outcome.rejected_reason,
        composite,
    })))
}

#[derive(Deserialize)]
struct BreakerEventRequest {
    trigger: String,
    #[serde(default)]
    #[allow(dead_code)]
    observed_at: Option<DateTime<Utc>>,
}

fn parse_trigger(s: &str) -> Result<BreakerTrigger, AppError> {
    Ok(match s {
        "SPY_DOWN_1PCT" => BreakerTrigger::SpyDown1Pct,
        "SPY_DOWN_2PCT" => BreakerTrigger::SpyDown2Pct,
        "VIX_SPIKE" => BreakerTrigger::VixSpike,
        "VIX_EXTREME" => BreakerTrigger::VixExtreme,
        "SPY_UP_2PCT" => BreakerTrigger::SpyUp2Pct,
        "SPY_RECOVERY" => BreakerTrigger::SpyRecovery,
        other => return Err(AppError::not_found(format!("unknown breaker trigger '{other}'"))),
    })
}

/// Idempotent per §4.E: resubmitting a trigger that's already active is a
/// no-op on the resulting state. Any state change still triggers a
/// composite recompute so the clamp takes effect immediately.
async fn ingest_breaker(
    State(state): State<AppState>,
    Json(req): Json<BreakerEventRequest>,
) -> Result<Json<ApiResponse<bias_core::CircuitBreakerState>>, AppError> {
    let trigger = parse_trigger(&req.trigger)?;
    let new_state = state.engine_ctx.apply_breaker_trigger(trigger, Utc::now()).await?;
    state.recompute.trigger();
    Ok(Json(ApiResponse::success(new_state)))
}

#[derive(Deserialize)]
struct SignalIngestRequest {
    symbol: String,
    signal_type: String,
    direction: String,
    signal_source: String,
    entry: f64,
    atr: f64,
    sma20: f64,
    sma50: f64,
    sma120: f64,
    sma200: f64,
    #[serde(default)]
    rsi: Option<f64>,
    #[serde(default)]
    sector_symbol: Option<String>,
}

fn parse_direction(s: &str) -> Result<Direction, AppError> {
    match s {
        "LONG" => Ok(Direction::Long),
        "SHORT" => Ok(Direction::Short),
        other => Err(AppError::not_found(format!("unknown direction '{other}'"))),
    }
}

async fn ingest_signal(
    State(state): State<AppState>,
    Json(req): Json<SignalIngestRequest>,
) -> Result<Json<ApiResponse<bias_core::Signal>>, AppError> {
    let dedup_label = format!("{}:{}", req.symbol, req.signal_type);
    let candidate = CandidateSignal {
        symbol: req.symbol,
        direction: parse_direction(&req.direction)?,
        signal_type: bias_core::SignalType::from_label(&req.signal_type),
        signal_source: req.signal_source,
        entry: req.entry,
        atr: req.atr,
        sma20: req.sma20,
        sma50: req.sma50,
        sma120: req.sma120,
        sma200: req.sma200,
        rsi: req.rsi,
        sector_symbol: req.sector_symbol,
    };

    match state.scorer.score_and_persist(candidate, Utc::now()).await? {
        Some(signal) => {
            let symbol = signal.symbol.clone();
            let confluence: Arc<_> = state.confluence.clone();
            tokio::spawn(async move {
                if let Err(e) = confluence.run_for_symbol(&symbol).await {
                    tracing::warn!(symbol, error = %e, "confluence pass failed after signal ingest");
                }
            });
            Ok(Json(ApiResponse::success(signal)))
        }
        None => Err(bias_core::EngineError::DuplicateSignalId(dedup_label).into()),
    }
}
