use std::collections::HashMap;
use std::sync::Arc;

use bias_core::{
    bucket_score, topics, BiasLevel, CircuitBreakerCaps, CircuitBreakerState, CompositeResult,
    EngineResult, EventSink, FactorId, FactorReading, OverrideState,
};
use chrono::{DateTime, Duration, Utc};
use factor_registry::FactorRegistry;
use gateway::{keys, Gateway};
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::algorithm::{compute, ComputeInput};
use crate::override_arbitration;

const MAX_PERSIST_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 50;

/// Shared, explicitly-owned state of the recompute/breaker actor. No
/// module-level singletons: a composition root builds exactly one of these
/// and hands clones of the `Arc` to whatever needs to trigger a recompute.
pub struct EngineContext {
    pub registry: Arc<FactorRegistry>,
    pub gateway: Arc<Gateway>,
    pub sink: Arc<dyn EventSink>,
    override_state: Mutex<Option<OverrideState>>,
    breaker_state: Mutex<CircuitBreakerState>,
    last_published_level: Mutex<Option<BiasLevel>>,
}

impl EngineContext {
    pub async fn new(registry: Arc<FactorRegistry>, gateway: Arc<Gateway>, sink: Arc<dyn EventSink>) -> EngineResult<Self> {
        let breaker_state = gateway.store.get_breaker_state().await?.unwrap_or_else(|| {
            warn!("breaker durable state missing on startup, proceeding empty");
            CircuitBreakerState::default()
        });

        Ok(Self {
            registry,
            gateway,
            sink,
            override_state: Mutex::new(None),
            breaker_state: Mutex::new(breaker_state),
            last_published_level: Mutex::new(None),
        })
    }

    pub async fn set_override(&self, level: BiasLevel, reason: String, expires_at: DateTime<Utc>) {
        *self.override_state.lock().await = Some(OverrideState { level, reason, expires_at });
    }

    pub async fn clear_override(&self) {
        *self.override_state.lock().await = None;
    }

    pub async fn breaker_snapshot(&self) -> CircuitBreakerState {
        self.breaker_state.lock().await.clone()
    }

    /// Apply an incoming breaker trigger, persist it durably, and return the
    /// new state. Callers are expected to follow this with a recompute
    /// trigger per §4.E ("any state change triggers a composite recompute").
    pub async fn apply_breaker_trigger(&self, trigger: bias_core::BreakerTrigger, now: DateTime<Utc>) -> EngineResult<CircuitBreakerState> {
        let mut guard = self.breaker_state.lock().await;
        let new_state = circuit_breaker::apply_trigger(&guard, trigger, now);
        self.gateway.store.put_breaker_state(&new_state).await?;
        *guard = new_state.clone();
        self.sink
            .publish(topics::BREAKER_CHANGED, serde_json::to_value(&new_state).unwrap_or_default())
            .await
            .ok();
        Ok(new_state)
    }
}

/// The recompute actor. A single long-lived task owns composite recompute
/// and breaker mutation so the two interleave with linearizable ordering,
/// per the concurrency model: ingest handlers never call recompute
/// synchronously, they just call `trigger()` and return.
pub struct RecomputeActor {
    notify: Arc<Notify>,
}

impl RecomputeActor {
    pub fn spawn(ctx: Arc<EngineContext>) -> Self {
        let notify = Arc::new(Notify::new());
        let worker_notify = notify.clone();

        tokio::spawn(async move {
            loop {
                worker_notify.notified().await;
                if let Err(e) = run_once(&ctx).await {
                    warn!(error = %e, "composite recompute failed, previous result remains authoritative");
                    ctx.sink
                        .publish(
                            topics::ANOMALY,
                            serde_json::json!({"kind": "recompute_failed", "detail": e.to_string()}),
                        )
                        .await
                        .ok();
                }
            }
        });

        Self { notify }
    }

    /// Enqueue a recompute. Multiple calls before the worker wakes collapse
    /// into a single pending recompute (tokio::sync::Notify stores at most
    /// one outstanding permit), matching the dedup requirement.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

async fn run_once(ctx: &Arc<EngineContext>) -> EngineResult<()> {
    let now = Utc::now();
    let readings = load_readings(ctx, now).await;
    let prior_scores_24h = load_prior_scores(ctx, &readings, now).await;

    let input = ComputeInput { readings, prior_scores_24h };
    let raw = compute(&input, &ctx.registry, now);

    let override_state = ctx.override_state.lock().await.clone();
    let (post_override_level, kept_override) = override_arbitration::arbitrate(raw.band_level, override_state.as_ref(), now);
    *ctx.override_state.lock().await = kept_override.clone();

    let breaker = ctx.breaker_state.lock().await.clone();
    let final_level = circuit_breaker::clamp_bias_level(post_override_level, &breaker);

    let caps = if breaker.is_engaged() {
        Some(CircuitBreakerCaps {
            ceiling_level: breaker.bias_ceiling,
            floor_level: breaker.bias_floor,
            long_scoring_multiplier: breaker.long_scoring_multiplier,
            short_scoring_multiplier: breaker.short_scoring_multiplier,
        })
    } else {
        None
    };

    let result = CompositeResult {
        composite_score: bucket_score(raw.composite_score),
        bias_level: final_level,
        active_factors: raw.active_factors,
        stale_factors: raw.stale_factors,
        unverifiable_factors: raw.unverifiable_factors,
        normalized_weights: raw.normalized_weights,
        velocity_multiplier: raw.velocity_multiplier,
        override_applied: kept_override,
        circuit_breaker_caps: caps,
        confidence: raw.confidence,
        market_regime: None,
        computed_at: now,
    };

    persist_with_retry(ctx, &result).await?;

    let mut last = ctx.last_published_level.lock().await;
    let delta = last.map(|prev| prev != final_level).unwrap_or(true);
    *last = Some(final_level);
    drop(last);

    let payload = serde_json::to_value(&result).unwrap_or_default();
    ctx.sink.publish(topics::BIAS_COMPOSITE, payload).await.ok();
    if delta {
        info!(level = %final_level, score = result.composite_score, "bias level changed");
    }

    Ok(())
}

async fn persist_once(ctx: &Arc<EngineContext>, result: &CompositeResult, payload: &serde_json::Value) -> EngineResult<()> {
    ctx.gateway
        .cache
        .put_json(keys::BIAS_COMPOSITE_LATEST, result, None)
        .map_err(|e| bias_core::EngineError::Internal(e.to_string()))?;
    ctx.gateway
        .store
        .append_bias_composite_history(result.composite_score, result.bias_level, payload, result.computed_at)
        .await?;
    ctx.gateway.log.append(topics::BIAS_COMPOSITE, payload).await?;
    Ok(())
}

/// Failed persistence means the downstream broadcast must also be skipped
/// to avoid cache/log divergence — so this either fully succeeds or the
/// caller's publish is never reached.
async fn persist_with_retry(ctx: &Arc<EngineContext>, result: &CompositeResult) -> EngineResult<()> {
    let payload = serde_json::to_value(result).map_err(|e| bias_core::EngineError::Internal(e.to_string()))?;

    let mut attempt = 0;
    loop {
        match persist_once(ctx, result, &payload).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                if attempt >= MAX_PERSIST_RETRIES {
                    return Err(e);
                }
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_BASE_DELAY_MS * 2u64.pow(attempt))).await;
            }
        }
    }
}

async fn load_readings(ctx: &Arc<EngineContext>, _now: DateTime<Utc>) -> HashMap<FactorId, FactorReading> {
    let mut out = HashMap::new();
    for id in ctx.registry.enabled() {
        let from_cache: Option<FactorReading> = ctx.gateway.cache.get_json(&keys::factor_latest(id.as_str()));
        let reading = match from_cache {
            Some(r) => Some(r),
            None => ctx.gateway.store.latest_factor_reading(id).await.ok().flatten(),
        };
        if let Some(r) = reading {
            out.insert(id.clone(), r);
        }
    }
    out
}

async fn load_prior_scores(
    ctx: &Arc<EngineContext>,
    readings: &HashMap<FactorId, FactorReading>,
    now: DateTime<Utc>,
) -> HashMap<FactorId, f64> {
    let cutoff = now - Duration::hours(24);
    let mut out = HashMap::new();
    for id in readings.keys() {
        if let Ok(mut history) = ctx.gateway.store.factor_readings_before(id, cutoff).await {
            if let Some(prior) = history.drain(..).next() {
                out.insert(id.clone(), prior.score);
            }
        }
    }
    out
}
