use std::sync::Arc;

use bias_core::{topics, EngineError, EventSink, FactorId, FactorReading, ReadingSource, TimestampSource};
use composite_engine::RecomputeActor;
use factor_registry::FactorRegistry;
use gateway::{keys, Gateway};
use tracing::{info, warn};

/// Result of `FactorIngestion::ingest`, mirroring the `{accepted,
/// rejected_reason}` external contract.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub accepted: bool,
    pub rejected_reason: Option<String>,
}

/// Validation pipeline: ownership enforcement, range/sanity checks,
/// staleness-mask tagging. Accepted readings are persisted then trigger a
/// composite recompute; nothing is enqueued synchronously, the ingest
/// handler just calls `trigger()` and returns.
pub struct FactorIngestion {
    registry: Arc<FactorRegistry>,
    gateway: Arc<Gateway>,
    sink: Arc<dyn EventSink>,
    recompute: Arc<RecomputeActor>,
}

impl FactorIngestion {
    pub fn new(
        registry: Arc<FactorRegistry>,
        gateway: Arc<Gateway>,
        sink: Arc<dyn EventSink>,
        recompute: Arc<RecomputeActor>,
    ) -> Self {
        Self { registry, gateway, sink, recompute }
    }

    pub async fn ingest(&self, mut reading: FactorReading, producer_identity: &str) -> IngestOutcome {
        if let Err(reason) = self.validate(&mut reading, producer_identity).await {
            self.emit_anomaly(&reading.factor_id, &reason).await;
            warn!(factor = %reading.factor_id, reason = %reason, "ingest rejected");
            return IngestOutcome { accepted: false, rejected_reason: Some(reason) };
        }

        if let Err(e) = self.persist(&reading).await {
            warn!(error = %e, factor = %reading.factor_id, "factor ingest persistence failed");
            return IngestOutcome { accepted: false, rejected_reason: Some(e.code().to_string()) };
        }

        self.recompute.trigger();
        info!(factor = %reading.factor_id, score = reading.score, "factor reading accepted");
        IngestOutcome { accepted: true, rejected_reason: None }
    }

    async fn validate(&self, reading: &mut FactorReading, producer_identity: &str) -> Result<(), String> {
        if !self.registry.is_known(&reading.factor_id) {
            return Err(EngineError::UnknownFactor(reading.factor_id.to_string()).code().to_string());
        }

        let owner = self.registry.owner_of(&reading.factor_id).unwrap_or_default().to_string();
        if owner != producer_identity {
            return Err(EngineError::OwnershipViolation {
                factor_id: reading.factor_id.to_string(),
                producer: producer_identity.to_string(),
                owner,
            }
            .code()
            .to_string());
        }

        if !(-1.0..=1.0).contains(&reading.score) {
            return Err(EngineError::OutOfRange(reading.score).code().to_string());
        }

        if let Some((symbol, value, min, max)) = self.sanity_violation(reading) {
            self.purge_cached_price(&symbol).await;
            return Err(EngineError::SanityBoundsViolation { symbol, value, min, max }.code().to_string());
        }

        if matches!(reading.source, ReadingSource::Webhook) && reading.observed_at.is_none() {
            reading.timestamp_source = TimestampSource::IngestionFallback;
        }

        Ok(())
    }

    /// The raw blob is opaque per spec, but price-derived factors are
    /// expected to carry a `prices` object mapping the underlying symbol to
    /// its raw value, which is what sanity bounds are checked against.
    fn sanity_violation(&self, reading: &FactorReading) -> Option<(String, f64, f64, f64)> {
        let prices = reading.raw.get("prices")?.as_object()?;
        for (symbol, value) in prices {
            let value = value.as_f64()?;
            let bounds = self.registry.sanity_bounds_for(&reading.factor_id, symbol)?;
            if value < bounds.min || value > bounds.max {
                return Some((symbol.clone(), value, bounds.min, bounds.max));
            }
        }
        None
    }

    async fn purge_cached_price(&self, symbol: &str) {
        for bars in [20u32, 50, 120, 200] {
            self.gateway.cache.del(&keys::price(1, symbol, bars, "adj"));
        }
    }

    async fn persist(&self, reading: &FactorReading) -> bias_core::EngineResult<()> {
        self.gateway
            .cache
            .put_json(keys::factor_latest(reading.factor_id.as_str()), reading, None)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        self.gateway.store.insert_factor_reading(reading).await
    }

    async fn emit_anomaly(&self, factor_id: &FactorId, reason: &str) {
        self.sink
            .publish(
                topics::ANOMALY,
                serde_json::json!({
                    "kind": "ingest_rejected",
                    "factor_id": factor_id.to_string(),
                    "reason": reason,
                }),
            )
            .await
            .ok();
    }
}

/// Startup task: re-validate every `factor:*:latest` cache entry against
/// current sanity bounds and purge violators, logging what was purged.
pub fn startup_sweep(gateway: &Gateway, registry: &FactorRegistry) -> Vec<String> {
    let purged = gateway.startup_sweep(|key, bytes| {
        let Some(rest) = key.strip_prefix("factor:") else { return true };
        let Some(factor_id_str) = rest.strip_suffix(":latest") else { return true };
        let Ok(reading) = serde_json::from_slice::<FactorReading>(bytes) else { return true };
        let Some(prices) = reading.raw.get("prices").and_then(|v| v.as_object()) else { return true };

        for (symbol, value) in prices {
            let Some(value) = value.as_f64() else { continue };
            if let Some(bounds) = registry.sanity_bounds_for(&FactorId::new(factor_id_str), symbol) {
                if value < bounds.min || value > bounds.max {
                    return false;
                }
            }
        }
        true
    });

    for key in &purged {
        warn!(key = %key, "purged cache entry failing sanity bounds at startup");
    }
    purged
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::{BiasLevel, FactorId, NullEventSink};
    use chrono::Utc;

    async fn setup() -> (FactorIngestion, Arc<Gateway>) {
        let registry_toml = r#"
            [[factor]]
            id = "vix_term"
            weight_nominal = 0.16
            staleness_budget_secs = 3600
            owner = "scheduled_pull"

            [sanity_bounds."^VIX"]
            min = 9.0
            max = 90.0
        "#;
        let registry = Arc::new(FactorRegistry::from_toml_str(registry_toml).unwrap());
        let gateway = Arc::new(Gateway::connect("sqlite::memory:").await.unwrap());
        let sink: Arc<dyn EventSink> = Arc::new(NullEventSink);
        let ctx = Arc::new(
            composite_engine::EngineContext::new(registry.clone(), gateway.clone(), sink.clone())
                .await
                .unwrap(),
        );
        let recompute = Arc::new(RecomputeActor::spawn(ctx));
        (FactorIngestion::new(registry, gateway.clone(), sink, recompute), gateway)
    }

    fn reading(factor_id: &str, score: f64, producer: &str) -> FactorReading {
        FactorReading {
            factor_id: FactorId::new(factor_id),
            score,
            signal_label: BiasLevel::from_score(score),
            detail: "test".into(),
            source: ReadingSource::ScheduledPull,
            observed_at: Some(Utc::now()),
            ingested_at: Utc::now(),
            raw: serde_json::json!({}),
            timestamp_source: TimestampSource::SourceEvent,
        }
    }

    #[tokio::test]
    async fn accepts_known_factor_from_owner() {
        let (ingestion, _gw) = setup().await;
        let outcome = ingestion.ingest(reading("vix_term", 0.5, "scheduled_pull"), "scheduled_pull").await;
        assert!(outcome.accepted);
    }

    #[tokio::test]
    async fn rejects_unknown_factor() {
        let (ingestion, _gw) = setup().await;
        let outcome = ingestion.ingest(reading("not_a_factor", 0.1, "anyone"), "anyone").await;
        assert!(!outcome.accepted);
        assert_eq!(outcome.rejected_reason.unwrap(), "UNKNOWN_FACTOR");
    }

    #[tokio::test]
    async fn scenario_4_ownership_violation() {
        let (ingestion, _gw) = setup().await;
        let outcome = ingestion.ingest(reading("vix_term", 0.2, "P2"), "P2").await;
        assert!(!outcome.accepted);
        assert_eq!(outcome.rejected_reason.unwrap(), "OWNERSHIP_VIOLATION");
    }

    #[tokio::test]
    async fn rejects_out_of_range_score() {
        let (ingestion, _gw) = setup().await;
        let outcome = ingestion.ingest(reading("vix_term", 1.5, "scheduled_pull"), "scheduled_pull").await;
        assert!(!outcome.accepted);
        assert_eq!(outcome.rejected_reason.unwrap(), "OUT_OF_RANGE");
    }

    #[tokio::test]
    async fn rejects_sanity_bounds_violation_and_never_caches() {
        let (ingestion, gw) = setup().await;
        let mut r = reading("vix_term", 0.1, "scheduled_pull");
        r.raw = serde_json::json!({"prices": {"^VIX": 150.0}});
        let outcome = ingestion.ingest(r, "scheduled_pull").await;
        assert!(!outcome.accepted);
        assert_eq!(outcome.rejected_reason.unwrap(), "OUT_OF_RANGE");
        let cached: Option<FactorReading> = gw.cache.get_json(&keys::factor_latest("vix_term"));
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn webhook_without_observed_at_is_tagged_unverifiable() {
        let (ingestion, gw) = setup().await;
        let mut r = reading("vix_term", 0.2, "scheduled_pull");
        r.source = ReadingSource::Webhook;
        r.observed_at = None;
        let outcome = ingestion.ingest(r, "scheduled_pull").await;
        assert!(outcome.accepted);
        let cached: FactorReading = gw.cache.get_json(&keys::factor_latest("vix_term")).unwrap();
        assert!(cached.is_unverifiable());
    }
}
