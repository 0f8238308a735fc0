use std::collections::HashMap;

use bias_core::{BiasLevel, Confidence, FactorId, FactorReading};
use chrono::{DateTime, Utc};
use factor_registry::FactorRegistry;

/// Everything steps 1–7 of the recompute algorithm need, pre-fetched by the
/// actor so this function stays pure and trivially testable.
pub struct ComputeInput {
    pub readings: HashMap<FactorId, FactorReading>,
    /// Score of the same factor as observed ≥24h before `now`, when known.
    pub prior_scores_24h: HashMap<FactorId, f64>,
}

#[derive(Debug, Clone)]
pub struct RawComputation {
    pub composite_score: f64,
    pub band_level: BiasLevel,
    pub active_factors: Vec<FactorId>,
    pub stale_factors: Vec<FactorId>,
    pub unverifiable_factors: Vec<FactorId>,
    pub normalized_weights: HashMap<FactorId, f64>,
    pub velocity_multiplier: f64,
    pub confidence: Confidence,
}

const VELOCITY_DROP_THRESHOLD: f64 = 0.3;
const VELOCITY_TRIGGER_COUNT: usize = 3;

/// Deterministic given the latest reading set and registry configuration —
/// the recompute algorithm of steps 1–7. Override arbitration and breaker
/// clamping (steps 8–9) happen afterward in the actor, since they need
/// mutable process state this function doesn't own.
pub fn compute(input: &ComputeInput, registry: &FactorRegistry, now: DateTime<Utc>) -> RawComputation {
    let mut active = Vec::new();
    let mut stale = Vec::new();
    let mut unverifiable = Vec::new();

    for factor_id in registry.enabled() {
        let meta = registry.get(factor_id).expect("enabled factor always has meta");
        match input.readings.get(factor_id) {
            Some(reading) => {
                let anchor = reading.freshness_anchor();
                let age = now.signed_duration_since(anchor);
                if age <= meta.staleness_budget && age >= chrono::Duration::zero() {
                    active.push(factor_id.clone());
                    if reading.is_unverifiable() {
                        unverifiable.push(factor_id.clone());
                    }
                } else {
                    stale.push(factor_id.clone());
                }
            }
            None => stale.push(factor_id.clone()),
        }
    }

    if active.is_empty() {
        return RawComputation {
            composite_score: 0.0,
            band_level: BiasLevel::Neutral,
            active_factors: active,
            stale_factors: stale,
            unverifiable_factors: unverifiable,
            normalized_weights: HashMap::new(),
            velocity_multiplier: 1.0,
            confidence: Confidence::Low,
        };
    }

    let w_active: f64 = active
        .iter()
        .map(|id| registry.weight_nominal(id).unwrap_or(0.0))
        .sum();

    let mut normalized_weights = HashMap::new();
    let mut raw_score = 0.0;
    for id in &active {
        let nominal = registry.weight_nominal(id).unwrap_or(0.0);
        let w = if w_active > 0.0 { nominal / w_active } else { 0.0 };
        normalized_weights.insert(id.clone(), w);
        let score = input.readings.get(id).map(|r| r.score).unwrap_or(0.0);
        raw_score += w * score;
    }
    raw_score = raw_score.clamp(-1.0, 1.0);

    let dropped = active
        .iter()
        .filter(|id| {
            let current = input.readings.get(*id).map(|r| r.score).unwrap_or(0.0);
            match input.prior_scores_24h.get(*id) {
                Some(prior) => current <= prior - VELOCITY_DROP_THRESHOLD,
                None => false,
            }
        })
        .count();
    let velocity_multiplier = if dropped >= VELOCITY_TRIGGER_COUNT { 1.3 } else { 1.0 };

    let adjusted_score = (raw_score * velocity_multiplier).clamp(-1.0, 1.0);
    let band_level = BiasLevel::from_score(adjusted_score);
    let confidence = Confidence::from_active_count(active.len());

    RawComputation {
        composite_score: adjusted_score,
        band_level,
        active_factors: active,
        stale_factors: stale,
        unverifiable_factors: unverifiable,
        normalized_weights,
        velocity_multiplier,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::{ReadingSource, TimestampSource};

    fn registry_from(toml: &str) -> FactorRegistry {
        FactorRegistry::from_toml_str(toml).unwrap()
    }

    fn reading(id: &str, score: f64, now: DateTime<Utc>) -> FactorReading {
        FactorReading {
            factor_id: FactorId::new(id),
            score,
            signal_label: BiasLevel::from_score(score),
            detail: String::new(),
            source: ReadingSource::ScheduledPull,
            observed_at: Some(now),
            ingested_at: now,
            raw: serde_json::Value::Null,
            timestamp_source: TimestampSource::SourceEvent,
        }
    }

    #[test]
    fn scenario_1_graceful_degradation() {
        let toml = r#"
            [[factor]]
            id = "credit_spreads"
            weight_nominal = 0.18
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "market_breadth"
            weight_nominal = 0.18
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "vix_term"
            weight_nominal = 0.16
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "tick_breadth"
            weight_nominal = 0.14
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "sector_rotation"
            weight_nominal = 0.14
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "dollar_smile"
            weight_nominal = 0.08
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "excess_cape"
            weight_nominal = 0.08
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "savita"
            weight_nominal = 0.04
            staleness_budget_secs = 86400
            owner = "p"
        "#;
        let registry = registry_from(toml);
        let now = Utc::now();
        let mut readings = HashMap::new();
        for id in ["credit_spreads", "market_breadth", "vix_term", "tick_breadth", "sector_rotation", "dollar_smile", "excess_cape"] {
            readings.insert(FactorId::new(id), reading(id, -0.80, now));
        }
        let input = ComputeInput { readings, prior_scores_24h: HashMap::new() };
        let result = compute(&input, &registry, now);

        assert_eq!(result.active_factors.len(), 7);
        assert_eq!(result.stale_factors, vec![FactorId::new("savita")]);
        let weight_sum: f64 = result.normalized_weights.values().sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
        assert!((result.composite_score - (-0.80)).abs() < 1e-9);
        assert_eq!(result.band_level, BiasLevel::UrsaMajor);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn scenario_2_velocity_escalation() {
        let toml = r#"
            [[factor]]
            id = "credit_spreads"
            weight_nominal = 0.18
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "market_breadth"
            weight_nominal = 0.18
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "vix_term"
            weight_nominal = 0.16
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "tick_breadth"
            weight_nominal = 0.14
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "sector_rotation"
            weight_nominal = 0.14
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "dollar_smile"
            weight_nominal = 0.08
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "excess_cape"
            weight_nominal = 0.08
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "savita"
            weight_nominal = 0.04
            staleness_budget_secs = 86400
            owner = "p"
        "#;
        let registry = registry_from(toml);
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(FactorId::new("credit_spreads"), reading("credit_spreads", -0.5, now));
        readings.insert(FactorId::new("market_breadth"), reading("market_breadth", -0.5, now));
        readings.insert(FactorId::new("sector_rotation"), reading("sector_rotation", -0.6, now));
        for id in ["vix_term", "tick_breadth", "dollar_smile", "excess_cape", "savita"] {
            readings.insert(FactorId::new(id), reading(id, 0.0, now));
        }

        let mut prior = HashMap::new();
        prior.insert(FactorId::new("credit_spreads"), -0.2);
        prior.insert(FactorId::new("market_breadth"), -0.1);
        prior.insert(FactorId::new("sector_rotation"), -0.2);

        let input = ComputeInput { readings, prior_scores_24h: prior };
        let result = compute(&input, &registry, now);

        assert_eq!(result.velocity_multiplier, 1.3);
        // Weighted raw score over these weights is 0.18*-0.5 + 0.18*-0.5 + 0.14*-0.6 = -0.264,
        // times the 1.3 velocity multiplier = -0.3432.
        assert!((result.composite_score - (-0.3432)).abs() < 1e-6);
        assert_eq!(result.band_level, BiasLevel::UrsaMinor);
    }

    #[test]
    fn two_shifts_does_not_engage_velocity() {
        let toml = r#"
            [[factor]]
            id = "a"
            weight_nominal = 1.0
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "b"
            weight_nominal = 1.0
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "c"
            weight_nominal = 1.0
            staleness_budget_secs = 86400
            owner = "p"
        "#;
        let registry = registry_from(toml);
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(FactorId::new("a"), reading("a", -0.5, now));
        readings.insert(FactorId::new("b"), reading("b", -0.5, now));
        readings.insert(FactorId::new("c"), reading("c", 0.0, now));
        let mut prior = HashMap::new();
        prior.insert(FactorId::new("a"), -0.2);
        prior.insert(FactorId::new("b"), -0.2);
        let input = ComputeInput { readings, prior_scores_24h: prior };
        let result = compute(&input, &registry, now);
        assert_eq!(result.velocity_multiplier, 1.0);
    }

    #[test]
    fn empty_active_set_is_neutral_low_confidence() {
        let toml = r#"
            [[factor]]
            id = "a"
            weight_nominal = 1.0
            staleness_budget_secs = 60
            owner = "p"
        "#;
        let registry = registry_from(toml);
        let now = Utc::now();
        let input = ComputeInput { readings: HashMap::new(), prior_scores_24h: HashMap::new() };
        let result = compute(&input, &registry, now);
        assert_eq!(result.composite_score, 0.0);
        assert_eq!(result.band_level, BiasLevel::Neutral);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn single_active_factor_equals_composite() {
        let toml = r#"
            [[factor]]
            id = "a"
            weight_nominal = 0.5
            staleness_budget_secs = 86400
            owner = "p"

            [[factor]]
            id = "b"
            weight_nominal = 0.5
            staleness_budget_secs = 60
            owner = "p"
        "#;
        let registry = registry_from(toml);
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(FactorId::new("a"), reading("a", 0.42, now));
        let input = ComputeInput { readings, prior_scores_24h: HashMap::new() };
        let result = compute(&input, &registry, now);
        assert!((result.composite_score - 0.42).abs() < 1e-9);
    }

    #[test]
    fn stale_reading_past_budget_is_excluded() {
        let toml = r#"
            [[factor]]
            id = "a"
            weight_nominal = 1.0
            staleness_budget_secs = 60
            owner = "p"
        "#;
        let registry = registry_from(toml);
        let now = Utc::now();
        let mut readings = HashMap::new();
        readings.insert(FactorId::new("a"), reading("a", 0.9, now - chrono::Duration::seconds(120)));
        let input = ComputeInput { readings, prior_scores_24h: HashMap::new() };
        let result = compute(&input, &registry, now);
        assert_eq!(result.band_level, BiasLevel::Neutral);
        assert_eq!(result.stale_factors, vec![FactorId::new("a")]);
    }
}
