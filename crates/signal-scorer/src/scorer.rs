use std::sync::Arc;

use bias_core::{
    topics, CTAZone, ConfluenceBlock, Direction, EngineResult, EventSink, Signal, SignalSetup,
    SignalStatus, SignalType, SetupContext, SignalOutcome,
};
use chrono::{DateTime, Utc};
use gateway::{Gateway, InsertOutcome};
use tracing::info;

use crate::entry_window;
use crate::invalidation::{self, SmaStack};
use crate::rr_profile;
use crate::scoring;
use crate::sector_wind;
use crate::stop;
use crate::targets;
use crate::zone;
use crate::bias_alignment;
use crate::flow;

const ADJUSTED_REWARD_FLOOR_ATR: f64 = 1.0;
const ADJUSTED_REWARD_CEILING_ATR: f64 = 6.0;

/// Inputs a signal producer supplies; everything downstream of this
/// (zone, R:R, stop, targets, alignment, score) is derived by the scorer.
pub struct CandidateSignal {
    pub symbol: String,
    pub direction: Direction,
    pub signal_type: SignalType,
    pub signal_source: String,
    pub entry: f64,
    pub atr: f64,
    pub sma20: f64,
    pub sma50: f64,
    pub sma120: f64,
    pub sma200: f64,
    pub rsi: Option<f64>,
    /// Sector ETF to check for tailwind/headwind; defaults to the
    /// signal's own symbol when the producer doesn't supply one.
    pub sector_symbol: Option<String>,
}

pub struct SignalScorer {
    gateway: Arc<Gateway>,
    sink: Arc<dyn EventSink>,
}

impl SignalScorer {
    pub fn new(gateway: Arc<Gateway>, sink: Arc<dyn EventSink>) -> Self {
        Self { gateway, sink }
    }

    /// Runs the full §4.F pipeline and persists the resulting signal plus
    /// its PENDING outcome atomically. Returns `None` when the signal_id
    /// already exists (idempotent re-ingestion, no duplicate broadcast).
    pub async fn score_and_persist(&self, candidate: CandidateSignal, now: DateTime<Utc>) -> EngineResult<Option<Signal>> {
        let zone = zone::classify(candidate.entry, candidate.sma20, candidate.sma50, candidate.sma120, candidate.sma200);
        let (stop_atr_mult, target_atr_mult) = rr_profile::lookup(&candidate.signal_type, zone);
        let preferred_period = zone::preferred_sma_period(zone);

        let smas = [
            (20, candidate.sma20),
            (50, candidate.sma50),
            (120, candidate.sma120),
            (200, candidate.sma200),
        ];
        let stop_result = stop::place_stop(candidate.direction, candidate.entry, candidate.atr, &smas, preferred_period, stop_atr_mult);
        let risk = (candidate.entry - stop_result.stop).abs();

        let sma_values = [candidate.sma20, candidate.sma50, candidate.sma120, candidate.sma200];
        let raw_targets = targets::compute_targets(candidate.direction, candidate.entry, risk, target_atr_mult, candidate.atr, &sma_values);

        let (window_low, window_high) = entry_window::entry_window(
            &candidate.signal_type,
            candidate.direction,
            candidate.entry,
            candidate.atr,
            candidate.sma20,
            candidate.sma50,
        );

        let sma_stack = SmaStack { sma20: candidate.sma20, sma50: candidate.sma50, sma120: candidate.sma120 };
        let (invalidation_level, invalidation_reason) =
            invalidation::invalidation_level(&candidate.signal_type, candidate.direction, candidate.atr, &sma_stack);

        let sector_symbol = candidate.sector_symbol.clone().unwrap_or_else(|| candidate.symbol.clone());
        let sector_wind = sector_wind::classify(&self.gateway, &sector_symbol, candidate.direction);
        let bias_alignment = bias_alignment::classify(&self.gateway, candidate.direction);
        let flow_confirmation = flow::confirmation(&self.gateway, &candidate.symbol, candidate.direction);

        let conviction = bias_alignment.conviction_multiplier();
        let raw_reward = (raw_targets.t2 - candidate.entry).abs();
        let adjusted_reward =
            (raw_reward * conviction).clamp(ADJUSTED_REWARD_FLOOR_ATR * candidate.atr, ADJUSTED_REWARD_CEILING_ATR * candidate.atr);
        let t2 = match candidate.direction {
            Direction::Long => candidate.entry + adjusted_reward,
            Direction::Short => candidate.entry - adjusted_reward,
        };

        let breaker = self.gateway.store.get_breaker_state().await?.unwrap_or_default();

        let scoring_inputs =
            scoring::ScoringInputs { zone, direction: candidate.direction, rsi: candidate.rsi, sector_wind, conviction };
        let raw_score = scoring::score(&candidate.signal_type, &scoring_inputs, &breaker);
        let base_confidence = scoring::confidence_from_score(raw_score);
        let confidence = scoring::apply_breaker_denial(candidate.direction, &candidate.signal_type, &breaker, base_confidence);

        let rr_t1 = if risk > 0.0 { (raw_targets.t1 - candidate.entry).abs() / risk } else { 0.0 };
        let rr_t2 = if risk > 0.0 { adjusted_reward / risk } else { 0.0 };

        let signal_id = make_signal_id(&candidate.symbol, &candidate.signal_type, now);

        let setup = SignalSetup {
            entry: candidate.entry,
            entry_window_low: window_low,
            entry_window_high: window_high,
            stop: stop_result.stop,
            t1: raw_targets.t1,
            t2,
            rr_t1,
            rr_t2,
            invalidation_level,
            invalidation_reason,
        };

        let setup_context = SetupContext {
            stop_anchor: stop_result.anchor,
            rr_profile_key: format!("{}:{}", candidate.signal_type.label(), zone),
            sector_wind,
            bias_alignment,
            confluence: ConfluenceBlock::default(),
            flow_confirmation,
            zone_upgrade_context: zone_upgrade_note(zone),
            zone_downgrade_context: zone_downgrade_note(zone),
        };

        let signal = Signal {
            signal_id: signal_id.clone(),
            symbol: candidate.symbol,
            direction: candidate.direction,
            signal_type: candidate.signal_type,
            signal_source: candidate.signal_source,
            setup,
            setup_context,
            priority: raw_score.round() as i32,
            score: raw_score,
            confidence,
            zone,
            created_at: now,
            status: SignalStatus::Active,
        };

        match self.gateway.store.insert_signal(&signal).await? {
            InsertOutcome::AlreadyExists(_) => return Ok(None),
            InsertOutcome::Inserted => {}
        }
        self.gateway.store.upsert_signal_outcome(&SignalOutcome::pending(signal_id)).await?;

        info!(symbol = %signal.symbol, signal_type = signal.signal_type.label(), score = signal.score, "signal scored");
        self.sink.publish(topics::SIGNAL_NEW, serde_json::to_value(&signal).unwrap_or_default()).await.ok();

        Ok(Some(signal))
    }
}

fn zone_upgrade_note(zone: CTAZone) -> Option<String> {
    matches!(zone, CTAZone::MaxLong).then(|| "price above all tracked SMAs, most constructive regime".to_string())
}

fn zone_downgrade_note(zone: CTAZone) -> Option<String> {
    matches!(zone, CTAZone::Waterfall | CTAZone::Capitulation).then(|| format!("{zone} regime, stops widened accordingly"))
}

/// Deterministic id: symbol|type|minute-bucketed timestamp|microseconds.
/// Two candidates for the same symbol/type landing in the same minute
/// still collide only if they share microsecond resolution too, which
/// `insert_signal`'s idempotent-insert handles as a duplicate, not an error.
fn make_signal_id(symbol: &str, signal_type: &SignalType, created_at: DateTime<Utc>) -> String {
    let bucket = created_at.format("%Y%m%dT%H%M");
    let micros = created_at.timestamp_subsec_micros();
    format!("{symbol}|{}|{bucket}|{micros}", signal_type.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::NullEventSink;
    use chrono::TimeZone;

    fn candidate() -> CandidateSignal {
        CandidateSignal {
            symbol: "SPY".into(),
            direction: Direction::Long,
            signal_type: SignalType::GoldenTouch,
            signal_source: "scheduled_scan".into(),
            entry: 100.0,
            atr: 2.0,
            sma20: 99.5,
            sma50: 97.0,
            sma120: 92.0,
            sma200: 85.0,
            rsi: None,
            sector_symbol: None,
        }
    }

    #[tokio::test]
    async fn scenario_5_reproduces_worked_setup() {
        let gw = Arc::new(Gateway::connect("sqlite::memory:").await.unwrap());
        let scorer = SignalScorer::new(gw, Arc::new(NullEventSink));
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();

        let signal = scorer.score_and_persist(candidate(), now).await.unwrap().unwrap();
        assert_eq!(signal.setup.stop, 99.0);
        assert_eq!(signal.setup.t2, 107.0);
        assert_eq!(signal.setup.t1, 103.5);
    }

    #[tokio::test]
    async fn duplicate_signal_id_is_idempotent() {
        let gw = Arc::new(Gateway::connect("sqlite::memory:").await.unwrap());
        let scorer = SignalScorer::new(gw, Arc::new(NullEventSink));
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();

        let first = scorer.score_and_persist(candidate(), now).await.unwrap();
        assert!(first.is_some());
        let second = scorer.score_and_persist(candidate(), now).await.unwrap();
        assert!(second.is_none());
    }
}
