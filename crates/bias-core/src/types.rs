use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Symbolic handle for a factor, fixed at boot by the Factor Registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct FactorId(pub String);

impl FactorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FactorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Five-level composite bias scale, from most bearish to most bullish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BiasLevel {
    UrsaMajor,
    UrsaMinor,
    Neutral,
    ToroMinor,
    ToroMajor,
}

impl BiasLevel {
    /// Map a clamped adjusted score to its band per §4.D step 7.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.60 {
            BiasLevel::ToroMajor
        } else if score >= 0.20 {
            BiasLevel::ToroMinor
        } else if score >= -0.19 {
            BiasLevel::Neutral
        } else if score >= -0.59 {
            BiasLevel::UrsaMinor
        } else {
            BiasLevel::UrsaMajor
        }
    }

    /// Ordinal distance used to detect "crossed a full level" for override
    /// auto-clear (§4.D step 8) — UrsaMajor=0 .. ToroMajor=4.
    pub fn ordinal(&self) -> i32 {
        match self {
            BiasLevel::UrsaMajor => 0,
            BiasLevel::UrsaMinor => 1,
            BiasLevel::Neutral => 2,
            BiasLevel::ToroMinor => 3,
            BiasLevel::ToroMajor => 4,
        }
    }

    pub fn bands_apart(&self, other: BiasLevel) -> i32 {
        (self.ordinal() - other.ordinal()).abs()
    }

    pub fn from_ordinal(ord: i32) -> Self {
        match ord.clamp(0, 4) {
            0 => BiasLevel::UrsaMajor,
            1 => BiasLevel::UrsaMinor,
            2 => BiasLevel::Neutral,
            3 => BiasLevel::ToroMinor,
            _ => BiasLevel::ToroMajor,
        }
    }
}

impl fmt::Display for BiasLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BiasLevel::UrsaMajor => "URSA_MAJOR",
            BiasLevel::UrsaMinor => "URSA_MINOR",
            BiasLevel::Neutral => "NEUTRAL",
            BiasLevel::ToroMinor => "TORO_MINOR",
            BiasLevel::ToroMajor => "TORO_MAJOR",
        };
        write!(f, "{}", s)
    }
}

/// Where a factor reading originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingSource {
    ScheduledPull,
    Webhook,
    Manual,
    FallbackCache,
}

/// Whether `observed_at` came from the underlying market event or was
/// synthesized at ingestion time because the producer didn't supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampSource {
    SourceEvent,
    IngestionFallback,
}

/// Immutable snapshot of a single factor's value at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorReading {
    pub factor_id: FactorId,
    /// Clamped to [-1.0, 1.0] by the time it reaches this type.
    pub score: f64,
    pub signal_label: BiasLevel,
    pub detail: String,
    pub source: ReadingSource,
    /// Event-time timestamp; required for webhook-sourced factors.
    pub observed_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    pub raw: serde_json::Value,
    pub timestamp_source: TimestampSource,
}

impl FactorReading {
    /// Freshness reference time per §9: prefer event time, fall back to
    /// ingestion time only when freshness is unverifiable.
    pub fn freshness_anchor(&self) -> DateTime<Utc> {
        match (self.timestamp_source, self.observed_at) {
            (TimestampSource::SourceEvent, Some(t)) => t,
            _ => self.ingested_at,
        }
    }

    pub fn is_unverifiable(&self) -> bool {
        matches!(self.timestamp_source, TimestampSource::IngestionFallback)
    }
}

/// Static, registry-declared metadata for a single factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorMeta {
    pub factor_id: FactorId,
    pub weight_nominal: f64,
    pub staleness_budget: chrono::Duration,
    pub owner: String,
    pub sanity_bounds: Option<HashMap<String, SanityBounds>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SanityBounds {
    pub min: f64,
    pub max: f64,
}

/// Confidence banding derived from the size of the active factor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_active_count(active: usize) -> Self {
        if active >= 6 {
            Confidence::High
        } else if active >= 4 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideState {
    pub level: BiasLevel,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerCaps {
    pub ceiling_level: Option<BiasLevel>,
    pub floor_level: Option<BiasLevel>,
    pub long_scoring_multiplier: f64,
    pub short_scoring_multiplier: f64,
}

/// Full output of one composite-bias recompute, per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeResult {
    pub composite_score: f64,
    pub bias_level: BiasLevel,
    pub active_factors: Vec<FactorId>,
    pub stale_factors: Vec<FactorId>,
    pub unverifiable_factors: Vec<FactorId>,
    pub normalized_weights: HashMap<FactorId, f64>,
    pub velocity_multiplier: f64,
    pub override_applied: Option<OverrideState>,
    pub circuit_breaker_caps: Option<CircuitBreakerCaps>,
    pub confidence: Confidence,
    /// Informational, never gates bias_level — see SPEC_FULL.md market-regime
    /// enrichment. Absent when no regime classifier is wired in.
    pub market_regime: Option<String>,
    pub computed_at: DateTime<Utc>,
}

/// Circuit-breaker trigger identifiers, matching the rule table in §4.E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerTrigger {
    SpyDown1Pct,
    SpyDown2Pct,
    VixSpike,
    VixExtreme,
    SpyUp2Pct,
    SpyRecovery,
}

impl fmt::Display for BreakerTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerTrigger::SpyDown1Pct => "SPY_DOWN_1PCT",
            BreakerTrigger::SpyDown2Pct => "SPY_DOWN_2PCT",
            BreakerTrigger::VixSpike => "VIX_SPIKE",
            BreakerTrigger::VixExtreme => "VIX_EXTREME",
            BreakerTrigger::SpyUp2Pct => "SPY_UP_2PCT",
            BreakerTrigger::SpyRecovery => "SPY_RECOVERY",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub active_triggers: Vec<BreakerTrigger>,
    pub bias_ceiling: Option<BiasLevel>,
    pub bias_floor: Option<BiasLevel>,
    pub long_scoring_multiplier: f64,
    pub short_scoring_multiplier: f64,
    pub engaged_at: Option<DateTime<Utc>>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            active_triggers: Vec::new(),
            bias_ceiling: None,
            bias_floor: None,
            long_scoring_multiplier: 1.0,
            short_scoring_multiplier: 1.0,
            engaged_at: None,
        }
    }
}

impl CircuitBreakerState {
    pub fn is_engaged(&self) -> bool {
        !self.active_triggers.is_empty()
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

/// Closed set of signal types the scorer has dedicated R:R / entry-window
/// rules for, with a fallback for producer-defined types (treated as
/// "generic" throughout the scoring tables).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    GoldenTouch,
    PullbackEntry,
    TwoCloseVolume,
    TrappedShorts,
    Generic(String),
}

impl SignalType {
    pub fn from_label(label: &str) -> Self {
        match label {
            "GOLDEN_TOUCH" => SignalType::GoldenTouch,
            "PULLBACK_ENTRY" => SignalType::PullbackEntry,
            "TWO_CLOSE_VOLUME" => SignalType::TwoCloseVolume,
            "TRAPPED_SHORTS" => SignalType::TrappedShorts,
            other => SignalType::Generic(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SignalType::GoldenTouch => "GOLDEN_TOUCH",
            SignalType::PullbackEntry => "PULLBACK_ENTRY",
            SignalType::TwoCloseVolume => "TWO_CLOSE_VOLUME",
            SignalType::TrappedShorts => "TRAPPED_SHORTS",
            SignalType::Generic(s) => s.as_str(),
        }
    }

    /// Base score contribution for §4.F step 10.
    pub fn base_score(&self) -> f64 {
        match self {
            SignalType::GoldenTouch => 55.0,
            SignalType::PullbackEntry => 45.0,
            SignalType::TwoCloseVolume => 40.0,
            SignalType::TrappedShorts => 50.0,
            SignalType::Generic(_) => 35.0,
        }
    }
}

/// CTA regime derived from price vs. 20/50/120/200 SMA, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CTAZone {
    MaxLong,
    Recovery,
    DeLeveraging,
    Waterfall,
    Capitulation,
    Transition,
}

impl fmt::Display for CTAZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CTAZone::MaxLong => "MAX_LONG",
            CTAZone::Recovery => "RECOVERY",
            CTAZone::DeLeveraging => "DE_LEVERAGING",
            CTAZone::Waterfall => "WATERFALL",
            CTAZone::Capitulation => "CAPITULATION",
            CTAZone::Transition => "TRANSITION",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectorWind {
    Tailwind,
    Headwind,
    Neutral,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiasAlignment {
    Aligned,
    CounterTrend,
    Neutral,
    Unknown,
}

impl BiasAlignment {
    pub fn conviction_multiplier(&self) -> f64 {
        match self {
            BiasAlignment::Aligned => 1.2,
            BiasAlignment::CounterTrend => 0.8,
            BiasAlignment::Neutral | BiasAlignment::Unknown => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalConfidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSetup {
    pub entry: f64,
    pub entry_window_low: f64,
    pub entry_window_high: f64,
    pub stop: f64,
    pub t1: f64,
    pub t2: f64,
    pub rr_t1: f64,
    pub rr_t2: f64,
    pub invalidation_level: f64,
    pub invalidation_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopAnchor {
    pub description: String,
    pub sma_period: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfluenceEntry {
    pub signal_id: String,
    pub signal_type: String,
    pub direction_matches: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfluenceBlock {
    pub aligned_signal_ids: Vec<String>,
    pub boost: i32,
    pub label: Option<String>,
    pub conflicting: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupContext {
    pub stop_anchor: StopAnchor,
    pub rr_profile_key: String,
    pub sector_wind: SectorWind,
    pub bias_alignment: BiasAlignment,
    pub confluence: ConfluenceBlock,
    pub flow_confirmation: Option<String>,
    pub zone_upgrade_context: Option<String>,
    pub zone_downgrade_context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Active,
    Dismissed,
}

/// A candidate trade, fully enriched by the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub signal_type: SignalType,
    pub signal_source: String,
    pub setup: SignalSetup,
    pub setup_context: SetupContext,
    pub priority: i32,
    pub score: f64,
    pub confidence: SignalConfidence,
    pub zone: CTAZone,
    pub created_at: DateTime<Utc>,
    pub status: SignalStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Pending,
    HitT1,
    HitT2,
    StoppedOut,
    Invalidated,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub signal_id: String,
    pub outcome: Outcome,
    pub outcome_at: Option<DateTime<Utc>>,
    pub outcome_price: Option<f64>,
    pub max_favorable_excursion: f64,
    pub max_adverse_excursion: f64,
    pub days_to_outcome: Option<i64>,
    /// True once a bar has touched T1, even if the terminal outcome is
    /// later STOPPED_OUT — recorded per §4.H step 3.
    pub reached_t1: bool,
}

impl SignalOutcome {
    pub fn pending(signal_id: impl Into<String>) -> Self {
        Self {
            signal_id: signal_id.into(),
            outcome: Outcome::Pending,
            outcome_at: None,
            outcome_price: None,
            max_favorable_excursion: 0.0,
            max_adverse_excursion: 0.0,
            days_to_outcome: None,
            reached_t1: false,
        }
    }
}

/// Envelope published on the broadcast fabric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub topic: String,
    pub sequence: u64,
    pub payload: serde_json::Value,
}

/// Topic name constants used throughout the engine.
pub mod topics {
    pub const BIAS_COMPOSITE: &str = "bias.composite";
    pub const SIGNAL_NEW: &str = "signal.new";
    pub const SIGNAL_OUTCOME: &str = "signal.outcome";
    pub const BREAKER_CHANGED: &str = "breaker.changed";
    pub const ANOMALY: &str = "anomaly";
    pub const HEARTBEAT: &str = "system.heartbeat";
}

/// Precision every score is bucketed to before it crosses a durable-storage
/// boundary, so a replay on a different architecture reads back the same
/// value it would have computed locally (round-half-away-from-zero, the
/// behavior of `f64::round`).
pub const SCORE_PRECISION: f64 = 1_000_000.0;

pub fn bucket_score(score: f64) -> f64 {
    (score * SCORE_PRECISION).round() / SCORE_PRECISION
}

/// OHLCV bar, the unit external price providers and the outcome scorer
/// operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
