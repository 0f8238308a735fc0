use bias_core::{Bar, Direction, Outcome, Signal};
use chrono::{DateTime, Utc};

pub const DEFAULT_MAX_AGE_DAYS: i64 = 10;

/// Which side wins when a single bar's high-low range contains both the
/// stop and a target. The spec leaves this ordering explicitly undefined
/// and asks for a documented, consistent, configurable choice; STOP_WINS
/// is the conservative default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    StopWins,
    TargetWins,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::StopWins
    }
}

pub struct ReplayResult {
    pub outcome: Outcome,
    pub outcome_at: Option<DateTime<Utc>>,
    pub outcome_price: Option<f64>,
    pub max_favorable_excursion: f64,
    pub max_adverse_excursion: f64,
    pub days_to_outcome: Option<i64>,
    pub reached_t1: bool,
}

/// Walks `bars` chronologically from the signal's creation, applying
/// INVALIDATED > STOPPED_OUT > HIT_T2 > HIT_T1 precedence per bar. HIT_T1
/// alone never terminates the walk. Bars at or before `created_at` are
/// ignored — the signal couldn't have triggered against its own bar yet.
pub fn replay(signal: &Signal, bars: &[Bar], now: DateTime<Utc>, max_age_days: i64, tie_break: TieBreak) -> ReplayResult {
    let setup = &signal.setup;
    let direction = signal.direction;

    let mut mfe = 0.0_f64;
    let mut mae = 0.0_f64;
    let mut reached_t1 = false;

    let mut relevant: Vec<&Bar> = bars.iter().filter(|b| b.timestamp > signal.created_at).collect();
    relevant.sort_by_key(|b| b.timestamp);

    for bar in relevant {
        let (favorable, adverse) = match direction {
            Direction::Long => (bar.high - setup.entry, setup.entry - bar.low),
            Direction::Short => (setup.entry - bar.low, bar.high - setup.entry),
        };
        mfe = mfe.max(favorable);
        mae = mae.max(adverse.max(0.0));

        let days = (bar.timestamp.date_naive() - signal.created_at.date_naive()).num_days();

        let invalidated = match direction {
            Direction::Long => bar.close < setup.invalidation_level,
            Direction::Short => bar.close > setup.invalidation_level,
        };
        if invalidated {
            return ReplayResult {
                outcome: Outcome::Invalidated,
                outcome_at: Some(bar.timestamp),
                outcome_price: Some(bar.close),
                max_favorable_excursion: mfe,
                max_adverse_excursion: mae,
                days_to_outcome: Some(days),
                reached_t1,
            };
        }

        let stopped = match direction {
            Direction::Long => bar.low <= setup.stop,
            Direction::Short => bar.high >= setup.stop,
        };
        let hit_t2 = match direction {
            Direction::Long => bar.high >= setup.t2,
            Direction::Short => bar.low <= setup.t2,
        };
        let hit_t1 = match direction {
            Direction::Long => bar.high >= setup.t1,
            Direction::Short => bar.low <= setup.t1,
        };
        if hit_t1 {
            reached_t1 = true;
        }

        if stopped && hit_t2 {
            let (outcome, price) = match tie_break {
                TieBreak::StopWins => (Outcome::StoppedOut, setup.stop),
                TieBreak::TargetWins => (Outcome::HitT2, setup.t2),
            };
            return ReplayResult {
                outcome,
                outcome_at: Some(bar.timestamp),
                outcome_price: Some(price),
                max_favorable_excursion: mfe,
                max_adverse_excursion: mae,
                days_to_outcome: Some(days),
                reached_t1,
            };
        }
        if stopped {
            return ReplayResult {
                outcome: Outcome::StoppedOut,
                outcome_at: Some(bar.timestamp),
                outcome_price: Some(setup.stop),
                max_favorable_excursion: mfe,
                max_adverse_excursion: mae,
                days_to_outcome: Some(days),
                reached_t1,
            };
        }
        if hit_t2 {
            return ReplayResult {
                outcome: Outcome::HitT2,
                outcome_at: Some(bar.timestamp),
                outcome_price: Some(setup.t2),
                max_favorable_excursion: mfe,
                max_adverse_excursion: mae,
                days_to_outcome: Some(days),
                reached_t1,
            };
        }
    }

    let age_days = (now.date_naive() - signal.created_at.date_naive()).num_days();
    if age_days > max_age_days {
        return ReplayResult {
            outcome: Outcome::Expired,
            outcome_at: Some(now),
            outcome_price: None,
            max_favorable_excursion: mfe,
            max_adverse_excursion: mae,
            days_to_outcome: Some(age_days),
            reached_t1,
        };
    }

    ReplayResult {
        outcome: Outcome::Pending,
        outcome_at: None,
        outcome_price: None,
        max_favorable_excursion: mfe,
        max_adverse_excursion: mae,
        days_to_outcome: None,
        reached_t1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::{BiasAlignment, CTAZone, ConfluenceBlock, SectorWind, SetupContext, SignalConfidence, SignalSetup, SignalStatus, SignalType, StopAnchor};
    use chrono::TimeZone;

    fn bar(day: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 21, 0, 0).unwrap() + chrono::Duration::days(day),
            open: close,
            high,
            low,
            close,
            volume: 1_000_000.0,
        }
    }

    fn long_signal() -> Signal {
        Signal {
            signal_id: "x".into(),
            symbol: "SPY".into(),
            direction: Direction::Long,
            signal_type: SignalType::GoldenTouch,
            signal_source: "test".into(),
            setup: SignalSetup {
                entry: 50.0,
                entry_window_low: 49.5,
                entry_window_high: 50.5,
                stop: 49.0,
                t1: 51.0,
                t2: 53.0,
                rr_t1: 2.0,
                rr_t2: 4.0,
                invalidation_level: 48.0,
                invalidation_reason: "test".into(),
            },
            setup_context: SetupContext {
                stop_anchor: StopAnchor { description: "test".into(), sma_period: None },
                rr_profile_key: "test".into(),
                sector_wind: SectorWind::Unknown,
                bias_alignment: BiasAlignment::Unknown,
                confluence: ConfluenceBlock::default(),
                flow_confirmation: None,
                zone_upgrade_context: None,
                zone_downgrade_context: None,
            },
            priority: 50,
            score: 50.0,
            confidence: SignalConfidence::Medium,
            zone: CTAZone::MaxLong,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 21, 0, 0).unwrap(),
            status: SignalStatus::Active,
        }
    }

    #[test]
    fn scenario_6_hits_t2_on_day_2_after_t1_on_day_1() {
        let signal = long_signal();
        let bars = vec![bar(1, 51.2, 50.0, 51.0), bar(2, 53.1, 50.5, 53.0)];
        let now = signal.created_at + chrono::Duration::days(3);

        let result = replay(&signal, &bars, now, DEFAULT_MAX_AGE_DAYS, TieBreak::default());
        assert_eq!(result.outcome, Outcome::HitT2);
        assert!(result.reached_t1);
        assert_eq!(result.days_to_outcome, Some(2));
        assert!(result.max_favorable_excursion >= 3.1);
        assert!(result.max_adverse_excursion >= 0.0);
    }

    #[test]
    fn stop_and_target_in_same_bar_defaults_to_stop_wins() {
        let signal = long_signal();
        let bars = vec![bar(1, 53.5, 48.5, 51.0)];
        let now = signal.created_at + chrono::Duration::days(2);

        let result = replay(&signal, &bars, now, DEFAULT_MAX_AGE_DAYS, TieBreak::default());
        assert_eq!(result.outcome, Outcome::StoppedOut);
    }

    #[test]
    fn beyond_max_age_expires() {
        let signal = long_signal();
        let bars = vec![bar(1, 50.2, 49.8, 50.0)];
        let now = signal.created_at + chrono::Duration::days(11);

        let result = replay(&signal, &bars, now, DEFAULT_MAX_AGE_DAYS, TieBreak::default());
        assert_eq!(result.outcome, Outcome::Expired);
    }

    #[test]
    fn close_below_invalidation_invalidates() {
        let signal = long_signal();
        let bars = vec![bar(1, 50.0, 47.0, 47.5)];
        let now = signal.created_at + chrono::Duration::days(2);

        let result = replay(&signal, &bars, now, DEFAULT_MAX_AGE_DAYS, TieBreak::default());
        assert_eq!(result.outcome, Outcome::Invalidated);
    }
}
