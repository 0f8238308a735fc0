use bias_core::{BiasLevel, BreakerTrigger, CircuitBreakerState};
use chrono::{DateTime, Utc};

/// Per-trigger effect on the composite, before composition across the
/// active trigger set.
struct RuleEffect {
    ceiling: Option<BiasLevel>,
    floor: Option<BiasLevel>,
    long_mult: f64,
    short_mult: f64,
    clears_all: bool,
}

fn effect_for(trigger: BreakerTrigger) -> RuleEffect {
    match trigger {
        BreakerTrigger::SpyDown1Pct => RuleEffect {
            ceiling: Some(BiasLevel::ToroMinor),
            floor: None,
            long_mult: 0.90,
            short_mult: 1.10,
            clears_all: false,
        },
        BreakerTrigger::SpyDown2Pct => RuleEffect {
            ceiling: None,
            floor: Some(BiasLevel::UrsaMinor),
            long_mult: 0.75,
            short_mult: 1.30,
            clears_all: false,
        },
        BreakerTrigger::VixSpike => RuleEffect {
            ceiling: Some(BiasLevel::ToroMinor),
            floor: None,
            long_mult: 0.85,
            short_mult: 1.15,
            clears_all: false,
        },
        BreakerTrigger::VixExtreme => RuleEffect {
            ceiling: Some(BiasLevel::ToroMinor),
            floor: Some(BiasLevel::UrsaMinor),
            long_mult: 0.70,
            short_mult: 1.30,
            clears_all: false,
        },
        BreakerTrigger::SpyUp2Pct => RuleEffect {
            ceiling: None,
            floor: Some(BiasLevel::UrsaMinor),
            long_mult: 1.10,
            short_mult: 0.90,
            clears_all: false,
        },
        BreakerTrigger::SpyRecovery => {
            RuleEffect { ceiling: None, floor: None, long_mult: 1.0, short_mult: 1.0, clears_all: true }
        }
    }
}

/// Fold the per-trigger effects of an active trigger set into one state,
/// per the composition rule: strictest ceiling (most bearish), strictest
/// floor (least bearish), min long multiplier, max short multiplier.
fn recompute(triggers: Vec<BreakerTrigger>, prior_engaged_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CircuitBreakerState {
    if triggers.is_empty() {
        return CircuitBreakerState::default();
    }

    let effects: Vec<RuleEffect> = triggers.iter().map(|t| effect_for(*t)).collect();

    let ceiling = effects.iter().filter_map(|e| e.ceiling).min_by_key(|b| b.ordinal());
    let floor = effects.iter().filter_map(|e| e.floor).max_by_key(|b| b.ordinal());
    let long_mult = effects.iter().map(|e| e.long_mult).fold(f64::INFINITY, f64::min);
    let short_mult = effects.iter().map(|e| e.short_mult).fold(f64::NEG_INFINITY, f64::max);

    CircuitBreakerState {
        active_triggers: triggers,
        bias_ceiling: ceiling,
        bias_floor: floor,
        long_scoring_multiplier: long_mult,
        short_scoring_multiplier: short_mult,
        engaged_at: Some(prior_engaged_at.unwrap_or(now)),
    }
}

/// Apply one incoming trigger event to the current state, idempotently:
/// submitting the same trigger twice leaves the state unchanged.
/// `SPY_RECOVERY` clears the active set entirely regardless of prior state.
pub fn apply_trigger(state: &CircuitBreakerState, trigger: BreakerTrigger, now: DateTime<Utc>) -> CircuitBreakerState {
    let effect = effect_for(trigger);
    if effect.clears_all {
        return CircuitBreakerState::default();
    }

    let mut triggers = state.active_triggers.clone();
    if !triggers.contains(&trigger) {
        triggers.push(trigger);
    }
    recompute(triggers, state.engaged_at, now)
}

/// `floor` is a lower bound: the composite may not be MORE BEARISH than the
/// floor level. `ceiling` is an upper bound: the composite may not be MORE
/// BULLISH than the ceiling level. Confirmed against the worked example
/// where a URSA_MAJOR composite under an URSA_MINOR floor clamps up to
/// URSA_MINOR.
pub fn clamp_bias_level(level: BiasLevel, state: &CircuitBreakerState) -> BiasLevel {
    let mut ord = level.ordinal();
    if let Some(ceiling) = state.bias_ceiling {
        ord = ord.min(ceiling.ordinal());
    }
    if let Some(floor) = state.bias_floor {
        ord = ord.max(floor.ordinal());
    }
    BiasLevel::from_ordinal(ord)
}

/// True once the breaker has been engaged for at least 24h as of the next
/// market open, per the auto-reset policy. Explicit RECOVERY events reset
/// the breaker immediately via `apply_trigger` and don't go through here.
pub fn due_for_auto_reset(state: &CircuitBreakerState, next_market_open: DateTime<Utc>) -> bool {
    match state.engaged_at {
        Some(engaged_at) => next_market_open >= engaged_at + chrono::Duration::hours(24),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, hour, 0, 0).unwrap()
    }

    #[test]
    fn single_trigger_sets_state() {
        let state = apply_trigger(&CircuitBreakerState::default(), BreakerTrigger::SpyDown1Pct, t(9));
        assert_eq!(state.bias_ceiling, Some(BiasLevel::ToroMinor));
        assert_eq!(state.bias_floor, None);
        assert_eq!(state.long_scoring_multiplier, 0.90);
        assert_eq!(state.short_scoring_multiplier, 1.10);
    }

    #[test]
    fn duplicate_trigger_is_idempotent() {
        let s1 = apply_trigger(&CircuitBreakerState::default(), BreakerTrigger::SpyDown2Pct, t(9));
        let s2 = apply_trigger(&s1, BreakerTrigger::SpyDown2Pct, t(10));
        assert_eq!(s1.active_triggers, s2.active_triggers);
        assert_eq!(s1.bias_floor, s2.bias_floor);
        assert_eq!(s1.engaged_at, s2.engaged_at);
    }

    #[test]
    fn composition_takes_strictest_ceiling_and_floor() {
        let s1 = apply_trigger(&CircuitBreakerState::default(), BreakerTrigger::SpyDown1Pct, t(9));
        let s2 = apply_trigger(&s1, BreakerTrigger::VixExtreme, t(9));
        // Both contribute TORO_MINOR ceiling; VIX_EXTREME adds URSA_MINOR floor.
        assert_eq!(s2.bias_ceiling, Some(BiasLevel::ToroMinor));
        assert_eq!(s2.bias_floor, Some(BiasLevel::UrsaMinor));
        assert_eq!(s2.long_scoring_multiplier, 0.70);
        assert_eq!(s2.short_scoring_multiplier, 1.30);
    }

    #[test]
    fn recovery_clears_everything() {
        let s1 = apply_trigger(&CircuitBreakerState::default(), BreakerTrigger::VixExtreme, t(9));
        let s2 = apply_trigger(&s1, BreakerTrigger::SpyRecovery, t(10));
        assert!(!s2.is_engaged());
        assert_eq!(s2.bias_ceiling, None);
        assert_eq!(s2.bias_floor, None);
    }

    #[test]
    fn clamp_respects_scenario_3() {
        let state = apply_trigger(&CircuitBreakerState::default(), BreakerTrigger::SpyDown2Pct, t(9));
        assert_eq!(clamp_bias_level(BiasLevel::ToroMinor, &state), BiasLevel::ToroMinor);
        assert_eq!(clamp_bias_level(BiasLevel::UrsaMajor, &state), BiasLevel::UrsaMinor);
    }

    #[test]
    fn auto_reset_after_24h_at_next_open() {
        let state = apply_trigger(&CircuitBreakerState::default(), BreakerTrigger::VixSpike, t(9));
        assert!(!due_for_auto_reset(&state, t(9) + chrono::Duration::hours(23)));
        assert!(due_for_auto_reset(&state, t(9) + chrono::Duration::hours(25)));
    }
}
