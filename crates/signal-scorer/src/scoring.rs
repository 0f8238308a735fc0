use bias_core::{BiasAlignment, CTAZone, CircuitBreakerState, Direction, SectorWind, SignalConfidence, SignalType};

/// Zone bonus table. Extreme-constructive and extreme-exhaustion zones
/// score best; the muddy middle (TRANSITION/DE_LEVERAGING) scores worst.
fn zone_bonus(zone: CTAZone) -> f64 {
    match zone {
        CTAZone::MaxLong => 10.0,
        CTAZone::Recovery => 6.0,
        CTAZone::Transition => -5.0,
        CTAZone::DeLeveraging => -6.0,
        CTAZone::Waterfall => -10.0,
        CTAZone::Capitulation => 4.0,
    }
}

/// RSI contributes only when present — never backfilled from ADX or any
/// other oscillator.
fn rsi_bonus(direction: Direction, rsi: f64) -> f64 {
    match direction {
        Direction::Long if rsi < 30.0 => 10.0,
        Direction::Long if rsi > 70.0 => -10.0,
        Direction::Short if rsi > 70.0 => 10.0,
        Direction::Short if rsi < 30.0 => -10.0,
        _ => 0.0,
    }
}

pub struct ScoringInputs {
    pub zone: CTAZone,
    pub direction: Direction,
    pub rsi: Option<f64>,
    pub sector_wind: SectorWind,
    pub conviction: f64,
}

/// Step 10 assembly: base score for the signal type, plus zone/technical/
/// sector bonuses, scaled by bias-alignment conviction and the active
/// circuit-breaker scoring multiplier for the trade's direction.
pub fn score(signal_type: &SignalType, inputs: &ScoringInputs, breaker: &CircuitBreakerState) -> f64 {
    let mut s = signal_type.base_score();
    s += zone_bonus(inputs.zone);
    if let Some(rsi) = inputs.rsi {
        s += rsi_bonus(inputs.direction, rsi);
    }
    s += match inputs.sector_wind {
        SectorWind::Tailwind => 8.0,
        SectorWind::Headwind => -8.0,
        SectorWind::Neutral | SectorWind::Unknown => 0.0,
    };
    s *= inputs.conviction;
    s *= match inputs.direction {
        Direction::Long => breaker.long_scoring_multiplier,
        Direction::Short => breaker.short_scoring_multiplier,
    };
    s
}

/// Confidence banding directly off the assembled score.
pub fn confidence_from_score(score: f64) -> SignalConfidence {
    if score >= 60.0 {
        SignalConfidence::High
    } else if score >= 30.0 {
        SignalConfidence::Medium
    } else {
        SignalConfidence::Low
    }
}

/// Step 11: a breaker-imposed bearish floor denies LONG signals outright —
/// downgrade to LOW confidence unless the setup is itself a reversal play
/// (TRAPPED_SHORTS is the only type in the closed set built around
/// short-covering exhaustion, so it's exempted).
pub fn apply_breaker_denial(
    direction: Direction,
    signal_type: &SignalType,
    breaker: &CircuitBreakerState,
    confidence: SignalConfidence,
) -> SignalConfidence {
    let long_denied = matches!(direction, Direction::Long) && breaker.bias_floor.is_some();
    let is_exhaustion_setup = matches!(signal_type, SignalType::TrappedShorts);
    if long_denied && !is_exhaustion_setup {
        SignalConfidence::Low
    } else {
        confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::BiasLevel;

    #[test]
    fn max_long_zone_with_tailwind_scores_above_base() {
        let breaker = CircuitBreakerState::default();
        let inputs = ScoringInputs {
            zone: CTAZone::MaxLong,
            direction: Direction::Long,
            rsi: None,
            sector_wind: SectorWind::Tailwind,
            conviction: BiasAlignment::Aligned.conviction_multiplier(),
        };
        let s = score(&SignalType::GoldenTouch, &inputs, &breaker);
        assert!(s > SignalType::GoldenTouch.base_score());
    }

    #[test]
    fn breaker_floor_denies_long_unless_trapped_shorts() {
        let mut breaker = CircuitBreakerState::default();
        breaker.bias_floor = Some(BiasLevel::UrsaMinor);
        let denied = apply_breaker_denial(Direction::Long, &SignalType::GoldenTouch, &breaker, SignalConfidence::High);
        assert_eq!(denied, SignalConfidence::Low);

        let exempt = apply_breaker_denial(Direction::Long, &SignalType::TrappedShorts, &breaker, SignalConfidence::High);
        assert_eq!(exempt, SignalConfidence::High);
    }
}
