use bias_core::{CTAZone, SignalType};

/// (stop_atr_mult, target_atr_mult) falls back to (1.5, 3.0) on miss.
pub const DEFAULT_PROFILE: (f64, f64) = (1.5, 3.0);

/// Table-driven lookup of `(signal_type, zone) -> (stop_atr_mult,
/// target_atr_mult)`. `stop_atr_mult` is only consulted as the pure-ATR
/// fallback when no SMA candidate qualifies for the stop.
pub fn lookup(signal_type: &SignalType, zone: CTAZone) -> (f64, f64) {
    match (signal_type, zone) {
        (SignalType::GoldenTouch, CTAZone::MaxLong) => (1.5, 3.5),
        (SignalType::GoldenTouch, CTAZone::Recovery) => (1.5, 3.0),
        (SignalType::PullbackEntry, CTAZone::Recovery) => (1.5, 3.0),
        (SignalType::PullbackEntry, CTAZone::DeLeveraging) => (2.0, 2.5),
        (SignalType::TwoCloseVolume, CTAZone::MaxLong) => (1.25, 2.5),
        (SignalType::TrappedShorts, CTAZone::Waterfall) => (1.5, 3.0),
        (SignalType::TrappedShorts, CTAZone::Capitulation) => (2.0, 4.0),
        _ => DEFAULT_PROFILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_5_profile_matches_worked_example() {
        assert_eq!(lookup(&SignalType::GoldenTouch, CTAZone::MaxLong), (1.5, 3.5));
    }

    #[test]
    fn unknown_combo_falls_back_to_default() {
        assert_eq!(lookup(&SignalType::Generic("X".into()), CTAZone::Transition), DEFAULT_PROFILE);
    }
}
