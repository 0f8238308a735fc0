use bias_core::{Direction, SignalType};

/// Entry window `[low, high]` around the trigger. Defined natively for
/// longs against each type's characteristic anchor; shorts mirror the same
/// offsets on the opposite side of the anchor/entry.
pub fn entry_window(signal_type: &SignalType, direction: Direction, entry: f64, atr: f64, sma20: f64, sma50: f64) -> (f64, f64) {
    match (signal_type, direction) {
        (SignalType::GoldenTouch, Direction::Long) => (sma20, sma20 + 0.75 * atr),
        (SignalType::GoldenTouch, Direction::Short) => (sma20 - 0.75 * atr, sma20),
        (SignalType::PullbackEntry, Direction::Long) => (sma50, sma50 + 0.75 * atr),
        (SignalType::PullbackEntry, Direction::Short) => (sma50 - 0.75 * atr, sma50),
        (SignalType::TwoCloseVolume, Direction::Long) => (entry - 0.25 * atr, entry + 1.0 * atr),
        (SignalType::TwoCloseVolume, Direction::Short) => (entry - 1.0 * atr, entry + 0.25 * atr),
        (SignalType::TrappedShorts, Direction::Long) => (entry - 0.5 * atr, entry + 1.0 * atr),
        (SignalType::TrappedShorts, Direction::Short) => (entry - 1.0 * atr, entry + 0.5 * atr),
        (SignalType::Generic(_), Direction::Long) => (entry - 0.5 * atr, entry + 0.75 * atr),
        (SignalType::Generic(_), Direction::Short) => (entry - 0.75 * atr, entry + 0.5 * atr),
    }
}

/// Whether price is still inside the entry window. The window itself
/// already encodes directionality (computed above), so staleness here is
/// just "has price moved through it" — no wall-clock expiry of its own.
pub fn is_still_actionable(current_price: f64, low: f64, high: f64) -> bool {
    current_price >= low && current_price <= high
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_touch_long_window_sits_above_sma20() {
        let (low, high) = entry_window(&SignalType::GoldenTouch, Direction::Long, 100.0, 2.0, 99.5, 97.0);
        assert_eq!(low, 99.5);
        assert_eq!(high, 101.0);
    }

    #[test]
    fn price_beyond_window_no_longer_actionable() {
        assert!(!is_still_actionable(102.0, 99.5, 101.0));
        assert!(is_still_actionable(100.0, 99.5, 101.0));
    }
}
