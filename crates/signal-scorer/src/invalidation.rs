use bias_core::{Direction, SignalType};

pub struct SmaStack {
    pub sma20: f64,
    pub sma50: f64,
    pub sma120: f64,
}

/// Invalidation level per signal type. Only GOLDEN_TOUCH's rule (close
/// below the 50 SMA minus a quarter-ATR buffer) comes from a worked
/// example; the others extend the same "anchor SMA minus buffer" shape to
/// each type's characteristic timeframe.
pub fn invalidation_level(signal_type: &SignalType, direction: Direction, atr: f64, smas: &SmaStack) -> (f64, String) {
    let (anchor, buffer, anchor_name) = match signal_type {
        SignalType::GoldenTouch => (smas.sma50, 0.25, "sma50"),
        SignalType::PullbackEntry => (smas.sma120, 0.25, "sma120"),
        SignalType::TwoCloseVolume => (smas.sma20, 0.5, "sma20"),
        SignalType::TrappedShorts => (smas.sma20, 0.5, "sma20"),
        SignalType::Generic(_) => (smas.sma50, 0.5, "sma50"),
    };

    match direction {
        Direction::Long => {
            let level = anchor - buffer * atr;
            (level, format!("close below {anchor_name} - {buffer}*ATR invalidates the setup"))
        }
        Direction::Short => {
            let level = anchor + buffer * atr;
            (level, format!("close above {anchor_name} + {buffer}*ATR invalidates the setup"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_touch_long_invalidates_below_sma50() {
        let smas = SmaStack { sma20: 99.5, sma50: 97.0, sma120: 92.0 };
        let (level, _) = invalidation_level(&SignalType::GoldenTouch, Direction::Long, 2.0, &smas);
        assert_eq!(level, 96.5);
    }

    #[test]
    fn short_direction_mirrors_above_anchor() {
        let smas = SmaStack { sma20: 99.5, sma50: 97.0, sma120: 92.0 };
        let (level, _) = invalidation_level(&SignalType::GoldenTouch, Direction::Short, 2.0, &smas);
        assert_eq!(level, 97.5);
    }
}
