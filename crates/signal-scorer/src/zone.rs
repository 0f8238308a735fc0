use bias_core::CTAZone;

/// Derives the CTA zone from price vs. the 20/50/120/200 SMA stack. Counts
/// how many of the four averages price sits above: all four is the most
/// constructive regime (MAX_LONG), none is the most destructive, split by
/// whether price has fallen meaningfully below the longest anchor
/// (CAPITULATION) or is merely below it (WATERFALL).
pub fn classify(price: f64, sma20: f64, sma50: f64, sma120: f64, sma200: f64) -> CTAZone {
    let above_count = [sma20, sma50, sma120, sma200].iter().filter(|&&sma| price > sma).count();

    match above_count {
        4 => CTAZone::MaxLong,
        3 => CTAZone::Recovery,
        2 => CTAZone::Transition,
        1 => CTAZone::DeLeveraging,
        _ => {
            if price < sma200 * 0.90 {
                CTAZone::Capitulation
            } else {
                CTAZone::Waterfall
            }
        }
    }
}

/// The SMA a given zone prefers as a stop anchor, per the spec's explicit
/// mapping for MAX_LONG/RECOVERY/DE_LEVERAGING. Zones the spec doesn't
/// name default to the longest-term anchor (200 SMA).
pub fn preferred_sma_period(zone: CTAZone) -> u32 {
    match zone {
        CTAZone::MaxLong => 20,
        CTAZone::Recovery => 50,
        CTAZone::DeLeveraging => 120,
        CTAZone::Waterfall | CTAZone::Capitulation | CTAZone::Transition => 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn above_all_four_is_max_long() {
        assert_eq!(classify(100.0, 99.5, 97.0, 92.0, 85.0), CTAZone::MaxLong);
    }

    #[test]
    fn below_all_with_deep_drop_is_capitulation() {
        assert_eq!(classify(60.0, 99.5, 97.0, 92.0, 85.0), CTAZone::Capitulation);
    }

    #[test]
    fn below_all_with_shallow_drop_is_waterfall() {
        assert_eq!(classify(84.0, 99.5, 97.0, 92.0, 85.0), CTAZone::Waterfall);
    }
}
