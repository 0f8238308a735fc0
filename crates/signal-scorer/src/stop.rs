use bias_core::{Direction, StopAnchor};

const EPSILON: f64 = 1e-9;

pub struct StopResult {
    pub stop: f64,
    pub anchor: StopAnchor,
}

/// SMA-anchored stop placement. Candidate SMAs on the protective side of
/// entry are offset by a quarter-ATR buffer, then accepted only if the
/// resulting risk distance falls in `[0.5*ATR, 3.0*ATR]`. The zone's
/// preferred SMA wins if it qualifies; otherwise the closest qualifying
/// candidate; otherwise a pure-ATR stop.
pub fn place_stop(
    direction: Direction,
    entry: f64,
    atr: f64,
    smas: &[(u32, f64)],
    preferred_period: u32,
    fallback_atr_mult: f64,
) -> StopResult {
    let candidates: Vec<(u32, f64, f64)> = smas
        .iter()
        .filter_map(|&(period, sma)| {
            let protective = match direction {
                Direction::Long => sma < entry,
                Direction::Short => sma > entry,
            };
            if !protective {
                return None;
            }
            let stop_candidate = match direction {
                Direction::Long => sma - 0.25 * atr,
                Direction::Short => sma + 0.25 * atr,
            };
            let risk = (entry - stop_candidate).abs();
            if risk >= 0.5 * atr - EPSILON && risk <= 3.0 * atr + EPSILON {
                Some((period, sma, stop_candidate))
            } else {
                None
            }
        })
        .collect();

    if let Some(&(period, _, stop)) = candidates.iter().find(|&&(period, _, _)| period == preferred_period) {
        return StopResult {
            stop,
            anchor: StopAnchor {
                description: format!("sma{period} - 0.25*ATR protective stop (zone preference)"),
                sma_period: Some(period),
            },
        };
    }

    if let Some(&(period, _, stop)) = candidates
        .iter()
        .min_by(|a, b| (a.1 - entry).abs().partial_cmp(&(b.1 - entry).abs()).unwrap())
    {
        return StopResult {
            stop,
            anchor: StopAnchor {
                description: format!("sma{period} closest qualifying protective stop"),
                sma_period: Some(period),
            },
        };
    }

    let stop = match direction {
        Direction::Long => entry - fallback_atr_mult * atr,
        Direction::Short => entry + fallback_atr_mult * atr,
    };
    StopResult {
        stop,
        anchor: StopAnchor {
            description: format!("{fallback_atr_mult}*ATR fallback stop, no SMA qualified"),
            sma_period: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_5_prefers_zone_sma_at_boundary_risk() {
        let smas = vec![(20, 99.5), (50, 97.0), (120, 92.0)];
        let result = place_stop(Direction::Long, 100.0, 2.0, &smas, 20, 1.5);
        assert_eq!(result.stop, 99.0);
        assert_eq!(result.anchor.sma_period, Some(20));
    }

    #[test]
    fn falls_back_to_pure_atr_when_no_sma_qualifies() {
        // sma20 too close (risk < 0.5*ATR)
        let smas = vec![(20, 99.9)];
        let result = place_stop(Direction::Long, 100.0, 2.0, &smas, 20, 1.5);
        assert_eq!(result.anchor.sma_period, None);
        assert_eq!(result.stop, 100.0 - 1.5 * 2.0);
    }

    #[test]
    fn picks_closest_qualifying_when_preferred_unavailable() {
        let smas = vec![(50, 97.0), (120, 92.0)];
        let result = place_stop(Direction::Long, 100.0, 2.0, &smas, 20, 1.5);
        assert_eq!(result.anchor.sma_period, Some(50));
    }
}
