use bias_core::Direction;

pub struct Targets {
    pub t1: f64,
    pub t2: f64,
}

/// T2 is a pure ATR multiple off entry. T1 is the midpoint of the reward
/// distance, clipped to the nearest SMA sitting strictly between entry and
/// T2 (price often stalls there first); if that clip would leave less than
/// 75% of the full-risk reward, T1 collapses onto T2 (single-target trade).
pub fn compute_targets(
    direction: Direction,
    entry: f64,
    risk: f64,
    target_atr_mult: f64,
    atr: f64,
    smas: &[f64],
) -> Targets {
    let t2 = match direction {
        Direction::Long => entry + target_atr_mult * atr,
        Direction::Short => entry - target_atr_mult * atr,
    };
    let reward = (t2 - entry).abs();
    let half_point = match direction {
        Direction::Long => entry + 0.5 * reward,
        Direction::Short => entry - 0.5 * reward,
    };

    let between: Vec<f64> = smas
        .iter()
        .copied()
        .filter(|&s| match direction {
            Direction::Long => s > entry && s < t2,
            Direction::Short => s < entry && s > t2,
        })
        .collect();

    let mut t1 = match direction {
        Direction::Long => between
            .iter()
            .copied()
            .min_by(|a, b| a.partial_cmp(b).unwrap())
            .map(|nearest| half_point.min(nearest))
            .unwrap_or(half_point),
        Direction::Short => between
            .iter()
            .copied()
            .max_by(|a, b| a.partial_cmp(b).unwrap())
            .map(|nearest| half_point.max(nearest))
            .unwrap_or(half_point),
    };

    if (t1 - entry).abs() < 0.75 * risk {
        t1 = t2;
    }

    Targets { t1, t2 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_5_no_intervening_sma_uses_half_reward() {
        let targets = compute_targets(Direction::Long, 100.0, 1.0, 3.5, 2.0, &[99.5, 97.0, 92.0]);
        assert_eq!(targets.t2, 107.0);
        assert_eq!(targets.t1, 103.5);
    }

    #[test]
    fn clips_t1_to_intervening_sma() {
        let targets = compute_targets(Direction::Long, 100.0, 1.0, 3.0, 2.0, &[102.0]);
        // half_point = 103.0, sma at 102.0 is nearer -> t1 clips to 102.0
        assert_eq!(targets.t1, 102.0);
    }

    #[test]
    fn collapses_t1_into_t2_when_clip_too_shallow() {
        // risk=1.0, clip would give t1-entry = 0.5 < 0.75*risk -> collapse
        let targets = compute_targets(Direction::Long, 100.0, 1.0, 3.0, 2.0, &[100.5]);
        assert_eq!(targets.t1, targets.t2);
    }
}
