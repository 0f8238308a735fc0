use std::collections::HashSet;

use bias_core::{ConfluenceBlock, Direction, Signal, SignalConfidence, SignalType};

const BASE_ALIGNED_BOOST: i32 = 25;
const HIGH_CONFIDENCE_BOOST_THRESHOLD: i32 = 40;

/// Table-driven combo boosts for specific signal-type co-occurrences.
/// Only GOLDEN_TOUCH+TRAPPED_SHORTS is a named example; the rest extend
/// the same "reinforcing setups" idea to other natural pairings.
fn combo_boost(labels: &HashSet<&str>) -> Option<(i32, &'static str)> {
    if labels.contains(SignalType::GoldenTouch.label()) && labels.contains(SignalType::TrappedShorts.label()) {
        return Some((40, "squeeze into trend"));
    }
    if labels.contains(SignalType::PullbackEntry.label()) && labels.contains(SignalType::TwoCloseVolume.label()) {
        return Some((30, "volume confirms the pullback"));
    }
    None
}

pub struct ConfluenceOutcome {
    pub signal_id: String,
    pub new_priority: i32,
    pub new_confidence: SignalConfidence,
    pub block: ConfluenceBlock,
}

/// Merges every active signal for one symbol. Pure function: no I/O, safe
/// to unit test directly against worked scenarios.
pub fn merge_symbol(signals: &[Signal]) -> Vec<ConfluenceOutcome> {
    if signals.len() < 2 {
        return Vec::new();
    }

    let directions: HashSet<Direction> = signals.iter().map(|s| s.direction).collect();
    let conflicting = directions.len() > 1;

    signals
        .iter()
        .map(|signal| {
            let aligned: Vec<&Signal> =
                signals.iter().filter(|s| s.signal_id != signal.signal_id && s.direction == signal.direction).collect();

            let mut boost = 0i32;
            let mut label = None;
            if !aligned.is_empty() {
                boost += BASE_ALIGNED_BOOST;
            }

            let labels: HashSet<&str> =
                std::iter::once(signal.signal_type.label()).chain(aligned.iter().map(|s| s.signal_type.label())).collect();
            if let Some((combo, combo_label)) = combo_boost(&labels) {
                boost += combo;
                label = Some(combo_label.to_string());
            }

            let new_confidence = if conflicting {
                SignalConfidence::Low
            } else if boost >= HIGH_CONFIDENCE_BOOST_THRESHOLD {
                SignalConfidence::High
            } else {
                signal.confidence
            };

            let block = ConfluenceBlock {
                aligned_signal_ids: aligned.iter().map(|s| s.signal_id.clone()).collect(),
                boost,
                label,
                conflicting,
            };

            ConfluenceOutcome { signal_id: signal.signal_id.clone(), new_priority: signal.priority + boost, new_confidence, block }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::{CTAZone, SetupContext, SignalSetup, SignalStatus, StopAnchor, BiasAlignment, SectorWind};
    use chrono::Utc;

    fn signal(id: &str, direction: Direction, signal_type: SignalType, priority: i32, confidence: SignalConfidence) -> Signal {
        Signal {
            signal_id: id.to_string(),
            symbol: "SPY".into(),
            direction,
            signal_type,
            signal_source: "test".into(),
            setup: SignalSetup {
                entry: 100.0,
                entry_window_low: 99.0,
                entry_window_high: 101.0,
                stop: 98.0,
                t1: 103.0,
                t2: 106.0,
                rr_t1: 1.5,
                rr_t2: 3.0,
                invalidation_level: 97.0,
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
            priority,
            score: priority as f64,
            confidence,
            zone: CTAZone::MaxLong,
            created_at: Utc::now(),
            status: SignalStatus::Active,
        }
    }

    #[test]
    fn single_signal_gets_no_confluence() {
        let signals = vec![signal("a", Direction::Long, SignalType::GoldenTouch, 50, SignalConfidence::Medium)];
        assert!(merge_symbol(&signals).is_empty());
    }

    #[test]
    fn two_aligned_signals_get_base_boost() {
        let signals = vec![
            signal("a", Direction::Long, SignalType::GoldenTouch, 50, SignalConfidence::Medium),
            signal("b", Direction::Long, SignalType::PullbackEntry, 45, SignalConfidence::Medium),
        ];
        let outcomes = merge_symbol(&signals);
        assert_eq!(outcomes.len(), 2);
        for o in &outcomes {
            assert_eq!(o.block.boost, 25);
            assert!(!o.block.conflicting);
        }
    }

    #[test]
    fn golden_touch_and_trapped_shorts_combo_promotes_to_high() {
        let signals = vec![
            signal("a", Direction::Long, SignalType::GoldenTouch, 50, SignalConfidence::Medium),
            signal("b", Direction::Long, SignalType::TrappedShorts, 50, SignalConfidence::Medium),
        ];
        let outcomes = merge_symbol(&signals);
        let a = outcomes.iter().find(|o| o.signal_id == "a").unwrap();
        assert_eq!(a.block.boost, 65);
        assert_eq!(a.new_confidence, SignalConfidence::High);
        assert_eq!(a.block.label.as_deref(), Some("squeeze into trend"));
    }

    #[test]
    fn conflicting_directions_force_low_confidence() {
        let signals = vec![
            signal("a", Direction::Long, SignalType::GoldenTouch, 50, SignalConfidence::High),
            signal("b", Direction::Short, SignalType::TrappedShorts, 50, SignalConfidence::High),
        ];
        let outcomes = merge_symbol(&signals);
        for o in &outcomes {
            assert_eq!(o.new_confidence, SignalConfidence::Low);
            assert!(o.block.conflicting);
        }
    }
}
