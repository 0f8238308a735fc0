use bias_core::{BiasLevel, OverrideState};
use chrono::{DateTime, Utc};

/// Minimum band distance between the computed level and the override level
/// before the override is considered to have been invalidated by reality
/// and auto-cleared. Confirmed against the worked boundary case: one band
/// apart keeps the override, two bands apart clears it.
const AUTO_CLEAR_BAND_DISTANCE: i32 = 2;

/// Returns the winning bias level plus the override state to carry forward
/// (`None` if it expired or auto-cleared this call).
pub fn arbitrate(
    computed_level: BiasLevel,
    active_override: Option<&OverrideState>,
    now: DateTime<Utc>,
) -> (BiasLevel, Option<OverrideState>) {
    let Some(o) = active_override else {
        return (computed_level, None);
    };

    if o.expires_at <= now {
        return (computed_level, None);
    }

    if computed_level.bands_apart(o.level) >= AUTO_CLEAR_BAND_DISTANCE {
        return (computed_level, None);
    }

    (o.level, Some(o.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn over(level: BiasLevel, expires_in_secs: i64) -> OverrideState {
        OverrideState {
            level,
            reason: "test override".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn override_wins_when_within_one_band() {
        let o = over(BiasLevel::ToroMinor, 3600);
        let (level, kept) = arbitrate(BiasLevel::Neutral, Some(&o), Utc::now());
        assert_eq!(level, BiasLevel::ToroMinor);
        assert!(kept.is_some());
    }

    #[test]
    fn override_auto_clears_two_bands_apart() {
        let o = over(BiasLevel::ToroMinor, 3600);
        let (level, kept) = arbitrate(BiasLevel::UrsaMinor, Some(&o), Utc::now());
        assert_eq!(level, BiasLevel::UrsaMinor);
        assert!(kept.is_none());
    }

    #[test]
    fn expired_override_is_dropped() {
        let o = over(BiasLevel::ToroMajor, -10);
        let (level, kept) = arbitrate(BiasLevel::Neutral, Some(&o), Utc::now());
        assert_eq!(level, BiasLevel::Neutral);
        assert!(kept.is_none());
    }

    #[test]
    fn no_override_passes_through() {
        let (level, kept) = arbitrate(BiasLevel::ToroMajor, None, Utc::now());
        assert_eq!(level, BiasLevel::ToroMajor);
        assert!(kept.is_none());
    }
}
