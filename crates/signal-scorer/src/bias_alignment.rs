use bias_core::{BiasAlignment, BiasLevel, CompositeResult, Direction};
use gateway::{keys, Gateway};

/// Reads the latest composite bias from cache and classifies whether the
/// signal's direction runs with it, against it, or the composite is
/// neutral/unavailable.
pub fn classify(gateway: &Gateway, direction: Direction) -> BiasAlignment {
    let Some(composite) = gateway.cache.get_json::<CompositeResult>(keys::BIAS_COMPOSITE_LATEST) else {
        return BiasAlignment::Unknown;
    };

    let bullish = matches!(composite.bias_level, BiasLevel::ToroMinor | BiasLevel::ToroMajor);
    let bearish = matches!(composite.bias_level, BiasLevel::UrsaMinor | BiasLevel::UrsaMajor);

    match direction {
        Direction::Long if bullish => BiasAlignment::Aligned,
        Direction::Long if bearish => BiasAlignment::CounterTrend,
        Direction::Short if bearish => BiasAlignment::Aligned,
        Direction::Short if bullish => BiasAlignment::CounterTrend,
        _ => BiasAlignment::Neutral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::Confidence;
    use chrono::Utc;
    use std::collections::HashMap;

    fn composite_with(level: BiasLevel) -> CompositeResult {
        CompositeResult {
            composite_score: 0.0,
            bias_level: level,
            active_factors: Vec::new(),
            stale_factors: Vec::new(),
            unverifiable_factors: Vec::new(),
            normalized_weights: HashMap::new(),
            velocity_multiplier: 1.0,
            override_applied: None,
            circuit_breaker_caps: None,
            confidence: Confidence::High,
            market_regime: None,
            computed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_composite_is_unknown() {
        let gw = Gateway::connect("sqlite::memory:").await.unwrap();
        assert_eq!(classify(&gw, Direction::Long), BiasAlignment::Unknown);
    }

    #[tokio::test]
    async fn bullish_composite_aligns_with_longs() {
        let gw = Gateway::connect("sqlite::memory:").await.unwrap();
        gw.cache.put_json(keys::BIAS_COMPOSITE_LATEST, &composite_with(BiasLevel::ToroMajor), None).unwrap();
        assert_eq!(classify(&gw, Direction::Long), BiasAlignment::Aligned);
        assert_eq!(classify(&gw, Direction::Short), BiasAlignment::CounterTrend);
    }
}
