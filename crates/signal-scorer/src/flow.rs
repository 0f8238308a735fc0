use bias_core::Direction;
use gateway::{keys, Gateway};
use serde::Deserialize;

#[derive(Deserialize)]
struct FlowReading {
    bullish: bool,
}

/// Unusual-options-flow confirmation/conflict note for the setup context.
/// `None` when no flow reading is cached for the symbol — flow is an
/// enrichment, not a requirement.
pub fn confirmation(gateway: &Gateway, symbol: &str, direction: Direction) -> Option<String> {
    let flow = gateway.cache.get_json::<FlowReading>(&keys::uw_flow(symbol))?;
    let aligned = match direction {
        Direction::Long => flow.bullish,
        Direction::Short => !flow.bullish,
    };
    Some(if aligned {
        "unusual options flow confirms direction".to_string()
    } else {
        "unusual options flow conflicts with direction".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_cached_flow_yields_none() {
        let gw = Gateway::connect("sqlite::memory:").await.unwrap();
        assert!(confirmation(&gw, "SPY", Direction::Long).is_none());
    }

    #[tokio::test]
    async fn bullish_flow_confirms_long() {
        let gw = Gateway::connect("sqlite::memory:").await.unwrap();
        gw.cache.put_json(keys::uw_flow("SPY"), &FlowReading { bullish: true }, None).unwrap();
        assert!(confirmation(&gw, "SPY", Direction::Long).unwrap().contains("confirms"));
        assert!(confirmation(&gw, "SPY", Direction::Short).unwrap().contains("conflicts"));
    }
}
