use bias_core::{CTAZone, Direction, SectorWind};
use gateway::{keys, Gateway};

/// Whether the signal's sector ETF CTA zone supports or fights the
/// signal's direction. A constructive zone (MAX_LONG/RECOVERY) is a
/// tailwind for longs and a headwind for shorts, and vice versa for a
/// destructive zone; TRANSITION/DE_LEVERAGING read as neutral.
pub fn classify(gateway: &Gateway, sector_symbol: &str, direction: Direction) -> SectorWind {
    let Some(zone) = gateway.cache.get_json::<CTAZone>(&keys::cta_zone(sector_symbol)) else {
        return SectorWind::Unknown;
    };

    let constructive = matches!(zone, CTAZone::MaxLong | CTAZone::Recovery);
    let destructive = matches!(zone, CTAZone::Waterfall | CTAZone::Capitulation);

    match direction {
        Direction::Long if constructive => SectorWind::Tailwind,
        Direction::Long if destructive => SectorWind::Headwind,
        Direction::Short if destructive => SectorWind::Tailwind,
        Direction::Short if constructive => SectorWind::Headwind,
        _ => SectorWind::Neutral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_sector_zone_is_unknown() {
        let gw = Gateway::connect("sqlite::memory:").await.unwrap();
        assert_eq!(classify(&gw, "XLK", Direction::Long), SectorWind::Unknown);
    }

    #[tokio::test]
    async fn constructive_zone_is_tailwind_for_longs() {
        let gw = Gateway::connect("sqlite::memory:").await.unwrap();
        gw.cache.put_json(keys::cta_zone("XLK"), &CTAZone::MaxLong, None).unwrap();
        assert_eq!(classify(&gw, "XLK", Direction::Long), SectorWind::Tailwind);
        assert_eq!(classify(&gw, "XLK", Direction::Short), SectorWind::Headwind);
    }
}
