use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bias_core::{Bar, EngineResult, PriceProvider};
use gateway::{keys, Gateway};
use tracing::warn;

const BAR_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Result of a resilient fetch: whether it came straight from the
/// underlying provider or from the fallback cache after the provider
/// failed persistently. Callers building a FactorReading from this use
/// `from_fallback` to set `source = FALLBACK_CACHE` and mark the reading
/// unverifiable.
pub struct PriceFetch {
    pub bars: Vec<Bar>,
    pub from_fallback: bool,
}

/// Wraps a `PriceProvider` with a local fallback cache, consulted only
/// after the inner provider has exhausted its own retries.
pub struct FallbackCacheProvider {
    inner: Arc<dyn PriceProvider>,
    gateway: Arc<Gateway>,
}

impl FallbackCacheProvider {
    pub fn new(inner: Arc<dyn PriceProvider>, gateway: Arc<Gateway>) -> Self {
        Self { inner, gateway }
    }

    pub async fn fetch_bars(&self, symbol: &str, lookback_days: u32) -> EngineResult<PriceFetch> {
        let key = keys::price(1, symbol, lookback_days, "adj");
        match self.inner.bars(symbol, lookback_days).await {
            Ok(bars) => {
                self.gateway.cache.put_json(key, &bars, Some(BAR_CACHE_TTL)).ok();
                Ok(PriceFetch { bars, from_fallback: false })
            }
            Err(e) => {
                warn!(symbol, error = %e, "provider failed, consulting fallback cache");
                match self.gateway.cache.get_json::<Vec<Bar>>(&key) {
                    Some(bars) => Ok(PriceFetch { bars, from_fallback: true }),
                    None => Err(e),
                }
            }
        }
    }

    pub async fn latest_price(&self, symbol: &str) -> EngineResult<f64> {
        self.inner.latest_price(symbol).await
    }
}

#[async_trait]
impl PriceProvider for FallbackCacheProvider {
    async fn bars(&self, symbol: &str, lookback_days: u32) -> EngineResult<Vec<Bar>> {
        Ok(self.fetch_bars(symbol, lookback_days).await?.bars)
    }

    async fn latest_price(&self, symbol: &str) -> EngineResult<f64> {
        self.inner.latest_price(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::EngineError;
    use chrono::Utc;

    struct AlwaysFails;

    #[async_trait]
    impl PriceProvider for AlwaysFails {
        async fn bars(&self, _symbol: &str, _lookback_days: u32) -> EngineResult<Vec<Bar>> {
            Err(EngineError::ProviderTimeout(Duration::from_secs(10)))
        }

        async fn latest_price(&self, _symbol: &str) -> EngineResult<f64> {
            Err(EngineError::ProviderTimeout(Duration::from_secs(10)))
        }
    }

    #[tokio::test]
    async fn falls_back_to_cache_on_persistent_failure() {
        let gw = Arc::new(Gateway::connect("sqlite::memory:").await.unwrap());
        let bars = vec![Bar { timestamp: Utc::now(), open: 1.0, high: 2.0, low: 0.5, close: 1.5, volume: 100.0 }];
        gw.cache.put_json(keys::price(1, "SPY", 30, "adj"), &bars, None).unwrap();

        let provider = FallbackCacheProvider::new(Arc::new(AlwaysFails), gw);
        let fetch = provider.fetch_bars("SPY", 30).await.unwrap();
        assert!(fetch.from_fallback);
        assert_eq!(fetch.bars.len(), 1);
    }

    #[tokio::test]
    async fn propagates_error_when_no_fallback_available() {
        let gw = Arc::new(Gateway::connect("sqlite::memory:").await.unwrap());
        let provider = FallbackCacheProvider::new(Arc::new(AlwaysFails), gw);
        assert!(provider.fetch_bars("SPY", 30).await.is_err());
    }
}
