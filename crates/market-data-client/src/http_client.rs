use std::time::Duration;

use async_trait::async_trait;
use bias_core::{Bar, EngineError, EngineResult, PriceProvider};
use serde::Deserialize;

/// Bounded-retry HTTP client over a price-history provider. Acquisition of
/// price history is an external collaborator by design; this is the
/// contract boundary plus the concrete implementation of the retry/timeout
/// policy the concurrency model requires of it.
pub struct HttpPriceProvider {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Vec<Bar>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: f64,
}

impl HttpPriceProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> EngineResult<T> {
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .get(format!("{}{}", self.base_url, path))
                .timeout(self.timeout)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(resp) => {
                    return resp
                        .json::<T>()
                        .await
                        .map_err(|e| EngineError::Internal(format!("malformed provider response: {e}")));
                }
                Err(e) if e.is_timeout() => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(EngineError::ProviderTimeout(self.timeout));
                    }
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(EngineError::GatewayUnavailable(e.to_string()));
                    }
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                }
            }
        }
    }
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    async fn bars(&self, symbol: &str, lookback_days: u32) -> EngineResult<Vec<Bar>> {
        let resp: BarsResponse = self.get_json(&format!("/bars/{symbol}?days={lookback_days}")).await?;
        Ok(resp.bars)
    }

    async fn latest_price(&self, symbol: &str) -> EngineResult<f64> {
        let resp: QuoteResponse = self.get_json(&format!("/quote/{symbol}")).await?;
        Ok(resp.price)
    }
}
