use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{Bar, SubscriptionEvent};

/// Seam between the engine and whatever supplies OHLCV history. The
/// HTTP-backed implementation and its fallback-cache wrapper live in
/// `market-data-client`; tests implement this directly against fixtures.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn bars(&self, symbol: &str, lookback_days: u32) -> EngineResult<Vec<Bar>>;

    async fn latest_price(&self, symbol: &str) -> EngineResult<f64>;
}

/// Seam for publishing to the broadcast fabric, kept separate from its
/// concrete tokio-broadcast implementation so the composite engine and
/// scorers can be unit-tested without a running fabric.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> EngineResult<()>;
}

/// No-op sink for components under test that don't care about fan-out.
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _topic: &str, _payload: serde_json::Value) -> EngineResult<()> {
        Ok(())
    }
}

#[allow(dead_code)]
fn _assert_event_shape(_e: &SubscriptionEvent) {}
