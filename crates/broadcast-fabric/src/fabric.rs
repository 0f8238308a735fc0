use std::sync::Arc;

use async_trait::async_trait;
use bias_core::{EngineResult, EventSink, SubscriptionEvent};
use dashmap::DashMap;
use gateway::{Gateway, LogEntry};
use tokio::sync::broadcast;
use tracing::warn;

/// Per-topic backlog depth for the in-process fan-out channel. A slow
/// consumer that falls this far behind gets `RecvError::Lagged` and must
/// resync via `since()` against the durable log.
const DEFAULT_BACKLOG: usize = 2048;

/// Topic fan-out over the Gateway's append log: every publish commits to
/// the durable log first (which assigns the monotonic sequence), then fans
/// out on an in-process broadcast channel. The fabric itself holds no
/// durable state — restart loses in-flight subscribers, not history.
pub struct BroadcastFabric {
    gateway: Arc<Gateway>,
    channels: DashMap<String, broadcast::Sender<SubscriptionEvent>>,
    backlog: usize,
}

impl BroadcastFabric {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway, channels: DashMap::new(), backlog: DEFAULT_BACKLOG }
    }

    pub fn with_backlog(gateway: Arc<Gateway>, backlog: usize) -> Self {
        Self { gateway, channels: DashMap::new(), backlog }
    }

    fn channel_for(&self, topic: &str) -> broadcast::Sender<SubscriptionEvent> {
        self.channels.entry(topic.to_string()).or_insert_with(|| broadcast::channel(self.backlog).0).clone()
    }

    /// Subscribe to live fan-out for a topic. Ordering within a topic
    /// matches commit order to the append log; delivery is at-least-once —
    /// callers should dedupe by `(topic, sequence)`.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<SubscriptionEvent> {
        self.channel_for(topic).subscribe()
    }

    /// Resume path for a reconnecting consumer: replay everything committed
    /// after `since_sequence` from the durable log, then the caller should
    /// `subscribe()` for what comes next.
    pub async fn since(&self, topic: &str, since_sequence: i64) -> EngineResult<Vec<LogEntry>> {
        self.gateway.log.since(topic, since_sequence).await
    }
}

#[async_trait]
impl EventSink for BroadcastFabric {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> EngineResult<()> {
        let sequence = self.gateway.log.append(topic, &payload).await?;
        let event = SubscriptionEvent { topic: topic.to_string(), sequence: sequence as u64, payload };

        let sender = self.channel_for(topic);
        // No active receivers is not an error — the log append already
        // committed, which is the source of truth.
        if sender.send(event).is_err() {
            warn!(topic, "no active subscribers for published event");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::topics;
    use serde_json::json;

    #[tokio::test]
    async fn subscriber_receives_events_in_commit_order() {
        let gw = Arc::new(Gateway::connect("sqlite::memory:").await.unwrap());
        let fabric = BroadcastFabric::new(gw);
        let mut rx = fabric.subscribe(topics::SIGNAL_NEW);

        fabric.publish(topics::SIGNAL_NEW, json!({"n": 1})).await.unwrap();
        fabric.publish(topics::SIGNAL_NEW, json!({"n": 2})).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
    }

    #[tokio::test]
    async fn since_resumes_from_durable_log() {
        let gw = Arc::new(Gateway::connect("sqlite::memory:").await.unwrap());
        let fabric = BroadcastFabric::new(gw);

        fabric.publish(topics::BIAS_COMPOSITE, json!({"n": 1})).await.unwrap();
        fabric.publish(topics::BIAS_COMPOSITE, json!({"n": 2})).await.unwrap();

        let entries = fabric.since(topics::BIAS_COMPOSITE, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sequence, 2);
    }

    #[tokio::test]
    async fn publish_without_subscribers_still_commits() {
        let gw = Arc::new(Gateway::connect("sqlite::memory:").await.unwrap());
        let fabric = BroadcastFabric::new(gw);
        fabric.publish(topics::ANOMALY, json!({"kind": "test"})).await.unwrap();
        let entries = fabric.since(topics::ANOMALY, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
