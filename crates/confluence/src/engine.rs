use std::sync::Arc;

use bias_core::{topics, EngineResult, EventSink};
use gateway::Gateway;
use tracing::info;

use crate::merge::merge_symbol;

/// Runs the confluence pass for one symbol: loads its active signals,
/// merges them, and persists the resulting priority/confidence/confluence
/// updates. Call after a scanner batch finishes, or after a single webhook
/// signal lands, per §4.G's two trigger paths.
pub struct ConfluenceEngine {
    gateway: Arc<Gateway>,
    sink: Arc<dyn EventSink>,
}

impl ConfluenceEngine {
    pub fn new(gateway: Arc<Gateway>, sink: Arc<dyn EventSink>) -> Self {
        Self { gateway, sink }
    }

    pub async fn run_for_symbol(&self, symbol: &str) -> EngineResult<()> {
        let signals = self.gateway.store.active_signals(Some(symbol), None, None).await?;
        if signals.len() < 2 {
            return Ok(());
        }

        let outcomes = merge_symbol(&signals);
        for outcome in &outcomes {
            let signal = signals.iter().find(|s| s.signal_id == outcome.signal_id);
            let Some(signal) = signal else { continue };

            let mut ctx = signal.setup_context.clone();
            ctx.confluence = outcome.block.clone();

            self.gateway
                .store
                .update_signal_confluence(&outcome.signal_id, outcome.new_priority, outcome.new_confidence, &ctx)
                .await?;

            self.sink
                .publish(
                    topics::SIGNAL_NEW,
                    serde_json::json!({
                        "signal_id": outcome.signal_id,
                        "priority": outcome.new_priority,
                        "confidence": outcome.new_confidence,
                        "confluence": outcome.block,
                    }),
                )
                .await
                .ok();
        }

        info!(symbol, updated = outcomes.len(), "confluence pass applied");
        Ok(())
    }
}
