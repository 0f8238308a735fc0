use std::sync::Arc;

use bias_core::{topics, EngineResult, EventSink, Outcome, PriceProvider, SignalOutcome};
use chrono::{DateTime, Utc};
use gateway::Gateway;
use tracing::{info, warn};

use crate::replay::{self, TieBreak, DEFAULT_MAX_AGE_DAYS};

/// Daily replay pass over every PENDING outcome, per §4.H. Errors fetching
/// bars for one signal don't abort the batch — they're logged and the
/// signal is retried on the next run.
pub struct OutcomeScorer {
    gateway: Arc<Gateway>,
    prices: Arc<dyn PriceProvider>,
    sink: Arc<dyn EventSink>,
    tie_break: TieBreak,
    max_age_days: i64,
}

impl OutcomeScorer {
    pub fn new(gateway: Arc<Gateway>, prices: Arc<dyn PriceProvider>, sink: Arc<dyn EventSink>) -> Self {
        Self { gateway, prices, sink, tie_break: TieBreak::default(), max_age_days: DEFAULT_MAX_AGE_DAYS }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub async fn run_daily_replay(&self) -> EngineResult<usize> {
        self.run_replay_since(None).await
    }

    /// Re-runs replay for pending outcomes whose signal was created at or
    /// after `since` (all of them when `since` is `None`). Backs the
    /// `replay-outcomes --since T` admin command as well as the daily job.
    pub async fn run_replay_since(&self, since: Option<DateTime<Utc>>) -> EngineResult<usize> {
        let pending = self.gateway.store.pending_outcomes().await?;
        let mut scored = 0;
        let now = Utc::now();

        for outcome in pending {
            let Some(signal) = self.gateway.store.get_signal(&outcome.signal_id).await? else {
                warn!(signal_id = %outcome.signal_id, "pending outcome has no matching signal, skipping");
                continue;
            };

            if let Some(since) = since {
                if signal.created_at < since {
                    continue;
                }
            }

            let lookback_days = (now.date_naive() - signal.created_at.date_naive()).num_days().max(1) as u32 + 1;
            let bars = match self.prices.bars(&signal.symbol, lookback_days).await {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(signal_id = %signal.signal_id, error = %e, "failed to fetch bars for outcome replay, retrying next run");
                    continue;
                }
            };

            let result = replay::replay(&signal, &bars, now, self.max_age_days, self.tie_break);
            if result.outcome == Outcome::Pending {
                continue;
            }

            let new_outcome = SignalOutcome {
                signal_id: signal.signal_id.clone(),
                outcome: result.outcome,
                outcome_at: result.outcome_at,
                outcome_price: result.outcome_price,
                max_favorable_excursion: result.max_favorable_excursion,
                max_adverse_excursion: result.max_adverse_excursion,
                days_to_outcome: result.days_to_outcome,
                reached_t1: result.reached_t1,
            };

            self.gateway.store.upsert_signal_outcome(&new_outcome).await?;
            self.sink.publish(topics::SIGNAL_OUTCOME, serde_json::to_value(&new_outcome).unwrap_or_default()).await.ok();
            scored += 1;
        }

        info!(scored, "outcome replay pass complete");
        Ok(scored)
    }
}
