use std::sync::Arc;

use broadcast_fabric::BroadcastFabric;
use composite_engine::{EngineContext, RecomputeActor};
use confluence::ConfluenceEngine;
use factor_ingestion::FactorIngestion;
use factor_registry::FactorRegistry;
use gateway::Gateway;
use outcome_scorer::OutcomeScorer;
use signal_scorer::SignalScorer;

/// Everything a route handler needs, cloned cheaply per request (every
/// field is an `Arc`). Built once in `main` and handed to axum's `Router`.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub registry: Arc<FactorRegistry>,
    pub engine_ctx: Arc<EngineContext>,
    pub recompute: Arc<RecomputeActor>,
    pub fabric: Arc<BroadcastFabric>,
    pub ingestion: Arc<FactorIngestion>,
    pub scorer: Arc<SignalScorer>,
    pub confluence: Arc<ConfluenceEngine>,
    pub outcomes: Arc<OutcomeScorer>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
