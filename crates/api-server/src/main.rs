mod auth;
mod cli;
mod config;
mod error;
mod health_routes;
mod ingest_routes;
mod read_routes;
mod request_id;
mod state;
mod ws_routes;

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use bias_core::{EventSink, PriceProvider};
use broadcast_fabric::BroadcastFabric;
use clap::Parser;
use composite_engine::{EngineContext, RecomputeActor};
use confluence::ConfluenceEngine;
use factor_ingestion::FactorIngestion;
use factor_registry::FactorRegistry;
use gateway::Gateway;
use market_data_client::{FallbackCacheProvider, HttpPriceProvider};
use outcome_scorer::OutcomeScorer;
use scheduler::job::FnJob;
use scheduler::table;
use signal_scorer::SignalScorer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    let config = Config::load();

    if let Some(command) = cli.command {
        let code = cli::run(command, &config).await;
        std::process::exit(code);
    }

    run_server(config).await
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let gateway = Arc::new(Gateway::connect(&config.database_url).await?);
    let registry = Arc::new(FactorRegistry::from_file(&config.registry_path)?);
    let fabric = Arc::new(BroadcastFabric::new(gateway.clone()));
    let sink: Arc<dyn EventSink> = fabric.clone();

    let engine_ctx = Arc::new(EngineContext::new(registry.clone(), gateway.clone(), sink.clone()).await?);
    let recompute = Arc::new(RecomputeActor::spawn(engine_ctx.clone()));

    let ingestion = Arc::new(FactorIngestion::new(
        registry.clone(),
        gateway.clone(),
        sink.clone(),
        recompute.clone(),
    ));
    let scorer = Arc::new(SignalScorer::new(gateway.clone(), sink.clone()));
    let confluence = Arc::new(ConfluenceEngine::new(gateway.clone(), sink.clone()));

    let http_prices: Arc<dyn PriceProvider> = Arc::new(HttpPriceProvider::new(config.market_data_base_url.clone()));
    let prices = Arc::new(FallbackCacheProvider::new(http_prices, gateway.clone()));
    let outcomes = Arc::new(OutcomeScorer::new(gateway.clone(), prices.clone(), sink.clone()));

    spawn_jobs(&config, &prices, &recompute, &outcomes, &sink);

    let state = AppState {
        gateway,
        registry,
        engine_ctx,
        recompute,
        fabric,
        ingestion,
        scorer,
        confluence,
        outcomes,
        started_at: chrono::Utc::now(),
    };

    let app = Router::new()
        .merge(ingest_routes::ingest_routes())
        .merge(read_routes::read_routes())
        .merge(ws_routes::ws_routes())
        .merge(health_routes::health_routes())
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "composite bias engine listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

/// Wires the declarative job table to concrete closures over the same
/// long-lived collaborators the server itself uses, per the concurrency
/// model's "ingest handlers never call recompute synchronously" rule —
/// the scheduled recompute job is the only place that calls it on a timer.
fn spawn_jobs(
    config: &Config,
    prices: &Arc<FallbackCacheProvider>,
    recompute: &Arc<RecomputeActor>,
    outcomes: &Arc<OutcomeScorer>,
    sink: &Arc<dyn EventSink>,
) {
    let watchlist = config.watchlist_symbols.clone();
    let row = table::market_data_pull();
    let prices_for_market = prices.clone();
    scheduler::job::spawn(
        Arc::new(FnJob::new(row.name, move || {
            let prices = prices_for_market.clone();
            let watchlist = watchlist.clone();
            async move {
                for symbol in &watchlist {
                    prices.bars(symbol, 20).await.ok();
                }
                Ok(())
            }
        })),
        row.cadence,
        row.gate,
    );

    let row = table::vix_only_pull();
    let prices_for_vix = prices.clone();
    scheduler::job::spawn(
        Arc::new(FnJob::new(row.name, move || {
            let prices = prices_for_vix.clone();
            async move {
                prices.bars("^VIX", 20).await.ok();
                Ok(())
            }
        })),
        row.cadence,
        row.gate,
    );

    // No dedicated CAPE producer exists in this system's scope; this tick
    // is a placeholder until one is grounded on a real data source.
    let row = table::cape_pull();
    scheduler::job::spawn(Arc::new(FnJob::new(row.name, || async { Ok(()) })), row.cadence, row.gate);

    let row = table::signal_outcome_scoring();
    let outcomes_for_job = outcomes.clone();
    scheduler::job::spawn(
        Arc::new(FnJob::new(row.name, move || {
            let outcomes = outcomes_for_job.clone();
            async move {
                outcomes.run_daily_replay().await?;
                Ok(())
            }
        })),
        row.cadence,
        row.gate,
    );

    let row = table::composite_safety_recompute();
    let recompute_for_job = recompute.clone();
    scheduler::job::spawn(
        Arc::new(FnJob::new(row.name, move || {
            let recompute = recompute_for_job.clone();
            async move {
                recompute.trigger();
                Ok(())
            }
        })),
        row.cadence,
        row.gate,
    );

    let row = table::heartbeat_emit();
    let sink_for_job = sink.clone();
    scheduler::job::spawn(
        Arc::new(FnJob::new(row.name, move || {
            let sink = sink_for_job.clone();
            async move {
                sink.publish(bias_core::topics::HEARTBEAT, serde_json::json!({"ts": chrono::Utc::now()}))
                    .await
                    .ok();
                Ok(())
            }
        })),
        row.cadence,
        row.gate,
    );
}

/// Resolves once SIGINT arrives. A 30-second watchdog runs alongside the
/// drain so a connection that never closes can't hang the process forever.
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received, draining in-flight requests (30s budget)");

    tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        warn!("graceful shutdown exceeded its budget, forcing exit");
        std::process::exit(1);
    });
}
