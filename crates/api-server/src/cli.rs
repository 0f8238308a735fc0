use std::sync::Arc;

use bias_core::{CircuitBreakerState, NullEventSink};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use factor_registry::FactorRegistry;
use gateway::{keys, Gateway};
use market_data_client::{FallbackCacheProvider, HttpPriceProvider};
use outcome_scorer::OutcomeScorer;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "api-server", about = "Composite bias engine server and admin CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Force-clear circuit-breaker state.
    ResetBreaker,
    /// Evict a cached price entry.
    PurgeCache {
        #[arg(long)]
        symbol: String,
    },
    /// Re-run outcome scoring for signals created at or after a timestamp.
    ReplayOutcomes {
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Validate the Factor Registry and exit non-zero on schema errors.
    VerifyConfig,
    /// Print the registry's enabled factors, weights, and staleness budgets.
    ListFactors,
}

/// Runs an admin subcommand to completion and returns the process exit
/// code. `None` from `Cli::command` means "not an admin invocation" and
/// the caller should start the server instead.
pub async fn run(command: Command, config: &Config) -> i32 {
    match command {
        Command::ResetBreaker => reset_breaker(config).await,
        Command::PurgeCache { symbol } => purge_cache(config, &symbol).await,
        Command::ReplayOutcomes { since } => replay_outcomes(config, since).await,
        Command::VerifyConfig => verify_config(config),
        Command::ListFactors => list_factors(config),
    }
}

async fn reset_breaker(config: &Config) -> i32 {
    let gateway = match Gateway::connect(&config.database_url).await {
        Ok(g) => g,
        Err(e) => {
            eprintln!("cannot reach gateway: {e}");
            return 1;
        }
    };

    match gateway.store.put_breaker_state(&CircuitBreakerState::default()).await {
        Ok(()) => {
            println!("circuit breaker state cleared");
            0
        }
        Err(e) => {
            eprintln!("failed to reset breaker: {e}");
            1
        }
    }
}

async fn purge_cache(config: &Config, symbol: &str) -> i32 {
    let gateway = match Gateway::connect(&config.database_url).await {
        Ok(g) => g,
        Err(e) => {
            eprintln!("cannot reach gateway: {e}");
            return 1;
        }
    };

    for bars in [20u32, 50, 120, 200] {
        gateway.cache.del(&keys::price(1, symbol, bars, "adj"));
    }
    gateway.cache.del(&keys::cta_zone(symbol));
    println!("purged cached price entries for {symbol}");
    0
}

async fn replay_outcomes(config: &Config, since: Option<DateTime<Utc>>) -> i32 {
    let gateway = match Gateway::connect(&config.database_url).await {
        Ok(g) => Arc::new(g),
        Err(e) => {
            eprintln!("cannot reach gateway: {e}");
            return 1;
        }
    };

    let inner = Arc::new(HttpPriceProvider::new(config.market_data_base_url.clone()));
    let prices = Arc::new(FallbackCacheProvider::new(inner, gateway.clone()));
    let scorer = OutcomeScorer::new(gateway, prices, Arc::new(NullEventSink));

    match scorer.run_replay_since(since).await {
        Ok(scored) => {
            println!("replayed {scored} outcome(s)");
            0
        }
        Err(e) => {
            eprintln!("replay failed: {e}");
            1
        }
    }
}

fn verify_config(config: &Config) -> i32 {
    match FactorRegistry::from_file(&config.registry_path) {
        Ok(registry) => {
            println!("registry valid: {} factors enabled", registry.enabled().len());
            0
        }
        Err(e) => {
            eprintln!("registry invalid: {e}");
            1
        }
    }
}

fn list_factors(config: &Config) -> i32 {
    let registry = match FactorRegistry::from_file(&config.registry_path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("registry invalid: {e}");
            return 1;
        }
    };

    for id in registry.enabled() {
        let meta = registry.get(id).expect("enabled id must have metadata");
        println!(
            "{:<20} weight={:<6.3} staleness_budget={:>6}s owner={}",
            id.as_str(),
            meta.weight_nominal,
            meta.staleness_budget.num_seconds(),
            meta.owner,
        );
    }
    0
}
