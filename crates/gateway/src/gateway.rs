use std::str::FromStr;

use bias_core::EngineError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::kv::TtlCache;
use crate::log::AppendLog;
use crate::migrations;
use crate::store::RecordStore;

/// The Cache & Persistence Gateway: a typed KV cache, an append-only
/// per-topic event log, and a durable record store, all sharing one sqlite
/// pool for the durable half. Every component in the engine reaches the
/// outside world for state through this struct.
pub struct Gateway {
    pub cache: TtlCache,
    pub log: AppendLog,
    pub store: RecordStore,
}

impl Gateway {
    pub async fn connect(database_url: &str) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| EngineError::ConfigInvalid(format!("invalid database url: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?;

        migrations::run(&pool).await?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            cache: TtlCache::new(),
            log: AppendLog::new(pool.clone()),
            store: RecordStore::new(pool),
        }
    }

    /// Re-validate every cached factor/price entry against current sanity
    /// bounds and purge violators, per the startup sweep.
    pub fn startup_sweep(&self, is_valid: impl Fn(&str, &[u8]) -> bool) -> Vec<String> {
        self.cache.retain(|k, v| {
            if k.starts_with("factor:") || k.starts_with("price:") {
                is_valid(k, v)
            } else {
                true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bias_core::topics;
    use serde_json::json;

    async fn test_gateway() -> Gateway {
        Gateway::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn append_log_assigns_monotonic_sequence() {
        let gw = test_gateway().await;
        let s1 = gw.log.append(topics::BIAS_COMPOSITE, &json!({"a": 1})).await.unwrap();
        let s2 = gw.log.append(topics::BIAS_COMPOSITE, &json!({"a": 2})).await.unwrap();
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
    }

    #[tokio::test]
    async fn since_returns_only_newer_entries() {
        let gw = test_gateway().await;
        gw.log.append(topics::SIGNAL_NEW, &json!({"n": 1})).await.unwrap();
        gw.log.append(topics::SIGNAL_NEW, &json!({"n": 2})).await.unwrap();
        let entries = gw.log.since(topics::SIGNAL_NEW, 1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sequence, 2);
    }

    #[tokio::test]
    async fn breaker_state_roundtrips() {
        let gw = test_gateway().await;
        assert!(gw.store.get_breaker_state().await.unwrap().is_none());
        let state = bias_core::CircuitBreakerState::default();
        gw.store.put_breaker_state(&state).await.unwrap();
        let restored = gw.store.get_breaker_state().await.unwrap().unwrap();
        assert!(!restored.is_engaged());
    }
}
