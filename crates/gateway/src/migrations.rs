use bias_core::{EngineError, EngineResult};
use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS event_log (
        topic TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        payload TEXT NOT NULL,
        committed_at TEXT NOT NULL,
        PRIMARY KEY (topic, sequence)
    )",
    "CREATE TABLE IF NOT EXISTS factor_readings (
        factor_id TEXT NOT NULL,
        score REAL NOT NULL,
        signal_label TEXT NOT NULL,
        detail TEXT NOT NULL,
        source TEXT NOT NULL,
        observed_at TEXT,
        ingested_at TEXT NOT NULL,
        raw TEXT NOT NULL,
        timestamp_source TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_factor_readings_factor_time
        ON factor_readings (factor_id, ingested_at)",
    "CREATE TABLE IF NOT EXISTS signals (
        signal_id TEXT PRIMARY KEY,
        symbol TEXT NOT NULL,
        direction TEXT NOT NULL,
        signal_type TEXT NOT NULL,
        signal_source TEXT NOT NULL,
        setup TEXT NOT NULL,
        setup_context TEXT NOT NULL,
        priority INTEGER NOT NULL,
        score REAL NOT NULL,
        confidence TEXT NOT NULL,
        zone TEXT NOT NULL,
        created_at TEXT NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_signals_symbol_created
        ON signals (symbol, created_at)",
    "CREATE TABLE IF NOT EXISTS signal_outcomes (
        signal_id TEXT PRIMARY KEY,
        outcome TEXT NOT NULL,
        outcome_at TEXT,
        outcome_price REAL,
        max_favorable_excursion REAL NOT NULL,
        max_adverse_excursion REAL NOT NULL,
        days_to_outcome INTEGER,
        reached_t1 INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS bias_composite_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        composite_score REAL NOT NULL,
        bias_level TEXT NOT NULL,
        payload TEXT NOT NULL,
        computed_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS breaker_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        payload TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

pub async fn run(pool: &SqlitePool) -> EngineResult<()> {
    for stmt in STATEMENTS {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| EngineError::GatewayUnavailable(format!("migration failed: {e}")))?;
    }
    Ok(())
}
