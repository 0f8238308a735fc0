use bias_core::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub topic: String,
    pub sequence: i64,
    pub payload: serde_json::Value,
    pub committed_at: DateTime<Utc>,
}

/// Append-only per-topic journal with monotonic sequence numbers. The
/// fabric's ordering guarantee and at-least-once replay both derive from
/// this store, not from the in-process broadcast channel.
pub struct AppendLog {
    pool: SqlitePool,
    // Sequence allocation must be atomic with the insert; sqlite only
    // serializes writers at the connection level, so an explicit lock
    // avoids two concurrent appends to the same topic racing to the same
    // sequence number.
    write_lock: Mutex<()>,
}

impl AppendLog {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool, write_lock: Mutex::new(()) }
    }

    pub async fn append(&self, topic: &str, payload: &serde_json::Value) -> EngineResult<i64> {
        let payload_str =
            serde_json::to_string(payload).map_err(|e| EngineError::Internal(e.to_string()))?;

        let _guard = self.write_lock.lock().await;

        let next_seq: i64 = sqlx::query("SELECT COALESCE(MAX(sequence), 0) + 1 FROM event_log WHERE topic = ?")
            .bind(topic)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?
            .try_get(0)
            .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO event_log (topic, sequence, payload, committed_at) VALUES (?, ?, ?, ?)",
        )
        .bind(topic)
        .bind(next_seq)
        .bind(&payload_str)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?;

        Ok(next_seq)
    }

    pub async fn last_n(&self, topic: &str, n: i64) -> EngineResult<Vec<LogEntry>> {
        let rows = sqlx::query(
            "SELECT topic, sequence, payload, committed_at FROM event_log
             WHERE topic = ? ORDER BY sequence DESC LIMIT ?",
        )
        .bind(topic)
        .bind(n)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?;

        let mut entries = rows_to_entries(rows)?;
        entries.reverse();
        Ok(entries)
    }

    pub async fn since(&self, topic: &str, sequence: i64) -> EngineResult<Vec<LogEntry>> {
        let rows = sqlx::query(
            "SELECT topic, sequence, payload, committed_at FROM event_log
             WHERE topic = ? AND sequence > ? ORDER BY sequence ASC",
        )
        .bind(topic)
        .bind(sequence)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?;

        rows_to_entries(rows)
    }

    pub async fn latest_sequence(&self, topic: &str) -> EngineResult<i64> {
        let seq: i64 = sqlx::query("SELECT COALESCE(MAX(sequence), 0) FROM event_log WHERE topic = ?")
            .bind(topic)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?
            .try_get(0)
            .map_err(|e| EngineError::GatewayUnavailable(e.to_string()))?;
        Ok(seq)
    }
}

fn rows_to_entries(rows: Vec<sqlx::sqlite::SqliteRow>) -> EngineResult<Vec<LogEntry>> {
    rows.into_iter()
        .map(|row| {
            let topic: String = row.try_get("topic").map_err(|e| EngineError::Internal(e.to_string()))?;
            let sequence: i64 =
                row.try_get("sequence").map_err(|e| EngineError::Internal(e.to_string()))?;
            let payload_str: String =
                row.try_get("payload").map_err(|e| EngineError::Internal(e.to_string()))?;
            let committed_at_str: String =
                row.try_get("committed_at").map_err(|e| EngineError::Internal(e.to_string()))?;
            let payload = serde_json::from_str(&payload_str).map_err(|e| EngineError::Internal(e.to_string()))?;
            let committed_at = DateTime::parse_from_rfc3339(&committed_at_str)
                .map_err(|e| EngineError::Internal(e.to_string()))?
                .with_timezone(&Utc);
            Ok(LogEntry { topic, sequence, payload, committed_at })
        })
        .collect()
}
