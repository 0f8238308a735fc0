use bias_core::{
    bucket_score, BiasLevel, CircuitBreakerState, Direction, EngineError, EngineResult, FactorId,
    FactorReading, Outcome, ReadingSource, Signal, SignalConfidence, SignalOutcome, SignalStatus,
    SignalType, TimestampSource,
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Durable record store: factor_readings, signals, signal_outcomes,
/// bias_composite_history, breaker_state. Everything here survives a
/// restart; the KV cache does not.
pub struct RecordStore {
    pool: SqlitePool,
}

fn gw_err<E: std::fmt::Display>(e: E) -> EngineError {
    EngineError::GatewayUnavailable(e.to_string())
}

fn internal_err<E: std::fmt::Display>(e: E) -> EngineError {
    EngineError::Internal(e.to_string())
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(s: &str) -> EngineResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s).map_err(internal_err)?.with_timezone(&Utc))
}

fn source_to_str(s: ReadingSource) -> &'static str {
    match s {
        ReadingSource::ScheduledPull => "SCHEDULED_PULL",
        ReadingSource::Webhook => "WEBHOOK",
        ReadingSource::Manual => "MANUAL",
        ReadingSource::FallbackCache => "FALLBACK_CACHE",
    }
}

fn source_from_str(s: &str) -> EngineResult<ReadingSource> {
    Ok(match s {
        "SCHEDULED_PULL" => ReadingSource::ScheduledPull,
        "WEBHOOK" => ReadingSource::Webhook,
        "MANUAL" => ReadingSource::Manual,
        "FALLBACK_CACHE" => ReadingSource::FallbackCache,
        other => return Err(internal_err(format!("unknown reading source '{other}'"))),
    })
}

fn bias_level_to_str(b: BiasLevel) -> &'static str {
    match b {
        BiasLevel::UrsaMajor => "URSA_MAJOR",
        BiasLevel::UrsaMinor => "URSA_MINOR",
        BiasLevel::Neutral => "NEUTRAL",
        BiasLevel::ToroMinor => "TORO_MINOR",
        BiasLevel::ToroMajor => "TORO_MAJOR",
    }
}

fn bias_level_from_str(s: &str) -> EngineResult<BiasLevel> {
    Ok(match s {
        "URSA_MAJOR" => BiasLevel::UrsaMajor,
        "URSA_MINOR" => BiasLevel::UrsaMinor,
        "NEUTRAL" => BiasLevel::Neutral,
        "TORO_MINOR" => BiasLevel::ToroMinor,
        "TORO_MAJOR" => BiasLevel::ToroMajor,
        other => return Err(internal_err(format!("unknown bias level '{other}'"))),
    })
}

impl RecordStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_factor_reading(&self, reading: &FactorReading) -> EngineResult<()> {
        let raw_str = serde_json::to_string(&reading.raw).map_err(internal_err)?;
        sqlx::query(
            "INSERT INTO factor_readings
             (factor_id, score, signal_label, detail, source, observed_at, ingested_at, raw, timestamp_source)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(reading.factor_id.as_str())
        .bind(bucket_score(reading.score))
        .bind(bias_level_to_str(reading.signal_label))
        .bind(&reading.detail)
        .bind(source_to_str(reading.source))
        .bind(reading.observed_at.map(fmt_ts))
        .bind(fmt_ts(reading.ingested_at))
        .bind(raw_str)
        .bind(match reading.timestamp_source {
            TimestampSource::SourceEvent => "SOURCE_EVENT",
            TimestampSource::IngestionFallback => "INGESTION_FALLBACK",
        })
        .execute(&self.pool)
        .await
        .map_err(gw_err)?;
        Ok(())
    }

    pub async fn latest_factor_reading(&self, factor_id: &FactorId) -> EngineResult<Option<FactorReading>> {
        let row = sqlx::query(
            "SELECT factor_id, score, signal_label, detail, source, observed_at, ingested_at, raw, timestamp_source
             FROM factor_readings WHERE factor_id = ? ORDER BY ingested_at DESC LIMIT 1",
        )
        .bind(factor_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(gw_err)?;

        row.map(row_to_reading).transpose()
    }

    /// Readings for a factor observed at or before `at`, newest first — used
    /// by the velocity detector to find the "≥24h earlier" comparison point.
    pub async fn factor_readings_before(
        &self,
        factor_id: &FactorId,
        at: DateTime<Utc>,
    ) -> EngineResult<Vec<FactorReading>> {
        let rows = sqlx::query(
            "SELECT factor_id, score, signal_label, detail, source, observed_at, ingested_at, raw, timestamp_source
             FROM factor_readings WHERE factor_id = ? AND ingested_at <= ? ORDER BY ingested_at DESC",
        )
        .bind(factor_id.as_str())
        .bind(fmt_ts(at))
        .fetch_all(&self.pool)
        .await
        .map_err(gw_err)?;

        rows.into_iter().map(row_to_reading).collect()
    }

    pub async fn insert_signal(&self, signal: &Signal) -> EngineResult<InsertOutcome> {
        if let Some(existing) = self.get_signal(&signal.signal_id).await? {
            return Ok(InsertOutcome::AlreadyExists(existing));
        }

        let setup_str = serde_json::to_string(&signal.setup).map_err(internal_err)?;
        let ctx_str = serde_json::to_string(&signal.setup_context).map_err(internal_err)?;

        let result = sqlx::query(
            "INSERT INTO signals
             (signal_id, symbol, direction, signal_type, signal_source, setup, setup_context,
              priority, score, confidence, zone, created_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&signal.signal_id)
        .bind(&signal.symbol)
        .bind(match signal.direction {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        })
        .bind(signal.signal_type.label())
        .bind(&signal.signal_source)
        .bind(setup_str)
        .bind(ctx_str)
        .bind(signal.priority)
        .bind(signal.score)
        .bind(match signal.confidence {
            SignalConfidence::Low => "LOW",
            SignalConfidence::Medium => "MEDIUM",
            SignalConfidence::High => "HIGH",
        })
        .bind(signal.zone.to_string())
        .bind(fmt_ts(signal.created_at))
        .bind(match signal.status {
            SignalStatus::Active => "ACTIVE",
            SignalStatus::Dismissed => "DISMISSED",
        })
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            // Primary-key violation under a concurrent insert race: treat as
            // the same idempotent "duplicate" outcome.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let existing = self
                    .get_signal(&signal.signal_id)
                    .await?
                    .ok_or_else(|| internal_err("duplicate insert race left no row"))?;
                Ok(InsertOutcome::AlreadyExists(existing))
            }
            Err(e) => Err(gw_err(e)),
        }
    }

    /// Applies a confluence pass result: new priority/confidence and a
    /// setup_context carrying the updated confluence block. Never touches
    /// entry/stop/target, per the confluence contract.
    pub async fn update_signal_confluence(
        &self,
        signal_id: &str,
        priority: i32,
        confidence: SignalConfidence,
        setup_context: &bias_core::SetupContext,
    ) -> EngineResult<()> {
        let ctx_str = serde_json::to_string(setup_context).map_err(internal_err)?;
        sqlx::query("UPDATE signals SET priority = ?, confidence = ?, setup_context = ? WHERE signal_id = ?")
            .bind(priority)
            .bind(match confidence {
                SignalConfidence::Low => "LOW",
                SignalConfidence::Medium => "MEDIUM",
                SignalConfidence::High => "HIGH",
            })
            .bind(ctx_str)
            .bind(signal_id)
            .execute(&self.pool)
            .await
            .map_err(gw_err)?;
        Ok(())
    }

    pub async fn get_signal(&self, signal_id: &str) -> EngineResult<Option<Signal>> {
        let row = sqlx::query(
            "SELECT signal_id, symbol, direction, signal_type, signal_source, setup, setup_context,
                    priority, score, confidence, zone, created_at, status
             FROM signals WHERE signal_id = ?",
        )
        .bind(signal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(gw_err)?;

        row.map(row_to_signal).transpose()
    }

    pub async fn active_signals(
        &self,
        symbol: Option<&str>,
        signal_type: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<Signal>> {
        let rows = sqlx::query(
            "SELECT signal_id, symbol, direction, signal_type, signal_source, setup, setup_context,
                    priority, score, confidence, zone, created_at, status
             FROM signals
             WHERE status = 'ACTIVE'
               AND (?1 IS NULL OR symbol = ?1)
               AND (?2 IS NULL OR signal_type = ?2)
               AND (?3 IS NULL OR created_at >= ?3)
             ORDER BY created_at DESC",
        )
        .bind(symbol)
        .bind(signal_type)
        .bind(since.map(fmt_ts))
        .fetch_all(&self.pool)
        .await
        .map_err(gw_err)?;

        rows.into_iter().map(row_to_signal).collect()
    }

    pub async fn upsert_signal_outcome(&self, outcome: &SignalOutcome) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO signal_outcomes
             (signal_id, outcome, outcome_at, outcome_price, max_favorable_excursion,
              max_adverse_excursion, days_to_outcome, reached_t1)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(signal_id) DO UPDATE SET
                outcome = excluded.outcome,
                outcome_at = excluded.outcome_at,
                outcome_price = excluded.outcome_price,
                max_favorable_excursion = excluded.max_favorable_excursion,
                max_adverse_excursion = excluded.max_adverse_excursion,
                days_to_outcome = excluded.days_to_outcome,
                reached_t1 = excluded.reached_t1",
        )
        .bind(&outcome.signal_id)
        .bind(outcome_to_str(outcome.outcome))
        .bind(outcome.outcome_at.map(fmt_ts))
        .bind(outcome.outcome_price)
        .bind(outcome.max_favorable_excursion)
        .bind(outcome.max_adverse_excursion)
        .bind(outcome.days_to_outcome)
        .bind(outcome.reached_t1 as i64)
        .execute(&self.pool)
        .await
        .map_err(gw_err)?;
        Ok(())
    }

    pub async fn pending_outcomes(&self) -> EngineResult<Vec<SignalOutcome>> {
        let rows = sqlx::query(
            "SELECT signal_id, outcome, outcome_at, outcome_price, max_favorable_excursion,
                    max_adverse_excursion, days_to_outcome, reached_t1
             FROM signal_outcomes WHERE outcome = 'PENDING'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(gw_err)?;

        rows.into_iter().map(row_to_outcome).collect()
    }

    pub async fn hit_rates_by_type_zone(&self) -> EngineResult<Vec<HitRateRow>> {
        let rows = sqlx::query(
            "SELECT s.signal_type AS signal_type, s.zone AS zone,
                    COUNT(*) AS total,
                    SUM(CASE WHEN o.outcome IN ('HIT_T1', 'HIT_T2') THEN 1 ELSE 0 END) AS wins
             FROM signals s JOIN signal_outcomes o ON s.signal_id = o.signal_id
             WHERE o.outcome != 'PENDING'
             GROUP BY s.signal_type, s.zone",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(gw_err)?;

        rows.into_iter()
            .map(|row| {
                let total: i64 = row.try_get("total").map_err(internal_err)?;
                let wins: i64 = row.try_get("wins").map_err(internal_err)?;
                Ok(HitRateRow {
                    signal_type: row.try_get("signal_type").map_err(internal_err)?,
                    zone: row.try_get("zone").map_err(internal_err)?,
                    total,
                    wins,
                })
            })
            .collect()
    }

    pub async fn append_bias_composite_history(
        &self,
        composite_score: f64,
        bias_level: BiasLevel,
        payload: &serde_json::Value,
        computed_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let payload_str = serde_json::to_string(payload).map_err(internal_err)?;
        sqlx::query(
            "INSERT INTO bias_composite_history (composite_score, bias_level, payload, computed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(bucket_score(composite_score))
        .bind(bias_level_to_str(bias_level))
        .bind(payload_str)
        .bind(fmt_ts(computed_at))
        .execute(&self.pool)
        .await
        .map_err(gw_err)?;
        Ok(())
    }

    pub async fn put_breaker_state(&self, state: &CircuitBreakerState) -> EngineResult<()> {
        let payload_str = serde_json::to_string(state).map_err(internal_err)?;
        sqlx::query(
            "INSERT INTO breaker_state (id, payload, updated_at) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(payload_str)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(gw_err)?;
        Ok(())
    }

    pub async fn get_breaker_state(&self) -> EngineResult<Option<CircuitBreakerState>> {
        let row = sqlx::query("SELECT payload FROM breaker_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(gw_err)?;

        match row {
            Some(row) => {
                let payload_str: String = row.try_get("payload").map_err(internal_err)?;
                Ok(Some(serde_json::from_str(&payload_str).map_err(internal_err)?))
            }
            None => Ok(None),
        }
    }
}

pub enum InsertOutcome {
    Inserted,
    AlreadyExists(Signal),
}

#[derive(serde::Serialize)]
pub struct HitRateRow {
    pub signal_type: String,
    pub zone: String,
    pub total: i64,
    pub wins: i64,
}

fn outcome_to_str(o: Outcome) -> &'static str {
    match o {
        Outcome::Pending => "PENDING",
        Outcome::HitT1 => "HIT_T1",
        Outcome::HitT2 => "HIT_T2",
        Outcome::StoppedOut => "STOPPED_OUT",
        Outcome::Invalidated => "INVALIDATED",
        Outcome::Expired => "EXPIRED",
    }
}

fn outcome_from_str(s: &str) -> EngineResult<Outcome> {
    Ok(match s {
        "PENDING" => Outcome::Pending,
        "HIT_T1" => Outcome::HitT1,
        "HIT_T2" => Outcome::HitT2,
        "STOPPED_OUT" => Outcome::StoppedOut,
        "INVALIDATED" => Outcome::Invalidated,
        "EXPIRED" => Outcome::Expired,
        other => return Err(internal_err(format!("unknown outcome '{other}'"))),
    })
}

fn row_to_reading(row: sqlx::sqlite::SqliteRow) -> EngineResult<FactorReading> {
    let factor_id: String = row.try_get("factor_id").map_err(internal_err)?;
    let observed_at: Option<String> = row.try_get("observed_at").map_err(internal_err)?;
    let ingested_at: String = row.try_get("ingested_at").map_err(internal_err)?;
    let raw_str: String = row.try_get("raw").map_err(internal_err)?;
    let timestamp_source: String = row.try_get("timestamp_source").map_err(internal_err)?;
    let signal_label: String = row.try_get("signal_label").map_err(internal_err)?;
    let source: String = row.try_get("source").map_err(internal_err)?;

    Ok(FactorReading {
        factor_id: FactorId::new(factor_id),
        score: row.try_get("score").map_err(internal_err)?,
        signal_label: bias_level_from_str(&signal_label)?,
        detail: row.try_get("detail").map_err(internal_err)?,
        source: source_from_str(&source)?,
        observed_at: observed_at.map(|s| parse_ts(&s)).transpose()?,
        ingested_at: parse_ts(&ingested_at)?,
        raw: serde_json::from_str(&raw_str).map_err(internal_err)?,
        timestamp_source: match timestamp_source.as_str() {
            "SOURCE_EVENT" => TimestampSource::SourceEvent,
            "INGESTION_FALLBACK" => TimestampSource::IngestionFallback,
            other => return Err(internal_err(format!("unknown timestamp source '{other}'"))),
        },
    })
}

fn row_to_signal(row: sqlx::sqlite::SqliteRow) -> EngineResult<Signal> {
    let direction: String = row.try_get("direction").map_err(internal_err)?;
    let signal_type: String = row.try_get("signal_type").map_err(internal_err)?;
    let setup_str: String = row.try_get("setup").map_err(internal_err)?;
    let ctx_str: String = row.try_get("setup_context").map_err(internal_err)?;
    let confidence: String = row.try_get("confidence").map_err(internal_err)?;
    let zone: String = row.try_get("zone").map_err(internal_err)?;
    let created_at: String = row.try_get("created_at").map_err(internal_err)?;
    let status: String = row.try_get("status").map_err(internal_err)?;

    Ok(Signal {
        signal_id: row.try_get("signal_id").map_err(internal_err)?,
        symbol: row.try_get("symbol").map_err(internal_err)?,
        direction: match direction.as_str() {
            "LONG" => Direction::Long,
            "SHORT" => Direction::Short,
            other => return Err(internal_err(format!("unknown direction '{other}'"))),
        },
        signal_type: SignalType::from_label(&signal_type),
        signal_source: row.try_get("signal_source").map_err(internal_err)?,
        setup: serde_json::from_str(&setup_str).map_err(internal_err)?,
        setup_context: serde_json::from_str(&ctx_str).map_err(internal_err)?,
        priority: row.try_get("priority").map_err(internal_err)?,
        score: row.try_get("score").map_err(internal_err)?,
        confidence: match confidence.as_str() {
            "LOW" => SignalConfidence::Low,
            "MEDIUM" => SignalConfidence::Medium,
            "HIGH" => SignalConfidence::High,
            other => return Err(internal_err(format!("unknown confidence '{other}'"))),
        },
        zone: match zone.as_str() {
            "MAX_LONG" => bias_core::CTAZone::MaxLong,
            "RECOVERY" => bias_core::CTAZone::Recovery,
            "DE_LEVERAGING" => bias_core::CTAZone::DeLeveraging,
            "WATERFALL" => bias_core::CTAZone::Waterfall,
            "CAPITULATION" => bias_core::CTAZone::Capitulation,
            "TRANSITION" => bias_core::CTAZone::Transition,
            other => return Err(internal_err(format!("unknown zone '{other}'"))),
        },
        created_at: parse_ts(&created_at)?,
        status: match status.as_str() {
            "ACTIVE" => SignalStatus::Active,
            "DISMISSED" => SignalStatus::Dismissed,
            other => return Err(internal_err(format!("unknown status '{other}'"))),
        },
    })
}

fn row_to_outcome(row: sqlx::sqlite::SqliteRow) -> EngineResult<SignalOutcome> {
    let outcome: String = row.try_get("outcome").map_err(internal_err)?;
    let outcome_at: Option<String> = row.try_get("outcome_at").map_err(internal_err)?;
    let reached_t1: i64 = row.try_get("reached_t1").map_err(internal_err)?;

    Ok(SignalOutcome {
        signal_id: row.try_get("signal_id").map_err(internal_err)?,
        outcome: outcome_from_str(&outcome)?,
        outcome_at: outcome_at.map(|s| parse_ts(&s)).transpose()?,
        outcome_price: row.try_get("outcome_price").map_err(internal_err)?,
        max_favorable_excursion: row.try_get("max_favorable_excursion").map_err(internal_err)?,
        max_adverse_excursion: row.try_get("max_adverse_excursion").map_err(internal_err)?,
        days_to_outcome: row.try_get("days_to_outcome").map_err(internal_err)?,
        reached_t1: reached_t1 != 0,
    })
}
