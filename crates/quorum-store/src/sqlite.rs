use chrono::{DateTime, SecondsFormat, Utc};
use quorum_models::record::DECISION_TABLE_DDL;
use quorum_models::{
    DecisionRecord, DecisionStatistics, ExecutionOutcome, ExecutionStatus, RawDecision,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::error::StoreError;

const RECORD_COLUMNS: &str = "id, decision_id, agent, decision_text, market_snapshot, timestamp, \
     is_structured, status, order_id, error, execution_ms, created_at, updated_at";

/// SQLite-backed decision history.
///
/// Rows are appended on receipt and updated exactly once when the decision
/// reaches a terminal status.
pub struct DecisionStore {
    conn: Connection,
}

impl DecisionStore {
    /// Open (or create) the decision database. Enables WAL so the operator
    /// CLI can read while the daemon writes.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(DECISION_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(DECISION_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Persist a freshly received decision as `pending`. Returns the row id.
    pub fn insert_decision(&self, decision: &RawDecision) -> Result<i64, StoreError> {
        let snapshot = decision
            .market_snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = format_timestamp(Utc::now());

        self.conn.execute(
            "INSERT INTO decisions \
             (decision_id, agent, decision_text, market_snapshot, timestamp, is_structured, \
              status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
            params![
                decision.id.to_string(),
                decision.agent,
                decision.decision_text,
                snapshot,
                format_timestamp(decision.timestamp),
                decision.is_structured,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get(&self, id: i64) -> Result<Option<DecisionRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {RECORD_COLUMNS} FROM decisions WHERE id = ?1"))?;

        match stmt.query_row(params![id], record_from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    pub fn get_by_decision_id(
        &self,
        decision_id: &Uuid,
    ) -> Result<Option<DecisionRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {RECORD_COLUMNS} FROM decisions WHERE decision_id = ?1"
        ))?;

        match stmt.query_row(params![decision_id.to_string()], record_from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Most recent decisions first.
    pub fn recent(&self, limit: usize) -> Result<Vec<DecisionRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {RECORD_COLUMNS} FROM decisions ORDER BY id DESC LIMIT ?1"
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Move a pending record to its terminal status.
    ///
    /// The `status = 'pending'` guard makes the transition single-shot: a
    /// second attempt fails with `AlreadyFinalized`.
    pub fn record_outcome(&self, id: i64, outcome: &ExecutionOutcome) -> Result<(), StoreError> {
        if !outcome.status.is_terminal() {
            return Err(StoreError::InvalidTransition(format!(
                "record {id} cannot move back to {}",
                outcome.status
            )));
        }

        let changed = self.conn.execute(
            "UPDATE decisions \
             SET status = ?1, order_id = ?2, error = ?3, execution_ms = ?4, updated_at = ?5 \
             WHERE id = ?6 AND status = 'pending'",
            params![
                outcome.status.as_str(),
                outcome.order_id,
                outcome.error,
                outcome.execution_ms,
                format_timestamp(Utc::now()),
                id,
            ],
        )?;

        if changed == 1 {
            return Ok(());
        }
        match self.get(id)? {
            Some(record) => Err(StoreError::AlreadyFinalized {
                id,
                status: record.status,
            }),
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// Counts per status for decisions timestamped at or after `since`.
    pub fn statistics(&self, since: DateTime<Utc>) -> Result<DecisionStatistics, StoreError> {
        let since = format_timestamp(since);
        let mut stats = DecisionStatistics::default();

        {
            let mut stmt = self.conn.prepare_cached(
                "SELECT status, COUNT(*) FROM decisions WHERE timestamp >= ?1 GROUP BY status",
            )?;
            let counts = stmt
                .query_map(params![since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            for (status, count) in counts {
                let count = count as u64;
                stats.total += count;
                match status.parse::<ExecutionStatus>() {
                    Ok(ExecutionStatus::Pending) => stats.pending += count,
                    Ok(ExecutionStatus::Success) => stats.success += count,
                    Ok(ExecutionStatus::Failed) => stats.failed += count,
                    Ok(ExecutionStatus::Skipped) => stats.skipped += count,
                    Err(e) => tracing::warn!(error = %e, "Ignoring unknown status in statistics"),
                }
            }
        }

        let finalized = stats.success + stats.failed + stats.skipped;
        if finalized > 0 {
            stats.success_rate = stats.success as f64 / finalized as f64;
        }

        stats.avg_execution_ms = self.conn.query_row(
            "SELECT AVG(execution_ms) FROM decisions \
             WHERE timestamp >= ?1 AND execution_ms IS NOT NULL",
            params![since],
            |row| row.get::<_, Option<f64>>(0),
        )?;

        Ok(stats)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM decisions", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// RFC 3339 with fixed precision so stored timestamps sort lexically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DecisionRecord> {
    let status: String = row.get(7)?;
    let status = status
        .parse::<ExecutionStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, e.into()))?;

    Ok(DecisionRecord {
        id: row.get(0)?,
        decision_id: row.get(1)?,
        agent: row.get(2)?,
        decision_text: row.get(3)?,
        market_snapshot: row.get(4)?,
        timestamp: row.get(5)?,
        is_structured: row.get(6)?,
        status,
        order_id: row.get(8)?,
        error: row.get(9)?,
        execution_ms: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
