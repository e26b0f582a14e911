use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a persisted decision. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Terminal result of processing one decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub order_id: Option<String>,
    /// Failure or skip reason.
    pub error: Option<String>,
    pub execution_ms: Option<i64>,
}

impl ExecutionOutcome {
    pub fn success(order_id: impl Into<String>, execution_ms: i64) -> Self {
        Self {
            status: ExecutionStatus::Success,
            order_id: Some(order_id.into()),
            error: None,
            execution_ms: Some(execution_ms),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            order_id: None,
            error: Some(error.into()),
            execution_ms: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Skipped,
            order_id: None,
            error: Some(reason.into()),
            execution_ms: None,
        }
    }

    pub fn with_execution_ms(mut self, execution_ms: i64) -> Self {
        self.execution_ms = Some(execution_ms);
        self
    }
}

/// A row of the `decisions` table.
///
/// Timestamps are RFC 3339 strings with microsecond precision and a `Z`
/// suffix so they compare correctly as text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub id: i64,
    pub decision_id: String,
    pub agent: String,
    pub decision_text: String,
    /// JSON of the snapshot the agent decided on.
    pub market_snapshot: Option<String>,
    pub timestamp: String,
    pub is_structured: bool,
    pub status: ExecutionStatus,
    pub order_id: Option<String>,
    pub error: Option<String>,
    pub execution_ms: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregate view over decisions received in a time window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DecisionStatistics {
    pub total: u64,
    pub pending: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    /// success / (success + failed + skipped), 0 when nothing finalized.
    pub success_rate: f64,
    pub avg_execution_ms: Option<f64>,
}

/// Schema of the decision store.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS decisions (
///     id              INTEGER PRIMARY KEY AUTOINCREMENT,
///     decision_id     TEXT NOT NULL UNIQUE,
///     agent           TEXT NOT NULL,
///     decision_text   TEXT NOT NULL,
///     market_snapshot TEXT,
///     timestamp       TEXT NOT NULL,
///     is_structured   INTEGER NOT NULL,
///     status          TEXT NOT NULL DEFAULT 'pending',
///     order_id        TEXT,
///     error           TEXT,
///     execution_ms    INTEGER,
///     created_at      TEXT NOT NULL,
///     updated_at      TEXT NOT NULL
/// );
/// ```
pub const DECISION_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS decisions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    decision_id     TEXT NOT NULL UNIQUE,
    agent           TEXT NOT NULL,
    decision_text   TEXT NOT NULL,
    market_snapshot TEXT,
    timestamp       TEXT NOT NULL,
    is_structured   INTEGER NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    order_id        TEXT,
    error           TEXT,
    execution_ms    INTEGER,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decisions_status ON decisions(status);
CREATE INDEX IF NOT EXISTS idx_decisions_timestamp ON decisions(timestamp);
CREATE INDEX IF NOT EXISTS idx_decisions_agent ON decisions(agent);
";
