use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};
use quorum_models::{DecisionRecord, DecisionStatistics, ExecutionOutcome, RawDecision};

use crate::error::StoreError;
use crate::sqlite::DecisionStore;

/// Shared handle over the decision store for async callers.
///
/// `rusqlite::Connection` is not `Sync`, so access goes through a `Mutex`;
/// this also serializes concurrent updates to the same record.
pub struct DecisionRecorder {
    store: Mutex<DecisionStore>,
}

impl DecisionRecorder {
    pub fn new(store: DecisionStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(DecisionStore::open_in_memory()?))
    }

    fn store(&self) -> Result<MutexGuard<'_, DecisionStore>, StoreError> {
        self.store
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    /// Persist a decision on receipt.
    pub fn record_received(&self, decision: &RawDecision) -> Result<i64, StoreError> {
        let id = self.store()?.insert_decision(decision)?;
        tracing::debug!(id, agent = %decision.agent, "Decision recorded");
        Ok(id)
    }

    pub fn record_outcome(&self, id: i64, outcome: &ExecutionOutcome) -> Result<(), StoreError> {
        self.store()?.record_outcome(id, outcome)?;
        tracing::debug!(id, status = %outcome.status, "Decision finalized");
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<Option<DecisionRecord>, StoreError> {
        self.store()?.get(id)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<DecisionRecord>, StoreError> {
        self.store()?.recent(limit)
    }

    /// Statistics over the trailing `hours`.
    pub fn statistics(&self, hours: i64) -> Result<DecisionStatistics, StoreError> {
        self.store()?.statistics(Utc::now() - Duration::hours(hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_models::ExecutionStatus;
    use std::sync::Arc;

    #[test]
    fn receive_then_finalize() {
        let recorder = DecisionRecorder::in_memory().unwrap();
        let decision = RawDecision::new("momentum", "hold", None, false);
        let id = recorder.record_received(&decision).unwrap();

        recorder
            .record_outcome(id, &ExecutionOutcome::skipped("no action: hold"))
            .unwrap();

        let record = recorder.get(id).unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Skipped);
        assert_eq!(record.error.as_deref(), Some("no action: hold"));

        let stats = recorder.statistics(24).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn concurrent_finalizers_see_one_winner() {
        let recorder = Arc::new(DecisionRecorder::in_memory().unwrap());
        let id = recorder
            .record_received(&RawDecision::new("a", "buy 1 btc", None, false))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    recorder
                        .record_outcome(id, &ExecutionOutcome::success(format!("o-{i}"), 1))
                        .is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(recorder.recent(10).unwrap().len(), 1);
    }
}
