use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use quorum_models::{RawDecision, TradeIntent};

/// Latest decision seen from one agent, with its parsed intent if any.
#[derive(Debug, Clone)]
pub struct CachedDecision {
    pub record_id: Option<i64>,
    pub decision: Arc<RawDecision>,
    pub intent: Option<TradeIntent>,
}

/// Short-lived per-agent decision cache backed by moka.
///
/// Keyed by agent name, so a newer decision from the same agent replaces
/// its previous one. Entries expire after the consensus window.
pub struct DecisionCache {
    inner: Cache<String, CachedDecision>,
}

impl DecisionCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn insert(&self, entry: CachedDecision) {
        self.inner.insert(entry.decision.agent.clone(), entry).await;
    }

    pub async fn get(&self, agent: &str) -> Option<CachedDecision> {
        self.inner.get(agent).await
    }

    pub async fn invalidate(&self, agent: &str) {
        self.inner.invalidate(agent).await;
    }

    /// Intents from decisions timestamped at or after `since`, optionally
    /// restricted to one pair.
    pub fn intents_since(&self, since: DateTime<Utc>, pair: Option<&str>) -> Vec<TradeIntent> {
        let mut intents: Vec<TradeIntent> = self
            .inner
            .iter()
            .filter(|(_, entry)| entry.decision.timestamp >= since)
            .filter_map(|(_, entry)| entry.intent)
            .filter(|intent| pair.map_or(true, |p| intent.pair == p))
            .collect();
        intents.sort_by_key(|intent| intent.decided_at);
        intents
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Apply pending evictions so `entry_count` is exact.
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }
}
