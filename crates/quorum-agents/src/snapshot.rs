use std::collections::BTreeMap;

use chrono::Utc;
use quorum_models::{
    AccountBalance, ExchangeInfo, MarketMessage, MarketSnapshot, MarketTick, TickerData,
};
use rust_decimal::Decimal;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    AwaitingData,
    Aggregating,
    SnapshotReady,
}

/// What applying one market message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Incremental update merged into the running snapshot.
    Merged,
    /// A complete publication replaced the snapshot.
    Completed,
    /// Malformed tick, ignored.
    Dropped(&'static str),
}

/// Per-agent merge of market ticks into a running snapshot.
///
/// Partial ticks upsert one key at a time. A complete publication replaces
/// tickers, balance and exchange info wholesale.
#[derive(Debug)]
pub struct SnapshotAggregator {
    state: AggregatorState,
    tickers: BTreeMap<String, TickerData>,
    balance: Option<AccountBalance>,
    exchange_info: Option<ExchangeInfo>,
    snapshot: MarketSnapshot,
}

impl SnapshotAggregator {
    pub fn new() -> Self {
        Self {
            state: AggregatorState::AwaitingData,
            tickers: BTreeMap::new(),
            balance: None,
            exchange_info: None,
            snapshot: MarketSnapshot::empty(),
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn snapshot(&self) -> &MarketSnapshot {
        &self.snapshot
    }

    pub fn is_usable(&self) -> bool {
        self.snapshot.is_usable()
    }

    pub fn apply(&mut self, message: MarketMessage) -> ApplyOutcome {
        match message {
            MarketMessage::Complete(mut publication) => {
                publication.tickers.retain(|pair, ticker| match price_problem(ticker) {
                    Some(reason) => {
                        debug!(%pair, reason, "Dropping ticker from complete publication");
                        false
                    }
                    None => true,
                });
                self.snapshot = MarketSnapshot::from_publication(&publication);
                self.tickers = publication.tickers;
                self.balance = publication.balance;
                self.exchange_info = publication.exchange_info;
                self.state = AggregatorState::SnapshotReady;
                ApplyOutcome::Completed
            }
            MarketMessage::Tick(tick) => {
                let outcome = self.merge(tick);
                if outcome == ApplyOutcome::Merged {
                    self.rebuild();
                    self.state = AggregatorState::Aggregating;
                }
                outcome
            }
        }
    }

    fn merge(&mut self, tick: MarketTick) -> ApplyOutcome {
        match tick {
            MarketTick::Ticker(ticker) => {
                let pair = match ticker.pair.as_deref() {
                    Some(pair) if !pair.trim().is_empty() => pair.to_string(),
                    _ => return ApplyOutcome::Dropped("missing pair"),
                };
                if let Some(reason) = price_problem(&ticker) {
                    return ApplyOutcome::Dropped(reason);
                }
                self.tickers.insert(pair, ticker);
            }
            MarketTick::Balance(balance) => {
                self.balance = Some(balance);
            }
            MarketTick::ExchangeInfo(info) => {
                self.exchange_info = Some(info);
            }
        }
        ApplyOutcome::Merged
    }

    fn rebuild(&mut self) {
        self.snapshot = MarketSnapshot {
            tickers: self.tickers.clone(),
            balance: self.balance.clone(),
            exchange_info: self.exchange_info.clone(),
            is_complete: false,
            timestamp: Utc::now(),
        };
    }
}

impl Default for SnapshotAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a ticker cannot enter a snapshot, if it cannot.
pub fn price_problem(ticker: &TickerData) -> Option<&'static str> {
    match ticker.price {
        None => Some("missing price"),
        Some(price) if price <= Decimal::ZERO => Some("non-positive price"),
        Some(_) => None,
    }
}
