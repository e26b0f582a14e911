use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quorum_agents::snapshot::price_problem;
use quorum_agents::{MessageBus, RateLimiter};
use quorum_models::{
    topics, AccountBalance, BusMessage, ExchangeInfo, MarketMessage, MarketTick,
    SnapshotPublication, TickerData,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::MarketDataSource;

/// Counters for one collection round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub fetched: usize,
    pub ticks_published: usize,
    pub rate_limited: usize,
    pub errors: usize,
    /// Tickers fetched without a usable price.
    pub dropped: usize,
    pub completed: bool,
}

/// Market-data producer: polls a source and publishes ticks plus one
/// complete snapshot per round onto the market topic.
pub struct MarketFeed {
    source: Arc<dyn MarketDataSource>,
    bus: Arc<MessageBus>,
    api_limiter: Arc<RateLimiter>,
    pairs: Vec<String>,
    collect_balance: bool,
    min_price_change: Decimal,
    last_prices: HashMap<String, Decimal>,
    exchange_info: Option<ExchangeInfo>,
}

impl MarketFeed {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        bus: Arc<MessageBus>,
        api_limiter: Arc<RateLimiter>,
        pairs: Vec<String>,
        collect_balance: bool,
        min_price_change: Decimal,
    ) -> Self {
        Self {
            source,
            bus,
            api_limiter,
            pairs,
            collect_balance,
            min_price_change,
            last_prices: HashMap::new(),
            exchange_info: None,
        }
    }

    /// Collect immediately, then every `interval` until cancelled.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        info!(source = self.source.name(), pairs = ?self.pairs, "Market feed starting");
        self.collect_round().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Market feed shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    self.collect_round().await;
                }
            }
        }
    }

    /// One pass over every pair, the balance and (until first seen) the
    /// exchange info. Each fetch must pass the API limiter; denied fetches
    /// are skipped for this round. A complete publication goes out only when
    /// at least one ticker was fetched, since agents replace their snapshot
    /// wholesale on receipt.
    pub async fn collect_round(&mut self) -> RoundSummary {
        let mut summary = RoundSummary::default();
        let mut tickers: BTreeMap<String, TickerData> = BTreeMap::new();

        let pairs = self.pairs.clone();
        for pair in &pairs {
            if !self.admit("ticker", pair, &mut summary) {
                continue;
            }
            match self.source.ticker(pair).await {
                Ok(Some(mut ticker)) => {
                    summary.fetched += 1;
                    ticker.pair.get_or_insert_with(|| pair.clone());
                    if let Some(reason) = price_problem(&ticker) {
                        summary.dropped += 1;
                        warn!(pair = %pair, reason, "Skipping ticker");
                        continue;
                    }
                    if self.price_moved(pair, ticker.price) {
                        self.publish(MarketTick::Ticker(ticker.clone()));
                        summary.ticks_published += 1;
                    }
                    tickers.insert(pair.clone(), ticker);
                }
                Ok(None) => debug!(pair = %pair, "No ticker available"),
                Err(e) => {
                    summary.errors += 1;
                    warn!(pair = %pair, error = %e, "Ticker fetch failed");
                }
            }
        }

        let balance = if self.collect_balance {
            self.fetch_balance(&mut summary).await
        } else {
            None
        };

        if self.exchange_info.is_none() && self.admit("exchange_info", "-", &mut summary) {
            match self.source.exchange_info().await {
                Ok(info) => {
                    if let Some(info) = &info {
                        self.publish(MarketTick::ExchangeInfo(info.clone()));
                    }
                    self.exchange_info = info;
                }
                Err(e) => {
                    summary.errors += 1;
                    warn!(error = %e, "Exchange info fetch failed");
                }
            }
        }

        if !tickers.is_empty() {
            let publication = SnapshotPublication {
                tickers,
                balance,
                exchange_info: self.exchange_info.clone(),
                timestamp: Utc::now(),
            };
            let delivered = self.bus.publish(
                topics::MARKET,
                BusMessage::Market(MarketMessage::Complete(publication)),
            );
            summary.completed = true;
            debug!(delivered, "Complete snapshot published");
        }

        info!(
            fetched = summary.fetched,
            ticks = summary.ticks_published,
            rate_limited = summary.rate_limited,
            errors = summary.errors,
            dropped = summary.dropped,
            completed = summary.completed,
            "Collection round finished"
        );
        summary
    }

    async fn fetch_balance(&mut self, summary: &mut RoundSummary) -> Option<AccountBalance> {
        if !self.admit("balance", "-", summary) {
            return None;
        }
        match self.source.balance().await {
            Ok(Some(balance)) => {
                summary.fetched += 1;
                self.publish(MarketTick::Balance(balance.clone()));
                Some(balance)
            }
            Ok(None) => None,
            Err(e) => {
                summary.errors += 1;
                warn!(error = %e, "Balance fetch failed");
                None
            }
        }
    }

    fn admit(&self, what: &str, pair: &str, summary: &mut RoundSummary) -> bool {
        if self.api_limiter.try_acquire() {
            return true;
        }
        summary.rate_limited += 1;
        debug!(
            what,
            pair,
            wait_ms = self.api_limiter.wait_time().as_millis() as u64,
            "Fetch skipped: API rate limit"
        );
        false
    }

    /// First sighting always counts as a move.
    fn price_moved(&mut self, pair: &str, price: Option<Decimal>) -> bool {
        let Some(price) = price else {
            return false;
        };
        let moved = match self.last_prices.get(pair) {
            Some(last) => (price - *last).abs() > self.min_price_change,
            None => true,
        };
        if moved {
            self.last_prices.insert(pair.to_string(), price);
        }
        moved
    }

    fn publish(&self, tick: MarketTick) {
        self.bus
            .publish(topics::MARKET, BusMessage::Market(MarketMessage::Tick(tick)));
    }
}
