use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest ticker for one trading pair.
///
/// `pair` and `price` are optional on the wire; ticks missing either are
/// dropped by the snapshot aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickerData {
    pub pair: Option<String>,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    /// 24h change in percent.
    #[serde(default)]
    pub change_24h: Option<Decimal>,
    #[serde(default)]
    pub high_24h: Option<Decimal>,
    #[serde(default)]
    pub low_24h: Option<Decimal>,
    /// Provider-computed indicators, passed through to prompts untouched.
    #[serde(default)]
    pub indicators: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl TickerData {
    /// A ticker with only pair and price set.
    pub fn new(pair: impl Into<String>, price: Decimal) -> Self {
        Self {
            pair: Some(pair.into()),
            price: Some(price),
            volume_24h: None,
            change_24h: None,
            high_24h: None,
            low_24h: None,
            indicators: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CurrencyBalance {
    #[serde(default)]
    pub available: Decimal,
    #[serde(default)]
    pub locked: Decimal,
    #[serde(default)]
    pub total: Decimal,
}

/// Account balance as reported by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountBalance {
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub available: Option<Decimal>,
    /// Per-currency balances keyed by currency code (`USD`, `BTC`, ...).
    #[serde(default)]
    pub currencies: BTreeMap<String, CurrencyBalance>,
    pub timestamp: DateTime<Utc>,
}

impl AccountBalance {
    pub fn available_of(&self, currency: &str) -> Option<Decimal> {
        self.currencies.get(currency).map(|c| c.available)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeInfo {
    #[serde(default)]
    pub trade_pairs: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A single incremental market update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketTick {
    Ticker(TickerData),
    Balance(AccountBalance),
    ExchangeInfo(ExchangeInfo),
}

/// Payload of a "complete snapshot" publication: the producer's full view
/// of the market at the end of a collection round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotPublication {
    pub tickers: BTreeMap<String, TickerData>,
    pub balance: Option<AccountBalance>,
    pub exchange_info: Option<ExchangeInfo>,
    pub timestamp: DateTime<Utc>,
}

/// Messages carried on the market topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MarketMessage {
    Tick(MarketTick),
    Complete(SnapshotPublication),
}

/// Per-agent aggregate of the latest market state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub tickers: BTreeMap<String, TickerData>,
    pub balance: Option<AccountBalance>,
    pub exchange_info: Option<ExchangeInfo>,
    pub is_complete: bool,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn empty() -> Self {
        Self {
            tickers: BTreeMap::new(),
            balance: None,
            exchange_info: None,
            is_complete: false,
            timestamp: Utc::now(),
        }
    }

    /// Snapshot built verbatim from a complete publication.
    pub fn from_publication(publication: &SnapshotPublication) -> Self {
        Self {
            tickers: publication.tickers.clone(),
            balance: publication.balance.clone(),
            exchange_info: publication.exchange_info.clone(),
            is_complete: true,
            timestamp: publication.timestamp,
        }
    }

    pub fn price_of(&self, pair: &str) -> Option<Decimal> {
        self.tickers.get(pair).and_then(|t| t.price)
    }

    /// A snapshot is usable for a decision once at least one ticker is
    /// known. Balance is optional.
    pub fn is_usable(&self) -> bool {
        !self.tickers.is_empty()
    }
}

/// Split `BASE/QUOTE` into its currency codes.
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (base, quote) = pair.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}
