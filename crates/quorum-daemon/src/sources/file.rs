use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use quorum_models::{
    decimal_from_json, AccountBalance, CurrencyBalance, ExchangeInfo, TickerData,
};
use serde_json::Value;

use super::MarketDataSource;
use crate::error::DaemonError;

/// Market source backed by a JSON file that is re-read on every fetch, so
/// an external process (or a test) can update prices in place.
///
/// ```json
/// {
///   "tickers": { "BTC/USD": { "price": 100000, "change_24h": 1.5 } },
///   "balance": { "USD": { "available": 5000, "locked": 0, "total": 5000 } },
///   "trade_pairs": ["BTC/USD", "ETH/USD"]
/// }
/// ```
///
/// Numbers may be JSON numbers or strings.
pub struct FileMarketSource {
    path: PathBuf,
}

impl FileMarketSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Value, DaemonError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn field(value: &Value, key: &str) -> Option<rust_decimal::Decimal> {
    value.get(key).and_then(decimal_from_json)
}

fn parse_ticker(pair: &str, value: &Value) -> TickerData {
    TickerData {
        pair: Some(pair.to_string()),
        price: field(value, "price"),
        volume_24h: field(value, "volume_24h"),
        change_24h: field(value, "change_24h"),
        high_24h: field(value, "high_24h"),
        low_24h: field(value, "low_24h"),
        indicators: value.get("indicators").cloned(),
        timestamp: Utc::now(),
    }
}

fn parse_balance(value: &Value) -> Result<AccountBalance, DaemonError> {
    let entries = value
        .as_object()
        .ok_or_else(|| DaemonError::Source("balance must be an object".to_string()))?;

    let mut currencies = BTreeMap::new();
    for (code, entry) in entries {
        let available = field(entry, "available").unwrap_or_default();
        let locked = field(entry, "locked").unwrap_or_default();
        let total = field(entry, "total").unwrap_or(available + locked);
        currencies.insert(
            code.to_uppercase(),
            CurrencyBalance {
                available,
                locked,
                total,
            },
        );
    }

    Ok(AccountBalance {
        total: None,
        available: None,
        currencies,
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl MarketDataSource for FileMarketSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn ticker(&self, pair: &str) -> Result<Option<TickerData>, DaemonError> {
        let data = self.load().await?;
        Ok(data
            .get("tickers")
            .and_then(|tickers| tickers.get(pair))
            .map(|value| parse_ticker(pair, value)))
    }

    async fn balance(&self) -> Result<Option<AccountBalance>, DaemonError> {
        let data = self.load().await?;
        data.get("balance").map(parse_balance).transpose()
    }

    async fn exchange_info(&self) -> Result<Option<ExchangeInfo>, DaemonError> {
        let data = self.load().await?;
        let Some(pairs) = data.get("trade_pairs").and_then(Value::as_array) else {
            return Ok(None);
        };
        Ok(Some(ExchangeInfo {
            trade_pairs: pairs
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            timestamp: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("market.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_tickers_balance_and_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{
                "tickers": {"BTC/USD": {"price": 100000, "change_24h": "-1.25", "volume_24h": 1234.5}},
                "balance": {"usd": {"available": 5000, "locked": 100}},
                "trade_pairs": ["BTC/USD", "ETH/USD"]
            }"#,
        );
        let source = FileMarketSource::new(path);

        let ticker = source.ticker("BTC/USD").await.unwrap().unwrap();
        assert_eq!(ticker.pair.as_deref(), Some("BTC/USD"));
        assert_eq!(ticker.price, Some(dec!(100000)));
        assert_eq!(ticker.change_24h, Some(dec!(-1.25)));
        assert_eq!(ticker.volume_24h, Some(dec!(1234.5)));
        assert!(source.ticker("DOGE/USD").await.unwrap().is_none());

        let balance = source.balance().await.unwrap().unwrap();
        let usd = &balance.currencies["USD"];
        assert_eq!(usd.available, dec!(5000));
        assert_eq!(usd.total, dec!(5100));

        let info = source.exchange_info().await.unwrap().unwrap();
        assert_eq!(info.trade_pairs, vec!["BTC/USD", "ETH/USD"]);
    }

    #[tokio::test]
    async fn missing_sections_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileMarketSource::new(write(&dir, "{}"));
        assert!(source.ticker("BTC/USD").await.unwrap().is_none());
        assert!(source.balance().await.unwrap().is_none());
        assert!(source.exchange_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreadable_file_is_an_error() {
        let source = FileMarketSource::new("/nonexistent/market.json");
        assert!(matches!(
            source.ticker("BTC/USD").await,
            Err(DaemonError::Io(_))
        ));
    }
}
