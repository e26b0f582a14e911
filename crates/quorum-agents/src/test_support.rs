//! Scripted model clients and market message builders shared by unit and
//! integration tests.
//!
//! `ScriptedModel` replays queued replies in order and records every prompt
//! it receives, so tests can assert on both what the agent asked and what it
//! published.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use quorum_models::{
    AccountBalance, BusMessage, CurrencyBalance, MarketMessage, MarketTick, SnapshotPublication,
    TickerData,
};

use crate::error::AgentError;
use crate::model::{ChatMessage, ChatOptions, ChatResponse, ModelClient};

/// Replays canned replies; errors once the queue is exhausted.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every message list passed to `chat`, oldest first.
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatResponse, AgentError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        let reply = self
            .replies
            .lock()
            .map_err(|e| AgentError::Model(format!("Script mutex poisoned: {e}")))?
            .pop_front()
            .ok_or_else(|| AgentError::Model("Script exhausted".to_string()))?;
        Ok(ChatResponse {
            content: reply,
            raw: serde_json::Value::Null,
        })
    }
}

/// Always fails, for exercising the skipped-trigger path.
pub struct FailingModel;

#[async_trait]
impl ModelClient for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatResponse, AgentError> {
        Err(AgentError::Model("backend unavailable".to_string()))
    }
}

pub fn ticker_message(pair: &str, price: Decimal) -> BusMessage {
    BusMessage::Market(MarketMessage::Tick(MarketTick::Ticker(TickerData::new(
        pair, price,
    ))))
}

/// A complete publication with the given tickers and, optionally, a USD
/// plus base-currency balance.
pub fn complete_message(prices: &[(&str, Decimal)], balance: Option<AccountBalance>) -> BusMessage {
    let tickers: BTreeMap<String, TickerData> = prices
        .iter()
        .map(|(pair, price)| (pair.to_string(), TickerData::new(*pair, *price)))
        .collect();
    BusMessage::Market(MarketMessage::Complete(SnapshotPublication {
        tickers,
        balance,
        exchange_info: None,
        timestamp: Utc::now(),
    }))
}

pub fn balance(currencies: &[(&str, Decimal)]) -> AccountBalance {
    let currencies: BTreeMap<String, CurrencyBalance> = currencies
        .iter()
        .map(|(currency, amount)| {
            (
                currency.to_string(),
                CurrencyBalance {
                    available: *amount,
                    locked: Decimal::ZERO,
                    total: *amount,
                },
            )
        })
        .collect();
    AccountBalance {
        total: None,
        available: None,
        currencies,
        timestamp: Utc::now(),
    }
}
