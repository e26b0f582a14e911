use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use quorum_models::{Side, TradeIntent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ExecutionError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub pair: String,
    pub side: Side,
    pub quantity: Decimal,
    /// None = market order.
    pub price: Option<Decimal>,
}

impl From<&TradeIntent> for OrderRequest {
    fn from(intent: &TradeIntent) -> Self {
        Self {
            pair: intent.pair.clone(),
            side: intent.side,
            quantity: intent.quantity,
            price: intent.limit_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderResult {
    pub order_id: String,
    pub status: String,
    /// Exchange-specific response body.
    pub raw: serde_json::Value,
}

/// Order-placement collaborator.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult, ExecutionError>;
}

/// Dry-run exchange: accepts every order and remembers it.
#[derive(Debug, Default)]
pub struct PaperExchange {
    orders: Mutex<Vec<OrderRequest>>,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders accepted so far, oldest first.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult, ExecutionError> {
        let order_id = format!("dry_run_{}", Utc::now().timestamp_millis());
        info!(
            order_id = %order_id,
            pair = %order.pair,
            side = %order.side,
            quantity = %order.quantity,
            price = ?order.price,
            "Paper order accepted"
        );

        self.orders
            .lock()
            .map_err(|e| ExecutionError::Exchange(format!("Paper ledger poisoned: {e}")))?
            .push(order.clone());

        Ok(OrderResult {
            order_id,
            status: "filled".to_string(),
            raw: serde_json::to_value(order).unwrap_or(serde_json::Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn paper_exchange_records_orders() {
        let exchange = PaperExchange::new();
        let order = OrderRequest {
            pair: "BTC/USD".to_string(),
            side: Side::Buy,
            quantity: dec!(0.005),
            price: Some(dec!(100000)),
        };

        let result = exchange.place_order(&order).await.unwrap();
        assert!(result.order_id.starts_with("dry_run_"));
        assert_eq!(result.status, "filled");
        assert_eq!(result.raw["pair"], "BTC/USD");
        assert_eq!(exchange.orders(), vec![order]);
    }

    #[test]
    fn order_request_from_intent_keeps_limit() {
        let intent = TradeIntent {
            side: Side::Sell,
            pair: "ETH/USD".to_string(),
            quantity: dec!(0.25),
            limit_price: Some(dec!(3150)),
            confidence: None,
            source_decision_id: uuid::Uuid::new_v4(),
            assumed_default: false,
            decided_at: Utc::now(),
        };
        let order = OrderRequest::from(&intent);
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.quantity, dec!(0.25));
        assert_eq!(order.price, Some(dec!(3150)));
    }
}
