use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Canonical trade instruction extracted from an agent's decision text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeIntent {
    pub side: Side,
    /// Pair in `BASE/QUOTE` form, e.g. `BTC/USD`.
    pub pair: String,
    pub quantity: Decimal,
    /// None = market order.
    pub limit_price: Option<Decimal>,
    pub confidence: Option<Decimal>,
    pub source_decision_id: Uuid,
    /// True when no explicit quantity was found and the nominal default was used.
    pub assumed_default: bool,
    /// Timestamp of the raw decision this intent came from.
    pub decided_at: DateTime<Utc>,
}

/// Result of parsing a decision text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    Intent(TradeIntent),
    NoAction { reason: String },
    Unparsable { reason: String },
}

impl ParseOutcome {
    pub fn intent(&self) -> Option<&TradeIntent> {
        match self {
            Self::Intent(intent) => Some(intent),
            _ => None,
        }
    }

    pub fn into_intent(self) -> Option<TradeIntent> {
        match self {
            Self::Intent(intent) => Some(intent),
            _ => None,
        }
    }
}

/// Majority action reconciled from several agents' intents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusIntent {
    pub side: Side,
    pub pair: String,
    /// Mean quantity of the majority intents.
    pub quantity: Decimal,
    /// Mean limit price over the majority intents that carried one.
    pub limit_price: Option<Decimal>,
    pub agreeing: usize,
    pub total: usize,
    pub source_decision_ids: Vec<Uuid>,
    pub decided_at: DateTime<Utc>,
}

impl ConsensusIntent {
    /// Fraction of intents that agreed with the majority side.
    pub fn agreement_ratio(&self) -> Decimal {
        if self.total == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.agreeing as u64) / Decimal::from(self.total as u64)
    }

    /// View the consensus as a single intent attributed to `source_decision_id`.
    pub fn to_intent(&self, source_decision_id: Uuid) -> TradeIntent {
        TradeIntent {
            side: self.side,
            pair: self.pair.clone(),
            quantity: self.quantity,
            limit_price: self.limit_price,
            confidence: Some(self.agreement_ratio()),
            source_decision_id,
            assumed_default: false,
            decided_at: self.decided_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConsensusOutcome {
    Reached(ConsensusIntent),
    /// Equal number of BUY and SELL intents.
    Tie { buys: usize, sells: usize },
    /// Fewer than two intents in the window.
    Insufficient { observed: usize },
}
