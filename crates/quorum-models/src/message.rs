use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::{MarketMessage, MarketSnapshot};

/// Well-known bus topic names.
pub mod topics {
    pub const MARKET: &str = "market_data";
    pub const DIALOG: &str = "dialog";
    pub const DECISIONS: &str = "decisions";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Conversational context injected into an agent's next prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogMessage {
    pub role: ChatRole,
    pub content: String,
}

impl DialogMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A model response as published by an agent. Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawDecision {
    pub id: Uuid,
    pub agent: String,
    pub decision_text: String,
    /// Snapshot the agent was looking at when it asked the model.
    pub market_snapshot: Option<MarketSnapshot>,
    pub timestamp: DateTime<Utc>,
    /// Whether the text carried a parseable JSON payload (diagnostic only).
    pub is_structured: bool,
}

impl RawDecision {
    pub fn new(
        agent: impl Into<String>,
        decision_text: impl Into<String>,
        market_snapshot: Option<MarketSnapshot>,
        is_structured: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent: agent.into(),
            decision_text: decision_text.into(),
            market_snapshot,
            timestamp: Utc::now(),
            is_structured,
        }
    }
}

/// Envelope for everything carried on the in-process bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "topic", content = "message", rename_all = "snake_case")]
pub enum BusMessage {
    Market(MarketMessage),
    Dialog(DialogMessage),
    Decision(RawDecision),
}
