//! Quorum - multi-agent LLM trading decision pipeline
//!
//! Several agents watch a shared market feed, ask a language model for a
//! trading decision, and publish the raw reply. The executor parses each
//! reply into a trade intent, validates it, optionally reconciles agents by
//! majority vote, and submits it under an order cooldown.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use quorum::agents::{MessageBus, RateLimiter, TradingAgent};
//! use quorum::executor::{DecisionManager, PaperExchange, TradeExecutor};
//! use quorum::models::{ParseOutcome, QuorumConfig};
//! use quorum::store::DecisionRecorder;
//! ```

pub use quorum_agents as agents;
pub use quorum_executor as executor;
pub use quorum_models as models;
pub use quorum_store as store;

use anyhow::Context;
use chrono::Utc;
use quorum_models::{ParseOutcome, QuorumConfig};
use quorum_store::{DecisionRecorder, DecisionStore};
use uuid::Uuid;

/// Load a pipeline config. Sections the pipeline does not know (such as the
/// daemon's `[feed]`) are ignored.
pub fn load_config(path: &str) -> Result<QuorumConfig, anyhow::Error> {
    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&config_str).with_context(|| "Failed to parse config")
}

/// Open the configured decision store.
pub fn open_recorder(config: &QuorumConfig) -> Result<DecisionRecorder, anyhow::Error> {
    let store = DecisionStore::open(&config.store.sqlite_path)
        .with_context(|| format!("Failed to open decision DB: {}", config.store.sqlite_path))?;
    Ok(DecisionRecorder::new(store))
}

/// Parse a standalone decision text as if it had just been received.
pub fn parse_text(text: &str) -> ParseOutcome {
    quorum_agents::parse_decision(text, Uuid::new_v4(), Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_models::{RawDecision, Side};

    #[test]
    fn parse_text_reads_structured_reply() {
        let outcome = parse_text(r#"{"action":"sell","symbol":"ETHUSDT","quantity":"0.5"}"#);
        let intent = outcome.into_intent().unwrap();
        assert_eq!(intent.side, Side::Sell);
        assert_eq!(intent.pair, "ETH/USD");
    }

    #[test]
    fn load_config_ignores_daemon_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quorum.toml");
        std::fs::write(
            &path,
            "[store]\nsqlite_path = \"x.db\"\n\n[feed]\npairs = [\"BTC/USD\"]\n",
        )
        .unwrap();
        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.store.sqlite_path, "x.db");
    }

    #[test]
    fn open_recorder_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = QuorumConfig::default();
        config.store.sqlite_path = dir.path().join("q.db").to_string_lossy().into_owned();
        let recorder = open_recorder(&config).unwrap();
        recorder
            .record_received(&RawDecision::new("a", "hold", None, false))
            .unwrap();
        assert_eq!(recorder.recent(10).unwrap().len(), 1);
    }
}
