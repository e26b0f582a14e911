//! Daemon lifecycle: full pipeline from a file-backed market feed through
//! scripted agents to the paper exchange, plus graceful shutdown via
//! CancellationToken.
//!
//! ```bash
//! cargo test -p quorum-daemon --test daemon_lifecycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use quorum_agents::test_support::ScriptedModel;
use quorum_daemon::config::DaemonConfig;
use quorum_daemon::daemon::{stats_loop, Daemon};
use quorum_daemon::sources::file::FileMarketSource;
use quorum_executor::PaperExchange;
use quorum_models::{AgentConfig, ExecutionStatus, Side};
use quorum_store::{DecisionRecorder, DecisionStore};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

const MARKET: &str = r#"{
    "tickers": {"BTC/USD": {"price": 100000}},
    "balance": {"USD": {"available": 10000}},
    "trade_pairs": ["BTC/USD"]
}"#;

fn agent(name: &str) -> AgentConfig {
    AgentConfig {
        name: name.to_string(),
        strategy: "test".to_string(),
        risk_level: "low".to_string(),
        model: None,
        enabled: true,
    }
}

fn config(data_path: &str) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.core.agents.agents = vec![agent("alpha")];
    config.core.agents.poll_timeout_ms = 20;
    config.core.agents.drain_timeout_ms = 5;
    config.core.executor.poll_timeout_ms = 20;
    config.feed.data_path = data_path.to_string();
    config.feed.pairs = vec!["BTC/USD".to_string()];
    config.feed.collect_interval_seconds = 3600;
    config.feed.stats_interval_seconds = 3600;
    config
}

/// A complete snapshot from the feed triggers the agent, and its decision
/// ends up as a filled paper order recorded in the on-disk store.
#[tokio::test]
async fn pipeline_executes_decision_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let market_path = dir.path().join("market.json");
    std::fs::write(&market_path, MARKET).unwrap();
    let db_path = dir.path().join("quorum.db");

    let store = DecisionStore::open(db_path.to_str().unwrap()).unwrap();
    let paper = Arc::new(PaperExchange::new());
    let model = Arc::new(ScriptedModel::new(vec![
        r#"{"action":"open_long","symbol":"BTCUSDT","position_size_usd":500,"price_ref":100000}"#,
    ]));

    let daemon = Daemon::new(
        config(market_path.to_str().unwrap()),
        DecisionRecorder::new(store),
        Arc::new(FileMarketSource::new(&market_path)),
        paper.clone(),
    )
    .with_model("alpha", model);
    let recorder = daemon.recorder();
    let cancel = daemon.cancel_token();

    let handle = tokio::spawn(async move { daemon.run().await });

    let mut executed = false;
    for _ in 0..200 {
        let records = recorder.recent(5).unwrap();
        if records.iter().any(|r| r.status == ExecutionStatus::Success) {
            executed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(executed, "no decision was executed");

    let orders = paper.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, Side::Buy);
    assert_eq!(orders[0].quantity, dec!(0.005));

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("daemon did not shut down in time")
        .expect("daemon task panicked");
    assert!(result.is_ok());

    // Records survive on disk.
    let reopened = DecisionStore::open(db_path.to_str().unwrap()).unwrap();
    assert_eq!(reopened.count().unwrap(), 1);
}

/// The initial prompt counts as a dialog trigger even before market data.
#[tokio::test]
async fn initial_prompt_triggers_a_decision() {
    let dir = tempfile::tempdir().unwrap();
    let market_path = dir.path().join("market.json");
    std::fs::write(&market_path, "{}").unwrap();

    let mut config = config(market_path.to_str().unwrap());
    config.feed.initial_prompt = Some("Say hold.".to_string());

    let model = Arc::new(ScriptedModel::new(vec!["I will hold for now."]));
    let daemon = Daemon::new(
        config,
        DecisionRecorder::in_memory().unwrap(),
        Arc::new(FileMarketSource::new(&market_path)),
        Arc::new(PaperExchange::new()),
    )
    .with_model("alpha", model.clone());
    let recorder = daemon.recorder();
    let cancel = daemon.cancel_token();
    let handle = tokio::spawn(async move { daemon.run().await });

    let mut skipped = false;
    for _ in 0..200 {
        let records = recorder.recent(5).unwrap();
        if records.iter().any(|r| r.status == ExecutionStatus::Skipped) {
            skipped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(skipped, "hold decision was not recorded as skipped");
    assert!(model.prompts()[0].iter().any(|m| m.content == "Say hold."));

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
}

#[tokio::test]
async fn daemon_without_agents_is_a_config_error() {
    let mut config = DaemonConfig::default();
    config.core.agents.agents.clear();
    let daemon = Daemon::new(
        config,
        DecisionRecorder::in_memory().unwrap(),
        Arc::new(FileMarketSource::new("/nonexistent")),
        Arc::new(PaperExchange::new()),
    );
    assert!(daemon.run().await.is_err());
}

/// CancellationToken stops the stats loop promptly.
#[tokio::test]
async fn cancellation_token_stops_stats_loop_promptly() {
    let recorder = Arc::new(DecisionRecorder::in_memory().unwrap());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(stats_loop(
        recorder,
        None,
        Duration::from_secs(3600),
        cancel.clone(),
    ));

    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(
        result.is_ok(),
        "Stats loop did not respond to cancellation within 1 second"
    );
}
