use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quorum_agents::claude_cli::ClaudeCliConfig;
use quorum_agents::{
    AgentSettings, CapitalManager, ClaudeCliModel, MessageBus, ModelClient, RateLimiters,
    TradingAgent,
};
use quorum_executor::{DecisionManager, Exchange, ExecutorSettings, TradeExecutor, ValidationLimits};
use quorum_models::{topics, AgentConfig, BusMessage, DialogMessage};
use quorum_store::DecisionRecorder;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::sources::feed::MarketFeed;
use crate::sources::MarketDataSource;

/// The trading daemon. Runs one task per agent, the trade executor, the
/// market feed and a statistics reporter, all sharing one bus and one pair
/// of rate limiters.
pub struct Daemon {
    config: DaemonConfig,
    recorder: Arc<DecisionRecorder>,
    source: Arc<dyn MarketDataSource>,
    exchange: Arc<dyn Exchange>,
    models: HashMap<String, Arc<dyn ModelClient>>,
    bus: Arc<MessageBus>,
    cancel: CancellationToken,
}

impl Daemon {
    pub fn new(
        config: DaemonConfig,
        recorder: DecisionRecorder,
        source: Arc<dyn MarketDataSource>,
        exchange: Arc<dyn Exchange>,
    ) -> Self {
        Self {
            config,
            recorder: Arc::new(recorder),
            source,
            exchange,
            models: HashMap::new(),
            bus: Arc::new(MessageBus::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `model` for the named agent instead of the Claude CLI.
    pub fn with_model(mut self, agent: impl Into<String>, model: Arc<dyn ModelClient>) -> Self {
        self.models.insert(agent.into(), model);
        self
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    pub fn recorder(&self) -> Arc<DecisionRecorder> {
        self.recorder.clone()
    }

    fn model_for(&self, agent: &AgentConfig) -> Arc<dyn ModelClient> {
        if let Some(model) = self.models.get(&agent.name) {
            return model.clone();
        }
        let agents = &self.config.core.agents;
        let cli = ClaudeCliConfig {
            model: agent.model.clone().unwrap_or_else(|| agents.model.clone()),
            timeout: Duration::from_secs(agents.model_timeout_seconds),
            ..ClaudeCliConfig::default()
        };
        Arc::new(ClaudeCliModel::new(agent.name.clone(), cli))
    }

    fn capital(&self, agent_names: &[String]) -> Option<Arc<CapitalManager>> {
        let total = self.config.core.capital.total?;
        let Some(total) = Decimal::from_f64(total) else {
            tracing::warn!(total, "Ignoring unrepresentable capital total");
            return None;
        };
        let capital = CapitalManager::new();
        capital.allocate_equal(agent_names, total);
        Some(Arc::new(capital))
    }

    /// Run the daemon until cancelled.
    pub async fn run(&self) -> Result<(), DaemonError> {
        tracing::info!("Quorum daemon starting");

        let core = &self.config.core;
        let enabled: Vec<&AgentConfig> = core.agents.enabled().collect();
        if enabled.is_empty() {
            return Err(DaemonError::Config("no enabled agents".to_string()));
        }
        let names: Vec<String> = enabled.iter().map(|a| a.name.clone()).collect();

        let limiters = RateLimiters::from_config(&core.rate_limits);
        let capital = self.capital(&names);
        let mut join_set = tokio::task::JoinSet::new();

        // Task 1: trade executor
        {
            let manager = DecisionManager::new(
                self.recorder.clone(),
                ValidationLimits::from_config(&core.executor),
            );
            let executor = TradeExecutor::new(
                ExecutorSettings::from_config(&core.executor, core.store.decision_cache_capacity),
                manager,
                self.exchange.clone(),
                &self.bus,
                capital.clone(),
            );
            join_set.spawn(executor.run(self.cancel.clone()));
        }

        // Task 2..n: one loop per agent. All agents subscribe before the feed
        // starts so the first complete snapshot reaches every one of them.
        for agent in &enabled {
            let trading_agent = TradingAgent::new(
                AgentSettings::from_config(agent, &core.agents),
                self.model_for(agent),
                limiters.decision.clone(),
                self.bus.clone(),
                capital.clone(),
            );
            tracing::info!(agent = %agent.name, strategy = %agent.strategy, "Agent registered");
            join_set.spawn(trading_agent.run(self.cancel.clone()));
        }

        if let Some(prompt) = &self.config.feed.initial_prompt {
            let delivered = self.bus.publish(
                topics::DIALOG,
                BusMessage::Dialog(DialogMessage::user(prompt.clone())),
            );
            tracing::info!(delivered, "Initial prompt broadcast");
        }

        // Market feed
        {
            let feed_config = &self.config.feed;
            let min_change =
                Decimal::from_f64(feed_config.min_price_change).unwrap_or(Decimal::ZERO);
            let feed = MarketFeed::new(
                self.source.clone(),
                self.bus.clone(),
                limiters.api.clone(),
                feed_config.pairs.clone(),
                feed_config.collect_balance,
                min_change,
            );
            let interval = Duration::from_secs(feed_config.collect_interval_seconds);
            join_set.spawn(feed.run(interval, self.cancel.clone()));
        }

        // Statistics reporter
        {
            let recorder = self.recorder.clone();
            let capital = capital.clone();
            let interval = Duration::from_secs(self.config.feed.stats_interval_seconds);
            join_set.spawn(stats_loop(recorder, capital, interval, self.cancel.clone()));
        }

        tracing::info!(agents = names.len(), "All daemon tasks started");

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Daemon task panicked");
            }
        }

        tracing::info!("Quorum daemon stopped");
        Ok(())
    }
}

/// Periodically log decision statistics over the last 24 hours.
pub async fn stats_loop(
    recorder: Arc<DecisionRecorder>,
    capital: Option<Arc<CapitalManager>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stats loop shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                match recorder.statistics(24) {
                    Ok(stats) => tracing::info!(
                        total = stats.total,
                        pending = stats.pending,
                        success = stats.success,
                        failed = stats.failed,
                        skipped = stats.skipped,
                        success_rate = stats.success_rate,
                        avg_execution_ms = ?stats.avg_execution_ms,
                        "Decision statistics"
                    ),
                    Err(e) => tracing::error!(error = %e, "Failed to read statistics"),
                }
                if let Some(capital) = &capital {
                    let summary = capital.summary();
                    tracing::info!(
                        allocated = %summary.total_allocated,
                        available = %summary.total_available,
                        used = %summary.total_used,
                        "Capital summary"
                    );
                }
            }
        }
    }
}
