use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use quorum_models::{
    topics, AgentConfig, AgentsConfig, BusMessage, DialogMessage, RawDecision,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{MessageBus, Subscription};
use crate::capital::CapitalManager;
use crate::model::{ChatOptions, ModelClient};
use crate::parser;
use crate::prompts;
use crate::rate_limiter::RateLimiter;
use crate::snapshot::{ApplyOutcome, SnapshotAggregator};

/// Why a decision was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Dialog,
    CompleteSnapshot,
    Interval,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dialog => "dialog",
            Self::CompleteSnapshot => "complete_snapshot",
            Self::Interval => "interval",
        }
    }

    fn note(&self) -> &'static str {
        match self {
            Self::Dialog => "new instructions in the conversation",
            Self::CompleteSnapshot => "fresh complete market snapshot",
            Self::Interval => "scheduled review",
        }
    }
}

/// Timing and prompt settings for one agent loop.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub name: String,
    pub system_prompt: String,
    pub decision_interval: Duration,
    pub history_len: usize,
    pub poll_timeout: Duration,
    pub drain_timeout: Duration,
    pub max_drain: usize,
    pub model_timeout: Duration,
    pub chat: ChatOptions,
}

impl AgentSettings {
    pub fn from_config(agent: &AgentConfig, agents: &AgentsConfig) -> Self {
        Self {
            name: agent.name.clone(),
            system_prompt: prompts::system_prompt(agent),
            decision_interval: Duration::from_secs(agents.decision_interval_seconds),
            history_len: agents.history_len,
            poll_timeout: Duration::from_millis(agents.poll_timeout_ms),
            drain_timeout: Duration::from_millis(agents.drain_timeout_ms),
            max_drain: agents.max_drain.max(1),
            model_timeout: Duration::from_secs(agents.model_timeout_seconds),
            chat: ChatOptions {
                temperature: Some(agents.temperature),
                max_tokens: Some(agents.max_tokens),
            },
        }
    }
}

/// One decision-making agent: aggregates market data, reacts to triggers,
/// asks the model, and publishes raw decisions.
pub struct TradingAgent {
    settings: AgentSettings,
    model: Arc<dyn ModelClient>,
    decision_limiter: Arc<RateLimiter>,
    bus: Arc<MessageBus>,
    capital: Option<Arc<CapitalManager>>,
    market: Subscription,
    dialog: Subscription,
    aggregator: SnapshotAggregator,
    history: VecDeque<DialogMessage>,
    last_trigger: Instant,
}

impl TradingAgent {
    /// Subscribes to the market and dialog topics immediately, so anything
    /// published after construction reaches this agent.
    pub fn new(
        settings: AgentSettings,
        model: Arc<dyn ModelClient>,
        decision_limiter: Arc<RateLimiter>,
        bus: Arc<MessageBus>,
        capital: Option<Arc<CapitalManager>>,
    ) -> Self {
        let market = bus.subscribe(topics::MARKET);
        let dialog = bus.subscribe(topics::DIALOG);
        Self {
            settings,
            model,
            decision_limiter,
            bus,
            capital,
            market,
            dialog,
            aggregator: SnapshotAggregator::new(),
            history: VecDeque::new(),
            last_trigger: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn aggregator(&self) -> &SnapshotAggregator {
        &self.aggregator
    }

    pub fn history(&self) -> impl Iterator<Item = &DialogMessage> {
        self.history.iter()
    }

    /// Run until cancelled. Each iteration waits at most one poll timeout,
    /// so cancellation is observed promptly.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(agent = %self.settings.name, "Agent loop starting");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let trigger = tokio::select! {
                _ = cancel.cancelled() => break,
                trigger = self.poll() => trigger,
            };

            if let Some(trigger) = trigger {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.decide(trigger) => {}
                }
            }
        }

        info!(agent = %self.settings.name, "Agent loop shutting down");
    }

    /// Drain pending input and report which trigger, if any, fired.
    ///
    /// Priority: dialog > complete snapshot > elapsed interval.
    pub async fn poll(&mut self) -> Option<Trigger> {
        let completed = self.drain_market().await;
        let dialog = self.drain_dialog();

        if dialog {
            Some(Trigger::Dialog)
        } else if completed {
            Some(Trigger::CompleteSnapshot)
        } else if self.last_trigger.elapsed() >= self.settings.decision_interval
            && self.aggregator.is_usable()
        {
            Some(Trigger::Interval)
        } else {
            None
        }
    }

    /// Apply queued market messages until a complete marker is seen, the
    /// queue stays empty for one wait, or `max_drain` is reached. The first
    /// wait is the idle poll timeout, later ones the shorter drain timeout.
    async fn drain_market(&mut self) -> bool {
        let mut wait = self.settings.poll_timeout;
        for _ in 0..self.settings.max_drain {
            let Some(message) = self.market.receive(wait).await else {
                break;
            };
            wait = self.settings.drain_timeout;

            let BusMessage::Market(message) = message else {
                debug!(agent = %self.settings.name, "Ignoring non-market message on market topic");
                continue;
            };
            match self.aggregator.apply(message) {
                ApplyOutcome::Completed => {
                    debug!(
                        agent = %self.settings.name,
                        pairs = self.aggregator.snapshot().tickers.len(),
                        "Complete snapshot received"
                    );
                    return true;
                }
                ApplyOutcome::Merged => {}
                ApplyOutcome::Dropped(reason) => {
                    debug!(agent = %self.settings.name, reason, "Dropped market tick");
                }
            }
        }
        false
    }

    fn drain_dialog(&mut self) -> bool {
        let mut received = false;
        while let Some(message) = self.dialog.try_receive() {
            match message {
                BusMessage::Dialog(message) => {
                    self.push_history(message);
                    received = true;
                }
                _ => debug!(agent = %self.settings.name, "Ignoring non-dialog message on dialog topic"),
            }
        }
        received
    }

    fn push_history(&mut self, message: DialogMessage) {
        self.history.push_back(message);
        while self.history.len() > self.settings.history_len {
            self.history.pop_front();
        }
    }

    /// Ask the model for a decision and publish it.
    ///
    /// Returns `None` when the decision limiter denies the trigger or the
    /// model call fails; neither is retried.
    pub async fn decide(&mut self, trigger: Trigger) -> Option<RawDecision> {
        let name = self.settings.name.clone();
        self.last_trigger = Instant::now();

        if !self.decision_limiter.try_acquire() {
            warn!(
                agent = %name,
                trigger = trigger.as_str(),
                wait_ms = self.decision_limiter.wait_time().as_millis() as u64,
                "Decision skipped: rate limit"
            );
            return None;
        }

        let capital = self
            .capital
            .as_ref()
            .and_then(|capital| capital.allocation(&name));
        let snapshot = self.aggregator.snapshot().clone();
        let messages = prompts::build_messages(
            &self.settings.system_prompt,
            &self.history,
            &snapshot,
            capital.as_ref(),
            trigger.note(),
        );

        let start = Instant::now();
        let response = match tokio::time::timeout(
            self.settings.model_timeout,
            self.model.chat(&messages, &self.settings.chat),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(agent = %name, model = self.model.name(), error = %e, "Model call failed");
                return None;
            }
            Err(_) => {
                warn!(
                    agent = %name,
                    timeout_secs = self.settings.model_timeout.as_secs(),
                    "Model call timed out"
                );
                return None;
            }
        };

        let is_structured = parser::is_structured(&response.content);
        self.push_history(DialogMessage::assistant(response.content.clone()));

        let decision = RawDecision::new(name.clone(), response.content, Some(snapshot), is_structured);
        let delivered = self
            .bus
            .publish(topics::DECISIONS, BusMessage::Decision(decision.clone()));

        info!(
            agent = %name,
            trigger = trigger.as_str(),
            is_structured,
            delivered,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Decision published"
        );
        Some(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{complete_message, ticker_message, FailingModel, ScriptedModel};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn settings(name: &str) -> AgentSettings {
        AgentSettings {
            name: name.to_string(),
            system_prompt: "SYSTEM".to_string(),
            decision_interval: Duration::from_secs(3600),
            history_len: 3,
            poll_timeout: Duration::from_millis(20),
            drain_timeout: Duration::from_millis(5),
            max_drain: 64,
            model_timeout: Duration::from_secs(5),
            chat: ChatOptions::default(),
        }
    }

    fn agent_with(
        model: Arc<dyn ModelClient>,
        limiter: Arc<RateLimiter>,
    ) -> (TradingAgent, Arc<MessageBus>) {
        let bus = Arc::new(MessageBus::new());
        let agent = TradingAgent::new(settings("alpha"), model, limiter, bus.clone(), None);
        (agent, bus)
    }

    fn open_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new("decision", 100, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn complete_snapshot_triggers_after_backlog() {
        let model = Arc::new(ScriptedModel::new(vec![r#"{"action":"wait"}"#]));
        let (mut agent, bus) = agent_with(model, open_limiter());

        for i in 0..20 {
            bus.publish(topics::MARKET, ticker_message("ETH/USD", dec!(3000) + Decimal::from(i)));
        }
        bus.publish(topics::MARKET, complete_message(&[("BTC/USD", dec!(100000))], None));

        assert_eq!(agent.poll().await, Some(Trigger::CompleteSnapshot));
        assert!(agent.aggregator().snapshot().is_complete);
        assert_eq!(agent.aggregator().snapshot().tickers.len(), 1);
    }

    #[tokio::test]
    async fn dialog_outranks_snapshot_and_is_bounded() {
        let model = Arc::new(ScriptedModel::new(vec![r#"{"action":"wait"}"#]));
        let (mut agent, bus) = agent_with(model, open_limiter());

        bus.publish(topics::MARKET, complete_message(&[("BTC/USD", dec!(100000))], None));
        for i in 0..5 {
            bus.publish(topics::DIALOG, BusMessage::Dialog(DialogMessage::user(format!("note {i}"))));
        }

        assert_eq!(agent.poll().await, Some(Trigger::Dialog));
        let history: Vec<_> = agent.history().map(|m| m.content.clone()).collect();
        assert_eq!(history, vec!["note 2", "note 3", "note 4"]);
    }

    #[tokio::test]
    async fn idle_poll_returns_none() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (mut agent, bus) = agent_with(model, open_limiter());
        bus.publish(topics::MARKET, ticker_message("BTC/USD", dec!(100000)));
        assert_eq!(agent.poll().await, None);
        assert!(agent.aggregator().is_usable());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_trigger_requires_usable_snapshot() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let bus = Arc::new(MessageBus::new());
        let mut s = settings("alpha");
        s.decision_interval = Duration::from_secs(10);
        let mut agent = TradingAgent::new(s, model, open_limiter(), bus.clone(), None);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(agent.poll().await, None);

        bus.publish(topics::MARKET, ticker_message("BTC/USD", dec!(100000)));
        assert_eq!(agent.poll().await, Some(Trigger::Interval));
    }

    #[tokio::test]
    async fn decide_publishes_raw_decision() {
        let text = r#"{"action":"open_long","symbol":"BTCUSDT","position_size_usd":500,"price_ref":100000}"#;
        let model = Arc::new(ScriptedModel::new(vec![text]));
        let (mut agent, bus) = agent_with(model.clone(), open_limiter());
        let mut decisions = bus.subscribe(topics::DECISIONS);

        bus.publish(topics::MARKET, complete_message(&[("BTC/USD", dec!(100000))], None));
        let trigger = agent.poll().await.unwrap();
        let decision = agent.decide(trigger).await.unwrap();

        assert_eq!(decision.agent, "alpha");
        assert!(decision.is_structured);
        assert_eq!(
            decision.market_snapshot.as_ref().unwrap().price_of("BTC/USD"),
            Some(dec!(100000))
        );

        match decisions.receive(Duration::from_millis(50)).await {
            Some(BusMessage::Decision(published)) => assert_eq!(published, decision),
            other => panic!("Expected decision, got {other:?}"),
        }

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].last().unwrap().content.contains("Market Data (BTC/USD):"));
    }

    #[tokio::test]
    async fn limiter_denial_skips_without_model_call() {
        let model = Arc::new(ScriptedModel::new(vec!["hold"; 3]));
        let limiter = Arc::new(RateLimiter::new("decision", 2, Duration::from_secs(60)));
        let (mut agent, _bus) = agent_with(model.clone(), limiter.clone());

        assert!(agent.decide(Trigger::Dialog).await.is_some());
        assert!(agent.decide(Trigger::Dialog).await.is_some());
        assert!(agent.decide(Trigger::Dialog).await.is_none());
        assert_eq!(model.prompts().len(), 2);
        assert!(limiter.wait_time() > Duration::ZERO);
    }

    #[tokio::test]
    async fn model_failure_is_a_skipped_trigger() {
        let (mut agent, bus) = agent_with(Arc::new(FailingModel), open_limiter());
        let mut decisions = bus.subscribe(topics::DECISIONS);
        assert!(agent.decide(Trigger::Interval).await.is_none());
        assert!(decisions.try_receive().is_none());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (agent, _bus) = agent_with(Arc::new(ScriptedModel::new(vec![])), open_limiter());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(agent.run(cancel.clone()));
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "Agent loop did not stop within 1 second");
    }
}
