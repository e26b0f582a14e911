use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quorum_agents::parser::parse_raw_decision;
use quorum_agents::{CapitalManager, MessageBus, RateLimiter, Subscription};
use quorum_models::{
    topics, BusMessage, ConsensusOutcome, ExecutionOutcome, ExecutorConfig, ParseOutcome,
    RawDecision, Side, TradeIntent,
};
use quorum_store::{CachedDecision, DecisionCache};
use rust_decimal::Decimal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ExecutionError;
use crate::exchange::{Exchange, OrderRequest};
use crate::manager::{order_cost, DecisionManager, Rejection};

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub consensus_enabled: bool,
    pub consensus_window: Duration,
    pub order_cooldown: Duration,
    pub order_timeout: Duration,
    pub poll_timeout: Duration,
    pub cache_capacity: u64,
}

impl ExecutorSettings {
    pub fn from_config(config: &ExecutorConfig, cache_capacity: u64) -> Self {
        Self {
            consensus_enabled: config.consensus_enabled,
            consensus_window: Duration::from_secs(config.consensus_window_seconds),
            order_cooldown: Duration::from_secs(config.order_cooldown_seconds),
            order_timeout: Duration::from_secs(config.order_timeout_seconds),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            cache_capacity,
        }
    }
}

/// Consumes raw decisions and turns them into recorded order outcomes.
pub struct TradeExecutor {
    settings: ExecutorSettings,
    manager: DecisionManager,
    exchange: Arc<dyn Exchange>,
    decisions: Subscription,
    order_limiter: RateLimiter,
    capital: Option<Arc<CapitalManager>>,
    cache: Option<DecisionCache>,
}

impl TradeExecutor {
    /// Subscribes to the decisions topic immediately.
    pub fn new(
        settings: ExecutorSettings,
        manager: DecisionManager,
        exchange: Arc<dyn Exchange>,
        bus: &MessageBus,
        capital: Option<Arc<CapitalManager>>,
    ) -> Self {
        let cache = settings
            .consensus_enabled
            .then(|| DecisionCache::new(settings.cache_capacity, settings.consensus_window));
        let order_limiter = RateLimiter::new("order", 1, settings.order_cooldown);
        Self {
            decisions: bus.subscribe(topics::DECISIONS),
            settings,
            manager,
            exchange,
            order_limiter,
            capital,
            cache,
        }
    }

    pub fn manager(&self) -> &DecisionManager {
        &self.manager
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            exchange = self.exchange.name(),
            consensus = self.settings.consensus_enabled,
            "Trade executor starting"
        );

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = self.decisions.receive(self.settings.poll_timeout) => message,
            };

            match message {
                Some(BusMessage::Decision(decision)) => {
                    self.process(decision).await;
                }
                Some(_) => debug!("Ignoring non-decision message on decisions topic"),
                None => {}
            }
        }

        info!("Trade executor shutting down");
    }

    /// Handle one decision end to end and return the outcome that was
    /// recorded for it. Never fails: every error becomes a status.
    pub async fn process(&mut self, decision: RawDecision) -> ExecutionOutcome {
        let start = Instant::now();

        // 1. Persist on receipt
        let record_id = match self.manager.record_received(&decision) {
            Ok(id) => Some(id),
            Err(e) => {
                error!(agent = %decision.agent, error = %e, "Failed to record decision");
                None
            }
        };

        // 2. Parse, and remember the result for consensus
        let parsed = parse_raw_decision(&decision);
        if let Some(cache) = &self.cache {
            cache
                .insert(CachedDecision {
                    record_id,
                    decision: Arc::new(decision.clone()),
                    intent: parsed.intent().cloned(),
                })
                .await;
        }

        // 3. Validate and submit
        let outcome = match parsed {
            ParseOutcome::NoAction { reason } => {
                debug!(agent = %decision.agent, reason = %reason, "No action");
                ExecutionOutcome::skipped(format!("no action: {reason}"))
            }
            ParseOutcome::Unparsable { reason } => {
                warn!(agent = %decision.agent, reason = %reason, "Unparsable decision");
                ExecutionOutcome::failed(format!("unparsable decision: {reason}"))
            }
            ParseOutcome::Intent(intent) => self.execute(intent, &decision).await,
        };
        let outcome = outcome.with_execution_ms(start.elapsed().as_millis() as i64);

        // 4. Finalize exactly once
        if let Some(id) = record_id {
            if let Err(e) = self.manager.record_outcome(id, &outcome) {
                error!(id, error = %e, "Failed to record outcome");
            }
        }

        info!(
            agent = %decision.agent,
            status = %outcome.status,
            order_id = ?outcome.order_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Decision processed"
        );
        outcome
    }

    async fn execute(&self, intent: TradeIntent, decision: &RawDecision) -> ExecutionOutcome {
        let intent = self.reconcile(intent, decision).await;

        let snapshot = decision.market_snapshot.as_ref();
        let current_price = snapshot.and_then(|s| s.price_of(&intent.pair));
        let balance = snapshot.and_then(|s| s.balance.as_ref());

        if let Err(rejection) = self.manager.validate(&intent, current_price, balance, Utc::now()) {
            warn!(agent = %decision.agent, pair = %intent.pair, reason = %rejection, "Intent rejected");
            return ExecutionOutcome::failed(rejection.to_string());
        }

        if !self.order_limiter.can_call() {
            let wait = self.order_limiter.wait_time();
            let retry_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            warn!(agent = %decision.agent, retry_secs, "Order skipped: cooldown");
            return ExecutionOutcome::skipped(format!("rate limited: retry in {retry_secs}s"));
        }

        let reserved = match self.reserve_capital(&intent, &decision.agent, current_price) {
            Ok(reserved) => reserved,
            Err(rejection) => {
                warn!(agent = %decision.agent, reason = %rejection, "Intent rejected");
                return ExecutionOutcome::failed(rejection.to_string());
            }
        };

        let order = OrderRequest::from(&intent);
        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.settings.order_timeout,
            self.exchange.place_order(&order),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.settings.order_timeout.as_secs())),
        };

        match result {
            Ok(placed) => {
                self.order_limiter.record_call();
                info!(
                    agent = %decision.agent,
                    order_id = %placed.order_id,
                    pair = %order.pair,
                    side = %order.side,
                    quantity = %order.quantity,
                    "Order placed"
                );
                ExecutionOutcome::success(placed.order_id, start.elapsed().as_millis() as i64)
            }
            Err(e) => {
                if let (Some(capital), Some(amount)) = (&self.capital, reserved) {
                    capital.release(&decision.agent, amount);
                }
                warn!(agent = %decision.agent, pair = %order.pair, error = %e, "Order failed");
                ExecutionOutcome::failed(e.to_string())
            }
        }
    }

    /// Replace `intent` with a consensus over recent same-pair intents when
    /// one is reached; otherwise keep it.
    async fn reconcile(&self, intent: TradeIntent, decision: &RawDecision) -> TradeIntent {
        let Some(cache) = &self.cache else {
            return intent;
        };

        let now = Utc::now();
        let window = chrono::Duration::from_std(self.settings.consensus_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(2));
        let candidates = cache.intents_since(now - window, Some(&intent.pair));

        match self.manager.consensus(&candidates, window, now) {
            ConsensusOutcome::Reached(consensus) => {
                info!(
                    pair = %consensus.pair,
                    side = %consensus.side,
                    agreeing = consensus.agreeing,
                    total = consensus.total,
                    "Consensus reached"
                );
                consensus.to_intent(decision.id)
            }
            other => {
                debug!(pair = %intent.pair, outcome = ?other, "No consensus, using single intent");
                intent
            }
        }
    }

    /// Reserve capital for BUY intents of agents that have an allocation.
    /// Returns the reserved amount, if any.
    fn reserve_capital(
        &self,
        intent: &TradeIntent,
        agent: &str,
        current_price: Option<Decimal>,
    ) -> Result<Option<Decimal>, Rejection> {
        let Some(capital) = &self.capital else {
            return Ok(None);
        };
        if intent.side != Side::Buy {
            return Ok(None);
        }
        let Some(allocation) = capital.allocation(agent) else {
            return Ok(None);
        };
        let Some(price) = intent.limit_price.or(current_price) else {
            return Ok(None);
        };

        let amount = order_cost(intent.quantity, price)?;
        if capital.reserve(agent, amount) {
            Ok(Some(amount))
        } else {
            Err(Rejection::InsufficientCapital {
                agent: agent.to_string(),
                needed: amount,
                available: allocation.available,
            })
        }
    }
}
