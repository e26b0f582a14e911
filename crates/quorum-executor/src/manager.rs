use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use quorum_models::{
    split_pair, AccountBalance, ConsensusIntent, ConsensusOutcome, DecisionRecord,
    DecisionStatistics, ExecutionOutcome, ExecutorConfig, RawDecision, Side, TradeIntent,
};
use quorum_store::{DecisionRecorder, StoreError};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Why an intent was refused before reaching the exchange. The `Display`
/// text is what gets recorded on the decision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("quantity {quantity} exceeds ceiling {max}")]
    QuantityAboveCeiling { quantity: Decimal, max: Decimal },

    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("price {price} deviates {deviation_percent}% from current {current}, band is {band_percent}%")]
    PriceOutOfBand {
        price: Decimal,
        current: Decimal,
        deviation_percent: Decimal,
        band_percent: Decimal,
    },

    #[error("decision is stale: {age_secs}s old, limit {max_secs}s")]
    Stale { age_secs: i64, max_secs: i64 },

    #[error("insufficient {currency} balance: need {needed}, available {available}")]
    InsufficientBalance {
        currency: String,
        needed: Decimal,
        available: Decimal,
    },

    #[error("{0} is out of numeric range")]
    OutOfRange(&'static str),

    #[error("insufficient capital for {agent}: need {needed}, available {available}")]
    InsufficientCapital {
        agent: String,
        needed: Decimal,
        available: Decimal,
    },
}

/// Bounds applied by [`DecisionManager::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationLimits {
    pub max_quantity: Decimal,
    pub price_band_percent: Decimal,
    pub decision_timeout: Duration,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_quantity: Decimal::from(1000),
            price_band_percent: Decimal::from(10),
            decision_timeout: Duration::seconds(5),
        }
    }
}

impl ValidationLimits {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_quantity: Decimal::from_f64(config.max_quantity).unwrap_or(defaults.max_quantity),
            price_band_percent: Decimal::from_f64(config.price_band_percent)
                .unwrap_or(defaults.price_band_percent),
            decision_timeout: Duration::seconds(config.decision_timeout_seconds as i64),
        }
    }
}

/// Persistence, validation and consensus for incoming decisions.
pub struct DecisionManager {
    recorder: Arc<DecisionRecorder>,
    limits: ValidationLimits,
}

impl DecisionManager {
    pub fn new(recorder: Arc<DecisionRecorder>, limits: ValidationLimits) -> Self {
        Self { recorder, limits }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    pub fn recorder(&self) -> &Arc<DecisionRecorder> {
        &self.recorder
    }

    pub fn record_received(&self, decision: &RawDecision) -> Result<i64, StoreError> {
        self.recorder.record_received(decision)
    }

    pub fn record_outcome(&self, id: i64, outcome: &ExecutionOutcome) -> Result<(), StoreError> {
        self.recorder.record_outcome(id, outcome)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<DecisionRecord>, StoreError> {
        self.recorder.recent(limit)
    }

    pub fn statistics(&self, hours: i64) -> Result<DecisionStatistics, StoreError> {
        self.recorder.statistics(hours)
    }

    /// Check an intent against quantity, price, freshness and balance bounds.
    ///
    /// `current_price` and `balance` come from the snapshot the decision was
    /// made on; when either is absent the corresponding check is skipped.
    pub fn validate(
        &self,
        intent: &TradeIntent,
        current_price: Option<Decimal>,
        balance: Option<&AccountBalance>,
        now: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        if intent.quantity <= Decimal::ZERO {
            return Err(Rejection::NonPositiveQuantity(intent.quantity));
        }
        if intent.quantity > self.limits.max_quantity {
            return Err(Rejection::QuantityAboveCeiling {
                quantity: intent.quantity,
                max: self.limits.max_quantity,
            });
        }
        if let Some(price) = intent.limit_price {
            if price <= Decimal::ZERO {
                return Err(Rejection::NonPositivePrice(price));
            }
        }

        let age = now - intent.decided_at;
        if age > self.limits.decision_timeout {
            return Err(Rejection::Stale {
                age_secs: age.num_seconds(),
                max_secs: self.limits.decision_timeout.num_seconds(),
            });
        }

        if let (Some(price), Some(current)) = (intent.limit_price, current_price) {
            if current > Decimal::ZERO {
                let deviation_percent = (price - current)
                    .abs()
                    .checked_div(current)
                    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                    .ok_or(Rejection::OutOfRange("price deviation"))?;
                if deviation_percent > self.limits.price_band_percent {
                    return Err(Rejection::PriceOutOfBand {
                        price,
                        current,
                        deviation_percent: deviation_percent.round_dp(4),
                        band_percent: self.limits.price_band_percent,
                    });
                }
            }
        }

        if let Some(balance) = balance {
            check_balance(intent, intent.limit_price.or(current_price), balance)?;
        }

        Ok(())
    }

    /// Majority vote over the intents decided within `window` of `now`.
    pub fn consensus(
        &self,
        intents: &[TradeIntent],
        window: Duration,
        now: DateTime<Utc>,
    ) -> ConsensusOutcome {
        consensus(intents, window, now)
    }
}

/// Notional value of an order, refused rather than overflowing.
pub fn order_cost(quantity: Decimal, price: Decimal) -> Result<Decimal, Rejection> {
    quantity
        .checked_mul(price)
        .ok_or(Rejection::OutOfRange("order cost"))
}

fn check_balance(
    intent: &TradeIntent,
    price: Option<Decimal>,
    balance: &AccountBalance,
) -> Result<(), Rejection> {
    let Some((base, quote)) = split_pair(&intent.pair) else {
        return Ok(());
    };

    let (currency, needed) = match intent.side {
        Side::Buy => match price {
            Some(price) => (quote, order_cost(intent.quantity, price)?),
            None => return Ok(()),
        },
        Side::Sell => (base, intent.quantity),
    };

    match balance.available_of(currency) {
        Some(available) if available < needed => Err(Rejection::InsufficientBalance {
            currency: currency.to_string(),
            needed,
            available,
        }),
        _ => Ok(()),
    }
}

/// Reconcile intents by majority side.
///
/// Only intents with `decided_at` inside the window count. Fewer than two
/// yields `Insufficient`; equal BUY and SELL counts yield `Tie`. Quantity is
/// the mean over the majority, limit price the mean over majority intents
/// that carried one.
pub fn consensus(intents: &[TradeIntent], window: Duration, now: DateTime<Utc>) -> ConsensusOutcome {
    let since = now - window;
    let in_window: Vec<&TradeIntent> = intents.iter().filter(|i| i.decided_at >= since).collect();
    if in_window.len() < 2 {
        return ConsensusOutcome::Insufficient {
            observed: in_window.len(),
        };
    }

    let buys = in_window.iter().filter(|i| i.side == Side::Buy).count();
    let sells = in_window.len() - buys;
    let side = match buys.cmp(&sells) {
        std::cmp::Ordering::Greater => Side::Buy,
        std::cmp::Ordering::Less => Side::Sell,
        std::cmp::Ordering::Equal => return ConsensusOutcome::Tie { buys, sells },
    };

    let majority: Vec<&TradeIntent> = in_window.iter().copied().filter(|i| i.side == side).collect();
    let quantity = mean(majority.iter().map(|i| i.quantity));
    let prices: Vec<Decimal> = majority.iter().filter_map(|i| i.limit_price).collect();
    let limit_price = (!prices.is_empty()).then(|| mean(prices.into_iter()));

    ConsensusOutcome::Reached(ConsensusIntent {
        side,
        pair: majority[0].pair.clone(),
        quantity,
        limit_price,
        agreeing: majority.len(),
        total: in_window.len(),
        source_decision_ids: majority.iter().map(|i| i.source_decision_id).collect(),
        decided_at: majority
            .iter()
            .map(|i| i.decided_at)
            .max()
            .unwrap_or(now),
    })
}

fn mean(values: impl Iterator<Item = Decimal>) -> Decimal {
    let values: Vec<Decimal> = values.collect();
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let count = Decimal::from(values.len());
    let exact = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .map(|sum| sum / count);
    // Agent-supplied magnitudes can overflow the plain sum.
    exact
        .unwrap_or_else(|| {
            values.iter().fold(Decimal::ZERO, |acc, v| {
                acc.checked_add(v / count).unwrap_or(Decimal::MAX)
            })
        })
        .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_models::CurrencyBalance;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn manager() -> DecisionManager {
        DecisionManager::new(
            Arc::new(DecisionRecorder::in_memory().unwrap()),
            ValidationLimits::default(),
        )
    }

    fn intent(side: Side, quantity: Decimal, price: Option<Decimal>) -> TradeIntent {
        TradeIntent {
            side,
            pair: "BTC/USD".to_string(),
            quantity,
            limit_price: price,
            confidence: None,
            source_decision_id: Uuid::new_v4(),
            assumed_default: false,
            decided_at: Utc::now(),
        }
    }

    fn balance(usd: Decimal, btc: Decimal) -> AccountBalance {
        let mut currencies = BTreeMap::new();
        for (code, amount) in [("USD", usd), ("BTC", btc)] {
            currencies.insert(
                code.to_string(),
                CurrencyBalance {
                    available: amount,
                    locked: Decimal::ZERO,
                    total: amount,
                },
            );
        }
        AccountBalance {
            total: None,
            available: None,
            currencies,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn accepts_reasonable_intent() {
        let m = manager();
        let i = intent(Side::Buy, dec!(0.005), Some(dec!(100000)));
        assert_eq!(m.validate(&i, Some(dec!(101000)), None, Utc::now()), Ok(()));
    }

    #[test]
    fn rejects_non_positive_quantity_with_reason() {
        let m = manager();
        for quantity in [dec!(0), dec!(-1)] {
            let err = m
                .validate(&intent(Side::Buy, quantity, None), None, None, Utc::now())
                .unwrap_err();
            assert!(matches!(err, Rejection::NonPositiveQuantity(_)));
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn rejects_quantity_above_ceiling() {
        let err = manager()
            .validate(&intent(Side::Sell, dec!(1000.5), None), None, None, Utc::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "quantity 1000.5 exceeds ceiling 1000");
    }

    #[test]
    fn rejects_non_positive_price() {
        let err = manager()
            .validate(&intent(Side::Buy, dec!(1), Some(dec!(0))), None, None, Utc::now())
            .unwrap_err();
        assert_eq!(err, Rejection::NonPositivePrice(dec!(0)));
    }

    #[test]
    fn rejects_price_outside_band() {
        let m = manager();
        let i = intent(Side::Buy, dec!(0.01), Some(dec!(111000)));
        let err = m.validate(&i, Some(dec!(100000)), None, Utc::now()).unwrap_err();
        assert!(matches!(err, Rejection::PriceOutOfBand { .. }));

        let edge = intent(Side::Buy, dec!(0.01), Some(dec!(110000)));
        assert!(m.validate(&edge, Some(dec!(100000)), None, Utc::now()).is_ok());
    }

    #[test]
    fn band_is_not_loosened_by_rounding() {
        let m = manager();
        let just_past = intent(Side::Buy, dec!(0.01), Some(dec!(110004)));
        match m.validate(&just_past, Some(dec!(100000)), None, Utc::now()) {
            Err(Rejection::PriceOutOfBand { deviation_percent, .. }) => {
                assert_eq!(deviation_percent, dec!(10.004));
            }
            other => panic!("Expected PriceOutOfBand, got {other:?}"),
        }
    }

    #[test]
    fn extreme_price_against_tiny_current_is_refused() {
        let i = intent(Side::Buy, dec!(1), Some(Decimal::MAX));
        let err = manager()
            .validate(&i, Some(dec!(0.0000001)), None, Utc::now())
            .unwrap_err();
        assert_eq!(err, Rejection::OutOfRange("price deviation"));
        assert_eq!(err.to_string(), "price deviation is out of numeric range");
    }

    #[test]
    fn extreme_order_cost_is_refused_by_balance_check() {
        let i = intent(Side::Buy, dec!(1000), Some(Decimal::MAX));
        let err = manager()
            .validate(&i, None, Some(&balance(dec!(1), dec!(1))), Utc::now())
            .unwrap_err();
        assert_eq!(err, Rejection::OutOfRange("order cost"));
        assert!(order_cost(dec!(2), dec!(3)).is_ok());
    }

    #[test]
    fn rejects_stale_decision() {
        let mut i = intent(Side::Buy, dec!(0.01), None);
        i.decided_at = Utc::now() - Duration::seconds(10);
        let err = manager().validate(&i, None, None, Utc::now()).unwrap_err();
        assert!(matches!(err, Rejection::Stale { max_secs: 5, .. }));
        assert!(err.to_string().contains("stale"));
    }

    #[test]
    fn checks_quote_balance_for_buys_and_base_for_sells() {
        let m = manager();
        let b = balance(dec!(400), dec!(0.1));

        let buy = intent(Side::Buy, dec!(0.005), Some(dec!(100000)));
        let err = m.validate(&buy, None, Some(&b), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            Rejection::InsufficientBalance {
                currency: "USD".to_string(),
                needed: dec!(500),
                available: dec!(400),
            }
        );

        let sell = intent(Side::Sell, dec!(0.05), None);
        assert!(m.validate(&sell, Some(dec!(100000)), Some(&b), Utc::now()).is_ok());
        let oversell = intent(Side::Sell, dec!(0.2), None);
        assert!(m.validate(&oversell, None, Some(&b), Utc::now()).is_err());
    }

    #[test]
    fn missing_currency_skips_balance_check() {
        let mut i = intent(Side::Buy, dec!(1), Some(dec!(3000)));
        i.pair = "ETH/EUR".to_string();
        let b = balance(dec!(0), dec!(0));
        assert!(manager().validate(&i, None, Some(&b), Utc::now()).is_ok());
    }

    #[test]
    fn limits_from_config() {
        let config = ExecutorConfig {
            max_quantity: 2.5,
            price_band_percent: 5.0,
            decision_timeout_seconds: 30,
            ..ExecutorConfig::default()
        };
        let limits = ValidationLimits::from_config(&config);
        assert_eq!(limits.max_quantity, dec!(2.5));
        assert_eq!(limits.price_band_percent, dec!(5));
        assert_eq!(limits.decision_timeout, Duration::seconds(30));
    }

    #[test]
    fn consensus_majority_means_quantities() {
        let now = Utc::now();
        let intents = vec![
            intent(Side::Buy, dec!(0.01), Some(dec!(100000))),
            intent(Side::Buy, dec!(0.03), Some(dec!(102000))),
            intent(Side::Sell, dec!(0.5), Some(dec!(99000))),
        ];
        match consensus(&intents, Duration::seconds(2), now) {
            ConsensusOutcome::Reached(c) => {
                assert_eq!(c.side, Side::Buy);
                assert_eq!(c.quantity, dec!(0.02));
                assert_eq!(c.limit_price, Some(dec!(101000)));
                assert_eq!(c.agreeing, 2);
                assert_eq!(c.total, 3);
                assert_eq!(
                    c.source_decision_ids,
                    vec![intents[0].source_decision_id, intents[1].source_decision_id]
                );
            }
            other => panic!("Expected consensus, got {other:?}"),
        }
    }

    #[test]
    fn consensus_tie_is_explicit() {
        let intents = vec![
            intent(Side::Buy, dec!(1), None),
            intent(Side::Sell, dec!(1), None),
        ];
        assert_eq!(
            consensus(&intents, Duration::seconds(2), Utc::now()),
            ConsensusOutcome::Tie { buys: 1, sells: 1 }
        );
    }

    #[test]
    fn consensus_ignores_intents_outside_window() {
        let now = Utc::now();
        let mut old = intent(Side::Sell, dec!(1), None);
        old.decided_at = now - Duration::seconds(30);
        let intents = vec![old, intent(Side::Buy, dec!(1), None)];
        assert_eq!(
            consensus(&intents, Duration::seconds(2), now),
            ConsensusOutcome::Insufficient { observed: 1 }
        );
    }

    #[test]
    fn consensus_without_prices_has_no_limit() {
        let intents = vec![
            intent(Side::Sell, dec!(1), None),
            intent(Side::Sell, dec!(3), None),
        ];
        match manager().consensus(&intents, Duration::seconds(2), Utc::now()) {
            ConsensusOutcome::Reached(c) => {
                assert_eq!(c.side, Side::Sell);
                assert_eq!(c.quantity, dec!(2));
                assert_eq!(c.limit_price, None);
                assert_eq!(c.agreement_ratio(), Decimal::ONE);
            }
            other => panic!("Expected consensus, got {other:?}"),
        }
    }

    #[test]
    fn consensus_with_huge_quantities_does_not_overflow() {
        let intents = vec![
            intent(Side::Buy, Decimal::MAX, None),
            intent(Side::Buy, Decimal::MAX, None),
        ];
        match consensus(&intents, Duration::seconds(2), Utc::now()) {
            ConsensusOutcome::Reached(c) => assert!(c.quantity > dec!(1000)),
            other => panic!("Expected consensus, got {other:?}"),
        }
    }

    #[test]
    fn persistence_passes_through_to_recorder() {
        let m = manager();
        let decision = RawDecision::new("alpha", "hold", None, false);
        let id = m.record_received(&decision).unwrap();
        m.record_outcome(id, &ExecutionOutcome::skipped("no action: hold"))
            .unwrap();
        let stats = m.statistics(1).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(m.recent(5).unwrap()[0].agent, "alpha");
    }
}
