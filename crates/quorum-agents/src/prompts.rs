use std::fmt::Write;

use quorum_models::{AgentConfig, CapitalAllocation, ChatRole, MarketSnapshot};

use crate::model::ChatMessage;

/// Maximum trading pairs listed from exchange info.
const MAX_LISTED_PAIRS: usize = 10;

/// Reply format included in every agent system prompt.
fn response_schema() -> String {
    let example = serde_json::json!({
        "action": "open_long | close_long | wait",
        "symbol": "BTCUSDT",
        "position_size_usd": 500,
        "price_ref": 100000,
        "reason": "<one sentence>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

pub fn system_prompt(agent: &AgentConfig) -> String {
    format!(
        "You are {name}, an autonomous crypto trading agent. Several agents trade the same \
         account; each of your decisions is validated before anything reaches the exchange.\n\n\
         ## STRATEGY\n\n\
         {strategy}\n\n\
         ## RISK LEVEL\n\n\
         {risk}. Size positions accordingly and prefer `wait` when signals conflict.\n\n\
         ## RULES\n\n\
         - Use only the market data in the latest message.\n\
         - `open_long` buys, `close_long` sells, `wait` does nothing.\n\
         - Either give `quantity` in base units, or `position_size_usd` together with \
         `price_ref` (the price you sized against).\n\
         - Limit prices more than 10% away from the current price are rejected.\n\n\
         ## OUTPUT FORMAT\n\n\
         Respond ONLY with a JSON object, no other text:\n{schema}",
        name = agent.name,
        strategy = agent.strategy,
        risk = agent.risk_level,
        schema = response_schema(),
    )
}

/// Render a snapshot as prompt text.
pub fn format_snapshot(snapshot: &MarketSnapshot) -> String {
    let mut out = String::new();

    if snapshot.tickers.is_empty() {
        out.push_str("No market data available yet.\n");
    }

    for (pair, ticker) in &snapshot.tickers {
        let _ = writeln!(out, "Market Data ({pair}):");
        if let Some(price) = ticker.price {
            let _ = writeln!(out, "  Current Price: ${price}");
        }
        if let Some(change) = ticker.change_24h {
            let _ = writeln!(out, "  24h Change: {change}%");
        }
        if let (Some(low), Some(high)) = (ticker.low_24h, ticker.high_24h) {
            let _ = writeln!(out, "  24h Range: ${low} - ${high}");
        }
        if let Some(volume) = ticker.volume_24h {
            let _ = writeln!(out, "  24h Volume: {volume}");
        }
        if let Some(indicators) = &ticker.indicators {
            let _ = writeln!(out, "  Indicators: {indicators}");
        }
    }

    if let Some(balance) = &snapshot.balance {
        out.push_str("\nAccount Balance:\n");
        if let Some(available) = balance.available {
            let _ = writeln!(out, "  Available: ${available}");
        }
        if let Some(total) = balance.total {
            let _ = writeln!(out, "  Total: ${total}");
        }
        for (currency, amounts) in &balance.currencies {
            if amounts.total.is_zero() && amounts.available.is_zero() {
                continue;
            }
            let _ = writeln!(
                out,
                "  {currency}: {} available, {} locked",
                amounts.available, amounts.locked
            );
        }
    }

    if let Some(info) = &snapshot.exchange_info {
        if !info.trade_pairs.is_empty() {
            let listed: Vec<&str> = info
                .trade_pairs
                .iter()
                .take(MAX_LISTED_PAIRS)
                .map(String::as_str)
                .collect();
            let _ = writeln!(out, "\nAvailable Trading Pairs: {}", listed.join(", "));
        }
    }

    let _ = writeln!(
        out,
        "\nSnapshot time: {} ({})",
        snapshot.timestamp.to_rfc3339(),
        if snapshot.is_complete { "complete" } else { "partial" }
    );
    out
}

pub fn capital_context(allocation: &CapitalAllocation) -> String {
    format!(
        "Your capital: allocated ${}, available ${}, in use ${}.",
        allocation.allocated, allocation.available, allocation.used
    )
}

/// Assemble the message list for one decision request: system role, the
/// trailing dialog turns, then the market context.
pub fn build_messages<'a>(
    system_prompt: &str,
    history: impl IntoIterator<Item = &'a ChatMessage>,
    snapshot: &MarketSnapshot,
    capital: Option<&CapitalAllocation>,
    trigger_note: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage {
        role: ChatRole::System,
        content: system_prompt.to_string(),
    }];
    messages.extend(history.into_iter().cloned());

    let mut context = format_snapshot(snapshot);
    if let Some(allocation) = capital {
        context.push('\n');
        context.push_str(&capital_context(allocation));
        context.push('\n');
    }
    let _ = write!(context, "\nTrigger: {trigger_note}. What is your decision?");

    messages.push(ChatMessage::user(context));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quorum_models::{
        AccountBalance, CurrencyBalance, ExchangeInfo, TickerData,
    };
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn agent() -> AgentConfig {
        AgentConfig {
            name: "momentum".to_string(),
            strategy: "Ride strong trends".to_string(),
            risk_level: "high".to_string(),
            model: None,
            enabled: true,
        }
    }

    fn snapshot() -> MarketSnapshot {
        let mut ticker = TickerData::new("BTC/USD", dec!(100000));
        ticker.change_24h = Some(dec!(2.5));
        ticker.low_24h = Some(dec!(97000));
        ticker.high_24h = Some(dec!(101000));

        let mut currencies = BTreeMap::new();
        currencies.insert(
            "USD".to_string(),
            CurrencyBalance {
                available: dec!(5000),
                locked: dec!(0),
                total: dec!(5000),
            },
        );
        currencies.insert("DOGE".to_string(), CurrencyBalance::default());

        let mut snapshot = MarketSnapshot::empty();
        snapshot.tickers.insert("BTC/USD".to_string(), ticker);
        snapshot.balance = Some(AccountBalance {
            total: Some(dec!(5000)),
            available: Some(dec!(5000)),
            currencies,
            timestamp: Utc::now(),
        });
        snapshot.exchange_info = Some(ExchangeInfo {
            trade_pairs: (0..15).map(|i| format!("P{i}/USD")).collect(),
            timestamp: Utc::now(),
        });
        snapshot
    }

    #[test]
    fn system_prompt_carries_identity_and_schema() {
        let prompt = system_prompt(&agent());
        assert!(prompt.contains("You are momentum"));
        assert!(prompt.contains("Ride strong trends"));
        assert!(prompt.contains("high"));
        assert!(prompt.contains("\"position_size_usd\""));
        assert!(prompt.contains("## OUTPUT FORMAT"));
    }

    #[test]
    fn snapshot_text_sections() {
        let text = format_snapshot(&snapshot());
        assert!(text.contains("Market Data (BTC/USD):"));
        assert!(text.contains("Current Price: $100000"));
        assert!(text.contains("24h Change: 2.5%"));
        assert!(text.contains("24h Range: $97000 - $101000"));
        assert!(text.contains("Account Balance:"));
        assert!(text.contains("USD: 5000 available"));
        assert!(!text.contains("DOGE:"));
        assert!(text.contains("P9/USD"));
        assert!(!text.contains("P10/USD"));
        assert!(text.contains("partial"));
    }

    #[test]
    fn empty_snapshot_is_described() {
        let text = format_snapshot(&MarketSnapshot::empty());
        assert!(text.contains("No market data available yet."));
    }

    #[test]
    fn messages_in_order_with_capital() {
        let history = vec![
            ChatMessage::user("Focus on BTC."),
            ChatMessage::assistant(r#"{"action":"wait"}"#),
        ];
        let allocation = CapitalAllocation::new(dec!(2500));
        let messages = build_messages(
            "SYSTEM",
            &history,
            &snapshot(),
            Some(&allocation),
            "complete snapshot",
        );

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].content, "Focus on BTC.");
        assert_eq!(messages[2].role, ChatRole::Assistant);
        let last = &messages[3];
        assert_eq!(last.role, ChatRole::User);
        assert!(last.content.contains("allocated $2500"));
        assert!(last.content.contains("Trigger: complete snapshot."));
    }
}
