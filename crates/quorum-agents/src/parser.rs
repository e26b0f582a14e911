use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use quorum_models::{decimal_from_json, split_pair, ParseOutcome, RawDecision, Side, TradeIntent};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AgentError;

/// Quantity used when an action is recognized without an explicit amount.
pub const DEFAULT_QUANTITY: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

static HOLD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:hold|wait)\b|\bno\s+action\b|\bno\s+trade\b").expect("Invalid regex")
});

static BUY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bbuy\s+\d|\bpurchase\s+\d|\bopen(?:ing)?\s+(?:a\s+)?long\b|\bgo(?:ing)?\s+long\b|\bdecide[sd]?\s+to\s+buy\b|\brecommend\s+buying\b",
    )
    .expect("Invalid regex")
});

static SELL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bsell\s+\d|\bclose\s+(?:the\s+|my\s+)?long\b|\bdecide[sd]?\s+to\s+sell\b|\brecommend\s+selling\b",
    )
    .expect("Invalid regex")
});

static BARE_BUY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bbuy\b").expect("Invalid regex"));

static BARE_SELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsell\b").expect("Invalid regex"));

static SYMBOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(bitcoin|ethereum|solana|dogecoin|btc|eth|sol|bnb|doge)(?:/?usdt?)?\b")
        .expect("Invalid regex")
});

static BUY_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:buy|purchase)\s+(\d+(?:\.\d+)?)").expect("Invalid regex")
});

static SELL_QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsell\s+(\d+(?:\.\d+)?)").expect("Invalid regex"));

static QUANTITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(\d+(?:\.\d+)?)\s*(?:btc|eth|sol|bnb|doge)\b",
        r"\bquantity[:\s]+(\d+(?:\.\d+)?)",
        r"\bamount[:\s]+(\d+(?:\.\d+)?)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid regex"))
    .collect()
});

static PRICE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bat\s+\$?(\d[\d,]*(?:\.\d+)?)",
        r"\bprice[:\s]+\$?(\d[\d,]*(?:\.\d+)?)",
        r"\blimit[:\s]+\$?(\d[\d,]*(?:\.\d+)?)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid regex"))
    .collect()
});

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model response formats:
/// - Clean JSON: `{"action": "wait"}`
/// - Markdown-wrapped: ```json\n{"action": "wait"}\n```
/// - Prefix text: `After reviewing the market:\n{"action": "wait"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    json_candidates(text)
        .into_iter()
        .find(|candidate| serde_json::from_str::<Value>(candidate).is_ok())
        .ok_or_else(|| {
            AgentError::Parse(format!(
                "No valid JSON object found in response (length={})",
                text.len()
            ))
        })
}

/// Every region of the text that could hold a JSON object, in the order
/// they should be tried: the whole text, a fenced block, then each balanced
/// `{ ... }` region by start offset.
fn json_candidates(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let mut candidates = Vec::new();

    if trimmed.starts_with('{') {
        candidates.push(trimmed.to_string());
    }
    if let Some(block) = extract_from_markdown_block(trimmed) {
        candidates.push(block);
    }

    // A brace in prose that never closes must not hide a later payload, so
    // every `{` gets its own scan.
    for (start, _) in trimmed.match_indices('{') {
        if let Some(end) = balanced_end(&trimmed[start..]) {
            candidates.push(trimmed[start..=start + end].to_string());
        }
    }

    candidates
}

/// Extract JSON from a markdown code block (```json ... ``` or ``` ... ```)
fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                let extracted = text[json_start..json_start + end].trim();
                return Some(extracted.to_string());
            }
        }
    }

    None
}

/// Byte offset of the `}` closing the object that opens at the start of
/// `text`, honoring strings. None if it never closes.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Whether the text carries a JSON payload with an `action` field.
pub fn is_structured(text: &str) -> bool {
    structured_payload(text).is_some()
}

/// Parse a published decision.
pub fn parse_raw_decision(decision: &RawDecision) -> ParseOutcome {
    parse_decision(&decision.decision_text, decision.id, decision.timestamp)
}

/// Convert decision text into a trade intent, a no-action result, or an
/// unparsable report.
///
/// A JSON payload with an `action` field is authoritative. Free text is only
/// scanned when no such payload exists.
pub fn parse_decision(
    text: &str,
    source_decision_id: Uuid,
    decided_at: DateTime<Utc>,
) -> ParseOutcome {
    if let Some(fields) = structured_payload(text) {
        return parse_structured(&fields, source_decision_id, decided_at);
    }
    parse_free_text(text, source_decision_id, decided_at)
}

fn structured_payload(text: &str) -> Option<Map<String, Value>> {
    json_candidates(text)
        .iter()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) if map.contains_key("action") => Some(map),
            _ => None,
        })
}

fn parse_structured(
    fields: &Map<String, Value>,
    source_decision_id: Uuid,
    decided_at: DateTime<Utc>,
) -> ParseOutcome {
    let action = match fields.get("action").and_then(Value::as_str) {
        Some(action) => action.trim().to_lowercase(),
        None => return unparsable("action is not a string"),
    };

    let side = match action.as_str() {
        "open_long" | "buy" => Side::Buy,
        "close_long" | "sell" => Side::Sell,
        "wait" | "hold" => {
            let reason = fields
                .get("reason")
                .and_then(Value::as_str)
                .map(|r| format!("{action}: {r}"))
                .unwrap_or_else(|| action.clone());
            return ParseOutcome::NoAction { reason };
        }
        other => return unparsable(format!("unknown action '{other}'")),
    };

    let pair = match fields
        .get("symbol")
        .and_then(Value::as_str)
        .and_then(symbol_to_pair)
    {
        Some(pair) => pair,
        None => return unparsable("missing or unrecognized symbol"),
    };

    let position_size = fields.get("position_size_usd").and_then(decimal_from_json);
    let price_ref = fields.get("price_ref").and_then(decimal_from_json);
    let explicit_quantity = fields.get("quantity").and_then(decimal_from_json);

    let (quantity, assumed_default) = match (position_size, price_ref, explicit_quantity) {
        (Some(amount), Some(price), _) => {
            if price <= Decimal::ZERO {
                return unparsable("price_ref must be positive to size a position");
            }
            match amount.checked_div(price) {
                Some(quantity) => (quantity.normalize(), false),
                None => return unparsable("position size is out of numeric range"),
            }
        }
        (_, _, Some(quantity)) => (quantity, false),
        _ => (DEFAULT_QUANTITY, true),
    };

    let limit_price = fields
        .get("price")
        .and_then(decimal_from_json)
        .or(price_ref);

    ParseOutcome::Intent(TradeIntent {
        side,
        pair,
        quantity,
        limit_price,
        confidence: fields.get("confidence").and_then(decimal_from_json),
        source_decision_id,
        assumed_default,
        decided_at,
    })
}

fn parse_free_text(
    text: &str,
    source_decision_id: Uuid,
    decided_at: DateTime<Utc>,
) -> ParseOutcome {
    let lower = text.to_lowercase();

    let side = if BUY_PATTERN.is_match(&lower) {
        Side::Buy
    } else if SELL_PATTERN.is_match(&lower) {
        Side::Sell
    } else if HOLD_PATTERN.is_match(&lower) {
        return ParseOutcome::NoAction {
            reason: "hold/wait stated in free text".to_string(),
        };
    } else {
        match (BARE_BUY.is_match(&lower), BARE_SELL.is_match(&lower)) {
            (true, false) => Side::Buy,
            (false, true) => Side::Sell,
            (true, true) => return unparsable("both buy and sell mentioned"),
            (false, false) => return unparsable("no trade action found"),
        }
    };

    let pair = match SYMBOL_PATTERN
        .captures(&lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| vocabulary_pair(m.as_str()))
    {
        Some(pair) => pair,
        None => return unparsable("no recognized currency symbol"),
    };

    let side_quantity = match side {
        Side::Buy => &*BUY_QUANTITY,
        Side::Sell => &*SELL_QUANTITY,
    };
    let quantity = first_capture(std::slice::from_ref(side_quantity), &lower)
        .or_else(|| first_capture(&QUANTITY_PATTERNS, &lower));

    let (quantity, assumed_default) = match quantity {
        Some(quantity) => (quantity, false),
        None => (DEFAULT_QUANTITY, true),
    };

    ParseOutcome::Intent(TradeIntent {
        side,
        pair,
        quantity,
        limit_price: first_capture(&PRICE_PATTERNS, &lower),
        confidence: None,
        source_decision_id,
        assumed_default,
        decided_at,
    })
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<Decimal> {
    patterns.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let raw = caps.get(1)?.as_str().replace(',', "");
        raw.parse::<Decimal>().ok()
    })
}

fn vocabulary_pair(word: &str) -> Option<String> {
    let base = match word {
        "btc" | "bitcoin" => "BTC",
        "eth" | "ethereum" => "ETH",
        "sol" | "solana" => "SOL",
        "bnb" => "BNB",
        "doge" | "dogecoin" => "DOGE",
        _ => return None,
    };
    Some(format!("{base}/USD"))
}

const DOLLAR_QUOTES: [&str; 3] = ["USDT", "USDC", "USD"];

/// Dollar stablecoin quotes all map to the `USD` pairs the feed publishes.
fn normalize_quote(quote: &str) -> &str {
    if DOLLAR_QUOTES.contains(&quote) {
        "USD"
    } else {
        quote
    }
}

/// Normalize an exchange symbol to `BASE/QUOTE`.
///
/// `BTCUSDT`, `BTCUSD`, `ETH/USDT` and `btc` become `BTC/USD` style pairs;
/// a non-dollar pair such as `ETH/BTC` is kept. A bare quote currency is
/// not a symbol.
pub fn symbol_to_pair(symbol: &str) -> Option<String> {
    let upper = symbol.trim().to_uppercase();
    if upper.is_empty() || DOLLAR_QUOTES.contains(&upper.as_str()) {
        return None;
    }

    if upper.contains('/') {
        return split_pair(&upper).and_then(|(base, quote)| {
            if DOLLAR_QUOTES.contains(&base) {
                return None;
            }
            Some(format!("{base}/{}", normalize_quote(quote)))
        });
    }

    if !upper.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let base = DOLLAR_QUOTES
        .iter()
        .find_map(|quote| {
            upper
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
        })
        .unwrap_or(upper.as_str());

    if base.len() > 10 {
        return None;
    }
    Some(format!("{base}/USD"))
}

fn unparsable(reason: impl Into<String>) -> ParseOutcome {
    ParseOutcome::Unparsable {
        reason: reason.into(),
    }
}
