use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

/// Read a decimal from a JSON number or numeric string.
///
/// Model output and feed files carry plain JSON numbers, which the
/// string-serialized `Decimal` impl does not accept directly.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => {
            let trimmed = s.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .ok()
        }
        _ => None,
    }
}
