use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Capital assigned to one agent. `available + used == allocated` holds
/// after every reserve/release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapitalAllocation {
    pub allocated: Decimal,
    pub available: Decimal,
    pub used: Decimal,
}

impl CapitalAllocation {
    pub fn new(allocated: Decimal) -> Self {
        Self {
            allocated,
            available: allocated,
            used: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CapitalSummary {
    pub total_allocated: Decimal,
    pub total_available: Decimal,
    pub total_used: Decimal,
    pub agents: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_allocation_is_fully_available() {
        let allocation = CapitalAllocation::new(dec!(2500));
        assert_eq!(allocation.available, dec!(2500));
        assert_eq!(allocation.used, Decimal::ZERO);
        assert_eq!(allocation.available + allocation.used, allocation.allocated);
    }
}
