use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use quorum_models::{CapitalAllocation, CapitalSummary};
use rust_decimal::Decimal;

/// Per-agent capital bookkeeping shared by agents (prompt context) and the
/// executor (reserve before submitting, release on failure).
///
/// All mutations happen under one lock, so `reserve` is atomic with respect
/// to concurrent callers.
#[derive(Debug, Default)]
pub struct CapitalManager {
    allocations: Mutex<HashMap<String, CapitalAllocation>>,
}

impl CapitalManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocations(&self) -> MutexGuard<'_, HashMap<String, CapitalAllocation>> {
        self.allocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign `amount` to `agent`, replacing any previous allocation.
    pub fn allocate(&self, agent: &str, amount: Decimal) {
        self.allocations()
            .insert(agent.to_string(), CapitalAllocation::new(amount));
        tracing::info!(agent, amount = %amount, "Capital allocated");
    }

    /// Split `total` equally across `agents`.
    pub fn allocate_equal<S: AsRef<str>>(&self, agents: &[S], total: Decimal) {
        if agents.is_empty() {
            return;
        }
        let share = total / Decimal::from(agents.len() as u64);
        for agent in agents {
            self.allocate(agent.as_ref(), share);
        }
    }

    /// Move `amount` from available to used. Returns false (and changes
    /// nothing) when the agent has no allocation or not enough available.
    pub fn reserve(&self, agent: &str, amount: Decimal) -> bool {
        if amount <= Decimal::ZERO {
            return false;
        }
        let mut allocations = self.allocations();
        match allocations.get_mut(agent) {
            Some(allocation) if allocation.available >= amount => {
                allocation.available -= amount;
                allocation.used += amount;
                true
            }
            _ => false,
        }
    }

    /// Return up to `amount` of used capital to available.
    pub fn release(&self, agent: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        let mut allocations = self.allocations();
        if let Some(allocation) = allocations.get_mut(agent) {
            let released = amount.min(allocation.used);
            allocation.used -= released;
            allocation.available += released;
        }
    }

    pub fn allocation(&self, agent: &str) -> Option<CapitalAllocation> {
        self.allocations().get(agent).cloned()
    }

    pub fn summary(&self) -> CapitalSummary {
        let allocations = self.allocations();
        allocations.values().fold(
            CapitalSummary {
                agents: allocations.len(),
                ..CapitalSummary::default()
            },
            |mut summary, a| {
                summary.total_allocated += a.allocated;
                summary.total_available += a.available;
                summary.total_used += a.used;
                summary
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn assert_balanced(allocation: &CapitalAllocation) {
        assert_eq!(allocation.available + allocation.used, allocation.allocated);
    }

    #[test]
    fn reserve_and_release_keep_invariant() {
        let capital = CapitalManager::new();
        capital.allocate("momentum", dec!(1000));

        assert!(capital.reserve("momentum", dec!(400)));
        let a = capital.allocation("momentum").unwrap();
        assert_eq!(a.available, dec!(600));
        assert_eq!(a.used, dec!(400));
        assert_balanced(&a);

        assert!(!capital.reserve("momentum", dec!(700)));
        assert_balanced(&capital.allocation("momentum").unwrap());

        capital.release("momentum", dec!(1000));
        let a = capital.allocation("momentum").unwrap();
        assert_eq!(a.available, dec!(1000));
        assert_eq!(a.used, Decimal::ZERO);
    }

    #[test]
    fn unknown_agent_or_bad_amount_is_refused() {
        let capital = CapitalManager::new();
        assert!(!capital.reserve("ghost", dec!(1)));
        capital.allocate("a", dec!(10));
        assert!(!capital.reserve("a", dec!(0)));
        assert!(!capital.reserve("a", dec!(-5)));
    }

    #[test]
    fn equal_split_and_summary() {
        let capital = CapitalManager::new();
        capital.allocate_equal(&["a", "b", "c", "d"], dec!(10000));
        assert_eq!(capital.allocation("c").unwrap().allocated, dec!(2500));

        capital.reserve("a", dec!(500));
        let summary = capital.summary();
        assert_eq!(summary.agents, 4);
        assert_eq!(summary.total_allocated, dec!(10000));
        assert_eq!(summary.total_used, dec!(500));
        assert_eq!(summary.total_available, dec!(9500));
    }

    #[test]
    fn concurrent_reservations_never_overdraw() {
        let capital = Arc::new(CapitalManager::new());
        capital.allocate("a", dec!(100));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let capital = capital.clone();
                std::thread::spawn(move || capital.reserve("a", dec!(10)))
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(granted, 10);
        let a = capital.allocation("a").unwrap();
        assert_eq!(a.available, Decimal::ZERO);
        assert_balanced(&a);
    }
}
