// ============================================================================
// Ledger Interfaces
// Account balance crediting and total-volume invariant mirroring
// ============================================================================
//
// The engine never debits through these interfaces: takers pay by having
// escrowed funds before the call, so the only balance movements the engine
// originates are credits (maker proceeds and refunds). Reserve changes are
// mirrored to the invariant checker so the host can assert that per-coin
// totals still add up after every block.

use std::collections::HashMap;

use parking_lot::Mutex;
use primitive_types::U256;

use crate::domain::coin::{Address, CoinId};

/// Credits coins to accounts. Implemented by the host's account module.
pub trait AccountLedger: Send + Sync {
    fn add_balance(&self, owner: Address, coin: CoinId, amount: U256);
}

/// Receives every reserve movement so per-coin conservation can be checked
/// outside the engine.
pub trait InvariantChecker: Send + Sync {
    /// `amount` of `coin` entered the pool reserves.
    fn coin_added(&self, coin: CoinId, amount: U256);

    /// `amount` of `coin` left the pool reserves.
    fn coin_removed(&self, coin: CoinId, amount: U256);
}

/// Ledger that drops all credits. For hosts that settle out of band.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLedger;

impl AccountLedger for NoOpLedger {
    fn add_balance(&self, _owner: Address, _coin: CoinId, _amount: U256) {}
}

/// Checker that verifies nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpChecker;

impl InvariantChecker for NoOpChecker {
    fn coin_added(&self, _coin: CoinId, _amount: U256) {}
    fn coin_removed(&self, _coin: CoinId, _amount: U256) {}
}

/// In-memory ledger keyed by (owner, coin). Backs tests and single-node
/// embedding.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: Mutex<HashMap<(Address, CoinId), U256>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, owner: Address, coin: CoinId) -> U256 {
        self.balances
            .lock()
            .get(&(owner, coin))
            .copied()
            .unwrap_or_default()
    }
}

impl AccountLedger for MemoryLedger {
    fn add_balance(&self, owner: Address, coin: CoinId, amount: U256) {
        let mut balances = self.balances.lock();
        let entry = balances.entry((owner, coin)).or_default();
        *entry = entry.saturating_add(amount);
    }
}

/// Checker that accumulates gross added/removed volume per coin.
#[derive(Debug, Default)]
pub struct SummingChecker {
    totals: Mutex<HashMap<CoinId, (U256, U256)>>,
}

impl SummingChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// (total added, total removed) recorded for `coin`.
    pub fn totals(&self, coin: CoinId) -> (U256, U256) {
        self.totals.lock().get(&coin).copied().unwrap_or_default()
    }
}

impl InvariantChecker for SummingChecker {
    fn coin_added(&self, coin: CoinId, amount: U256) {
        let mut totals = self.totals.lock();
        let entry = totals.entry(coin).or_default();
        entry.0 = entry.0.saturating_add(amount);
    }

    fn coin_removed(&self, coin: CoinId, amount: U256) {
        let mut totals = self.totals.lock();
        let entry = totals.entry(coin).or_default();
        entry.1 = entry.1.saturating_add(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_ledger_accumulates() {
        let ledger = MemoryLedger::new();
        let owner = Address::new([1u8; 20]);
        let coin = CoinId::new(7);
        ledger.add_balance(owner, coin, U256::from(10u64));
        ledger.add_balance(owner, coin, U256::from(5u64));
        assert_eq!(ledger.balance(owner, coin), U256::from(15u64));
        assert_eq!(ledger.balance(owner, CoinId::new(8)), U256::zero());
    }

    #[test]
    fn test_summing_checker_tracks_both_directions() {
        let checker = SummingChecker::new();
        let coin = CoinId::new(1);
        checker.coin_added(coin, U256::from(100u64));
        checker.coin_removed(coin, U256::from(30u64));
        checker.coin_added(coin, U256::from(1u64));
        assert_eq!(checker.totals(coin), (U256::from(101u64), U256::from(30u64)));
    }
}
