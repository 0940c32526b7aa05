// ============================================================================
// Swapbook Library
// Constant-product AMM with an on-ledger limit order book
// ============================================================================

//! # Swapbook
//!
//! A deterministic swap engine pairing constant-product pools with resting
//! limit orders, built to run inside a blockchain state machine.
//!
//! ## Features
//!
//! - **Co-execution**: swaps walk the pool and the order book together,
//!   filling orders whenever they beat the pool's marginal rate
//! - **Exact arithmetic** on 256-bit integers, no floating point anywhere
//!   near consensus state
//! - **Lazy paginated books** that page resting orders in from storage on
//!   demand instead of loading whole sides
//! - **Deterministic commits**: every replica produces an identical write
//!   sequence for identical operations
//! - **Pluggable collaborators** for balance crediting, conservation
//!   checking and event observation
//!
//! ## Example
//!
//! ```rust
//! use swapbook::prelude::*;
//! use primitive_types::U256;
//!
//! let registry = PairRegistryBuilder::in_memory().build().unwrap();
//!
//! // Fund a pool with 10000 of each coin.
//! let (pair, liquidity) = registry
//!     .create_pair(
//!         CoinId::new(1),
//!         CoinId::new(2),
//!         U256::from(10_000u64),
//!         U256::from(10_000u64),
//!     )
//!     .unwrap();
//! assert_eq!(liquidity, U256::from(10_000u64));
//!
//! // Rest a limit order offering 2000 of coin 2 for 1000 of coin 1.
//! pair.add_order(
//!     U256::from(1_000u64),
//!     U256::from(2_000u64),
//!     Address::ZERO,
//!     1,
//! )
//! .unwrap();
//!
//! // Sell 500 of coin 1: the order beats the pool and fills first.
//! let details = pair.sell_with_orders(U256::from(500u64)).unwrap();
//! assert_eq!(details.amount_out, U256::from(999u64));
//! assert_eq!(details.fills.len(), 1);
//!
//! // Persist everything for ledger version 1.
//! registry.commit(1).unwrap();
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod numeric;
pub mod storage;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::coin::{Address, CoinId};
    pub use crate::domain::config::SwapConfig;
    pub use crate::domain::order::state::OrderState;
    pub use crate::domain::{Order, OrderId, Orientation, PairKey, Side};
    pub use crate::engine::{
        best_route, CancelToken, ExpiredOrder, OrderFill, Pair, PairRegistry,
        PairRegistryBuilder, Route, SwapDetails, TradeKind,
    };
    pub use crate::error::{SwapError, SwapResult};
    pub use crate::interfaces::{
        AccountLedger, CollectingEventSink, EventSink, InvariantChecker, LoggingEventSink,
        MemoryLedger, NoOpChecker, NoOpEventSink, NoOpLedger, SwapEvent,
    };
    pub use crate::storage::{MemTree, Tree};
}

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use primitive_types::U256;
    use std::sync::Arc;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    #[test]
    fn test_end_to_end_swap_commit_reload() {
        let tree = Arc::new(MemTree::new());
        let ledger = Arc::new(MemoryLedger::new());
        let registry = PairRegistryBuilder::new(Arc::clone(&tree) as Arc<dyn Tree>)
            .with_ledger(Arc::clone(&ledger) as _)
            .build()
            .unwrap();

        let maker = Address::new([1u8; 20]);
        let (pair, _) = registry
            .create_pair(CoinId::new(1), CoinId::new(2), u(100_000), u(100_000))
            .unwrap();
        pair.add_order(u(2_000), u(5_000), maker, 1).unwrap();
        pair.add_order(u(2_000), u(4_000), maker, 1).unwrap();

        // Crosses both orders, then the pool.
        let details = pair.sell_with_orders(u(10_000)).unwrap();
        assert_eq!(details.fills.len(), 2);
        assert!(details.fills.iter().all(|f| f.complete));
        assert_eq!(ledger.balance(maker, CoinId::new(1)), u(3_996));

        let reserves = pair.reserves();
        registry.commit(1).unwrap();

        // A fresh registry over the same tree sees the identical state.
        let reloaded = PairRegistryBuilder::new(Arc::clone(&tree) as Arc<dyn Tree>)
            .build()
            .unwrap();
        let pair = reloaded
            .pair(CoinId::new(1), CoinId::new(2))
            .unwrap()
            .unwrap();
        assert_eq!(pair.reserves(), reserves);
        let quote = pair.calculate_buy_for_sell_with_orders(u(1_000)).unwrap();
        assert!(!quote.is_zero());
    }

    #[test]
    fn test_route_quote_matches_sequential_execution() {
        let registry = PairRegistryBuilder::in_memory().build().unwrap();
        registry
            .create_pair(CoinId::new(1), CoinId::new(2), u(50_000), u(50_000))
            .unwrap();
        registry
            .create_pair(CoinId::new(2), CoinId::new(3), u(50_000), u(50_000))
            .unwrap();

        let cancel = CancelToken::new();
        let route = best_route(
            &registry,
            CoinId::new(1),
            CoinId::new(3),
            u(2_000),
            TradeKind::ExactInput,
            &cancel,
        )
        .unwrap()
        .unwrap();
        assert_eq!(route.coins.len(), 3);

        // Executing the route leg by leg reproduces the quoted output.
        let mut amount = route.amount_in;
        for leg in route.coins.windows(2) {
            let pair = registry.pair(leg[0], leg[1]).unwrap().unwrap();
            amount = pair.sell_with_orders(amount).unwrap().amount_out;
        }
        assert_eq!(amount, route.amount_out);
    }
}
