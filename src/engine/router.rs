// ============================================================================
// Route Search
// Best-route discovery across pairs with cooperative cancellation
// ============================================================================
//
// Depth-first enumeration of simple paths between two coins, bounded by the
// configured hop limit. Every complete path is quoted through the full
// co-execution quote (orders included), so route choice sees the same
// prices a real swap would. Neighbor expansion is in ascending coin order
// and ties prefer fewer hops, which keeps the result deterministic.
//
// Search is read-only and may run outside consensus (RPC quoting), so it
// takes a cancellation token and returns the best route found so far when
// cancelled.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use primitive_types::U256;

use crate::domain::coin::CoinId;
use crate::error::{SwapError, SwapResult};

use super::registry::PairRegistry;

/// Whether the fixed side of the trade is the input or the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    ExactInput,
    ExactOutput,
}

/// A quoted route through one or more pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Coins visited, endpoints included
    pub coins: Vec<CoinId>,
    pub amount_in: U256,
    pub amount_out: U256,
}

impl Route {
    pub fn hops(&self) -> usize {
        self.coins.len().saturating_sub(1)
    }
}

/// Cooperative cancellation flag for route searches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Find the best route from `from` to `to` for the given fixed amount.
///
/// For [`TradeKind::ExactInput`] the best route maximizes output; for
/// [`TradeKind::ExactOutput`] it minimizes input. Returns `None` when no
/// viable route exists within the hop limit.
pub fn best_route(
    registry: &PairRegistry,
    from: CoinId,
    to: CoinId,
    amount: U256,
    kind: TradeKind,
    cancel: &CancelToken,
) -> SwapResult<Option<Route>> {
    if from == to {
        return Err(SwapError::IdenticalCoins);
    }
    if amount.is_zero() {
        return Err(match kind {
            TradeKind::ExactInput => SwapError::InsufficientInputAmount,
            TradeKind::ExactOutput => SwapError::InsufficientOutputAmount,
        });
    }

    let mut adjacency: BTreeMap<CoinId, BTreeSet<CoinId>> = BTreeMap::new();
    for key in registry.pair_keys()? {
        for coin in [key.coin0(), key.coin1()] {
            if let Some(peer) = key.other(coin) {
                adjacency.entry(coin).or_default().insert(peer);
            }
        }
    }

    let mut search = RouteSearch {
        registry,
        adjacency,
        to,
        amount,
        kind,
        cancel,
        max_coins: registry.config().max_route_hops + 1,
        best: None,
    };
    let mut path = vec![from];
    let mut visited = BTreeSet::from([from]);
    search.dfs(&mut path, &mut visited)?;
    Ok(search.best)
}

struct RouteSearch<'a> {
    registry: &'a PairRegistry,
    adjacency: BTreeMap<CoinId, BTreeSet<CoinId>>,
    to: CoinId,
    amount: U256,
    kind: TradeKind,
    cancel: &'a CancelToken,
    max_coins: usize,
    best: Option<Route>,
}

impl RouteSearch<'_> {
    fn dfs(&mut self, path: &mut Vec<CoinId>, visited: &mut BTreeSet<CoinId>) -> SwapResult<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let Some(&current) = path.last() else {
            return Ok(());
        };
        let Some(neighbors) = self.adjacency.get(&current).cloned() else {
            return Ok(());
        };
        for next in neighbors {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if visited.contains(&next) {
                continue;
            }
            if next == self.to {
                path.push(next);
                if let Some(route) = self.quote(path)? {
                    if self.improves(&route) {
                        self.best = Some(route);
                    }
                }
                path.pop();
                continue;
            }
            if path.len() + 1 < self.max_coins {
                path.push(next);
                visited.insert(next);
                self.dfs(path, visited)?;
                visited.remove(&next);
                path.pop();
            }
        }
        Ok(())
    }

    /// Quote one complete path; `None` when any leg cannot serve the
    /// amount.
    fn quote(&self, path: &[CoinId]) -> SwapResult<Option<Route>> {
        match self.kind {
            TradeKind::ExactInput => {
                let mut amount = self.amount;
                for leg in path.windows(2) {
                    let Some(pair) = self.registry.pair(leg[0], leg[1])? else {
                        return Ok(None);
                    };
                    match pair.calculate_buy_for_sell_with_orders(amount) {
                        Ok(out) => amount = out,
                        Err(_) => return Ok(None),
                    }
                }
                Ok(Some(Route {
                    coins: path.to_vec(),
                    amount_in: self.amount,
                    amount_out: amount,
                }))
            }
            TradeKind::ExactOutput => {
                let mut amount = self.amount;
                for leg in path.windows(2).rev() {
                    let Some(pair) = self.registry.pair(leg[0], leg[1])? else {
                        return Ok(None);
                    };
                    match pair.calculate_sell_for_buy_with_orders(amount) {
                        Ok(input) => amount = input,
                        Err(_) => return Ok(None),
                    }
                }
                Ok(Some(Route {
                    coins: path.to_vec(),
                    amount_in: amount,
                    amount_out: self.amount,
                }))
            }
        }
    }

    fn improves(&self, candidate: &Route) -> bool {
        let Some(best) = &self.best else { return true };
        match self.kind {
            TradeKind::ExactInput => {
                candidate.amount_out > best.amount_out
                    || (candidate.amount_out == best.amount_out
                        && candidate.hops() < best.hops())
            }
            TradeKind::ExactOutput => {
                candidate.amount_in < best.amount_in
                    || (candidate.amount_in == best.amount_in && candidate.hops() < best.hops())
            }
        }
    }
}
