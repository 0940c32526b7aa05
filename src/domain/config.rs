// ============================================================================
// Swap Engine Configuration
// Commission rates, dust thresholds and pagination tuning
// ============================================================================

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::numeric::COMMISSION_BASE;

/// Configuration shared by every pair managed by a registry.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SwapConfig {
    /// AMM commission in permille, charged on the input side of every
    /// pool segment (2 = 0.2%)
    pub commission_permille: u64,

    /// Commission in permille charged on both legs of a limit order fill,
    /// credited to the pool reserves (1 = 0.1%)
    pub order_commission_permille: u64,

    /// Smallest initial liquidity a new pool may be funded with
    pub minimum_liquidity: u64,

    /// Orders whose remaining legs fall below this volume are closed and
    /// refunded rather than kept on the book
    pub minimum_order_volume: u64,

    /// Number of index entries fetched per storage page when walking a
    /// book side deeper than the in-memory prefix
    pub order_page_size: usize,

    /// Maximum number of hops the router will consider for one route
    pub max_route_hops: usize,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            commission_permille: 2,
            order_commission_permille: 1,
            minimum_liquidity: 1000,
            minimum_order_volume: 10,
            order_page_size: 50,
            max_route_hops: 4,
        }
    }
}

impl SwapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: AMM commission in permille
    pub fn with_commission(mut self, permille: u64) -> Self {
        self.commission_permille = permille;
        self
    }

    /// Builder method: order fill commission in permille
    pub fn with_order_commission(mut self, permille: u64) -> Self {
        self.order_commission_permille = permille;
        self
    }

    /// Builder method: minimum initial pool liquidity
    pub fn with_minimum_liquidity(mut self, minimum: u64) -> Self {
        self.minimum_liquidity = minimum;
        self
    }

    /// Builder method: dust threshold for resting orders
    pub fn with_minimum_order_volume(mut self, minimum: u64) -> Self {
        self.minimum_order_volume = minimum;
        self
    }

    /// Builder method: storage page size for book walks
    pub fn with_order_page_size(mut self, size: usize) -> Self {
        self.order_page_size = size;
        self
    }

    /// Builder method: router hop limit
    pub fn with_max_route_hops(mut self, hops: usize) -> Self {
        self.max_route_hops = hops;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.commission_permille >= COMMISSION_BASE {
            return Err("AMM commission must be below 1000 permille".to_string());
        }
        if self.order_commission_permille >= COMMISSION_BASE {
            return Err("Order commission must be below 1000 permille".to_string());
        }
        if self.order_page_size == 0 {
            return Err("Order page size must be at least 1".to_string());
        }
        if self.max_route_hops == 0 {
            return Err("Router hop limit must be at least 1".to_string());
        }
        Ok(())
    }
}
