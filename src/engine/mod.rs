// ============================================================================
// Engine Module
// Pair views, registry, route search and the registry factory
// ============================================================================

pub mod factory;
pub mod pair;
pub mod registry;
pub mod router;

pub use factory::PairRegistryBuilder;
pub use pair::{ExpiredOrder, OrderFill, Pair, SwapDetails};
pub use registry::PairRegistry;
pub use router::{best_route, CancelToken, Route, TradeKind};
