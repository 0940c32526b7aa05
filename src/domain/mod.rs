// ============================================================================
// Domain Module
// Coins, configuration, orders, book sides and pair identity
// ============================================================================

pub mod coin;
pub mod config;
pub mod order;
pub mod order_book;
pub mod pair;

pub use coin::{Address, CoinId};
pub use config::SwapConfig;
pub use order::{Order, OrderEvent, OrderId, OrderState, Side};
pub use order_book::BookSide;
pub use pair::{Orientation, PairData, PairKey};
