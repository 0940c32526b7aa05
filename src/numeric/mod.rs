// ============================================================================
// Numeric Module
// Integer AMM math, exact rational prices and sortable price keys
// ============================================================================

pub mod amm;
pub mod errors;
pub mod price;

pub use amm::{
    amount_to_reach_price, burn_liquidity, calculate_buy_for_sell, calculate_sell_for_buy,
    check_swap, create_liquidity, mint_liquidity, COMMISSION_BASE,
};
pub use errors::{MathError, MathResult};
pub use price::{Price, PriceKey, PRICE_KEY_DIGITS, PRICE_KEY_LEN};
