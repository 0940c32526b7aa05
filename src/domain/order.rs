// ============================================================================
// Limit Order Domain Model
// ============================================================================
//
// An order promises to give up to `want_sell` of one coin in exchange for
// `want_buy` of the other, at the fixed ratio of the two amounts. Both
// fields shrink together as the order fills; the implied price never moves.
//
// `want_buy` is always denominated in the coin the maker wants to receive,
// which is exactly the coin an incoming taker is selling. Field meaning is
// therefore identical from both view orientations of a pair.

use primitive_types::{U256, U512};

use crate::numeric::{Price, PriceKey};

use super::coin::{Address, CoinId};
use super::pair::PairKey;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Book-local order identifier, allocated from a persisted counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(pub u32);

impl OrderId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which canonical coin the maker wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    /// Maker wants canonical coin0 and gives coin1
    Bid,
    /// Maker wants canonical coin1 and gives coin0
    Ask,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Side::Bid => 0,
            Side::Ask => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Side> {
        match byte {
            0 => Some(Side::Bid),
            1 => Some(Side::Ask),
            _ => None,
        }
    }
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    /// Lifecycle state of an order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderState {
        /// On the book, untouched
        Resting,
        /// On the book with reduced amounts
        PartiallyFilled,
        /// Fully consumed, or force-closed (dust, expiry)
        Closed,
        /// Withdrawn by its owner
        Cancelled,
    }

    /// Events that move an order between states.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OrderEvent {
        PartialFill,
        CompleteFill,
        /// Dust closure or height-based expiry
        ForceClose,
        Cancel,
    }

    impl OrderState {
        pub fn is_terminal(self) -> bool {
            matches!(self, OrderState::Closed | OrderState::Cancelled)
        }

        /// Apply an event, rejecting transitions out of terminal states.
        pub fn transition(self, event: OrderEvent) -> Result<OrderState, String> {
            if self.is_terminal() {
                return Err(format!("order is already {self:?}"));
            }
            Ok(match event {
                OrderEvent::PartialFill => OrderState::PartiallyFilled,
                OrderEvent::CompleteFill | OrderEvent::ForceClose => OrderState::Closed,
                OrderEvent::Cancel => OrderState::Cancelled,
            })
        }
    }
}

pub use state::{OrderEvent, OrderState};

// ============================================================================
// Order
// ============================================================================

/// The canonical coin a maker on `side` wants to receive.
fn wanted_coin(pair: &PairKey, side: Side) -> CoinId {
    match side {
        Side::Bid => pair.coin0(),
        Side::Ask => pair.coin1(),
    }
}

/// A resting limit order.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub pair: PairKey,
    pub side: Side,
    /// Remaining amount of the wanted coin
    pub want_buy: U256,
    /// Remaining amount of the given coin
    pub want_sell: U256,
    pub owner: Address,
    /// Block height at which the order was placed
    pub created_height: u64,
    pub state: OrderState,
    /// Cached sort key, recomputed only when the amounts change
    price_key: PriceKey,
    /// Index key currently persisted, if any; used to relocate the index
    /// entry on commit
    pub(crate) stored_key: Option<PriceKey>,
}

impl Order {
    pub fn new(
        id: OrderId,
        pair: PairKey,
        side: Side,
        want_buy: U256,
        want_sell: U256,
        owner: Address,
        created_height: u64,
    ) -> Self {
        Self {
            id,
            pair,
            side,
            want_buy,
            want_sell,
            owner,
            created_height,
            state: OrderState::Resting,
            price_key: PriceKey::from_ratio(want_buy, want_sell),
            stored_key: None,
        }
    }

    /// Cost to the taker per unit of output: `want_buy / want_sell`.
    /// Lower is better for the taker; book sides sort ascending by this.
    pub fn taker_cost(&self) -> Price {
        Price::new(self.want_buy, self.want_sell)
    }

    /// What the maker pays out per unit taken in: `want_sell / want_buy`.
    /// Compared against the pool's marginal rate during co-execution.
    pub fn maker_rate(&self) -> Price {
        Price::new(self.want_sell, self.want_buy)
    }

    pub fn price_key(&self) -> PriceKey {
        self.price_key
    }

    /// (key, id) tuple the book and the storage index both sort by.
    pub fn sort_key(&self) -> (PriceKey, OrderId) {
        (self.price_key, self.id)
    }

    /// The coin the maker wants, under canonical orientation.
    pub fn coin_wanted(&self) -> CoinId {
        wanted_coin(&self.pair, self.side)
    }

    /// The coin the maker gives: what the opposite side wants.
    pub fn coin_given(&self) -> CoinId {
        wanted_coin(&self.pair, self.side.opposite())
    }

    pub fn is_empty(&self) -> bool {
        self.want_buy.is_zero() || self.want_sell.is_zero()
    }

    /// Amount of the given coin owed for taking `take` of the wanted coin,
    /// rounded down at the order's fixed ratio.
    pub fn proceeds_for(&self, take: U256) -> U256 {
        if self.want_buy.is_zero() {
            return U256::zero();
        }
        let wide = take.full_mul(self.want_sell) / U512::from(self.want_buy);
        // take <= want_buy always holds for fills, so this cannot truncate.
        U256::try_from(wide).unwrap_or(U256::MAX)
    }

    /// Reduce both legs by a fill of `take` wanted-coin against `give`
    /// given-coin. Returns `true` when the order is fully consumed.
    pub fn fill(&mut self, take: U256, give: U256) -> Result<bool, String> {
        if self.state.is_terminal() {
            return Err(format!("order is already {:?}", self.state));
        }
        self.want_buy = self
            .want_buy
            .checked_sub(take)
            .ok_or("fill exceeds remaining want_buy")?;
        self.want_sell = self
            .want_sell
            .checked_sub(give)
            .ok_or("fill exceeds remaining want_sell")?;

        if self.is_empty() {
            self.want_buy = U256::zero();
            self.want_sell = U256::zero();
            self.state = self.state.transition(OrderEvent::CompleteFill)?;
            self.price_key = PriceKey::MIN;
            Ok(true)
        } else {
            self.state = self.state.transition(OrderEvent::PartialFill)?;
            self.price_key = self.taker_cost().key();
            Ok(false)
        }
    }

    /// Close the order and return the unspent given-coin amount for refund.
    /// Used for dust closure and height-based expiry.
    pub fn force_close(&mut self) -> Result<U256, String> {
        self.state = self.state.transition(OrderEvent::ForceClose)?;
        let refund = self.want_sell;
        self.want_buy = U256::zero();
        self.want_sell = U256::zero();
        self.price_key = PriceKey::MIN;
        Ok(refund)
    }

    /// Cancel the order and return the unspent given-coin amount for refund.
    pub fn cancel(&mut self) -> Result<U256, String> {
        self.state = self.state.transition(OrderEvent::Cancel)?;
        let refund = self.want_sell;
        self.want_buy = U256::zero();
        self.want_sell = U256::zero();
        self.price_key = PriceKey::MIN;
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pair() -> PairKey {
        PairKey::ordered(CoinId::new(1), CoinId::new(2)).unwrap().0
    }

    fn order(want_buy: u64, want_sell: u64) -> Order {
        Order::new(
            OrderId::new(1),
            test_pair(),
            Side::Bid,
            U256::from(want_buy),
            U256::from(want_sell),
            Address::ZERO,
            100,
        )
    }

    #[test]
    fn test_price_is_ratio_of_amounts() {
        let o = order(15_000, 5_000);
        assert_eq!(o.taker_cost(), Price::new(U256::from(3u64), U256::from(1u64)));
        assert_eq!(o.maker_rate(), Price::new(U256::from(1u64), U256::from(3u64)));
    }

    #[test]
    fn test_partial_fill_keeps_price() {
        let mut o = order(15_000, 5_000);
        let key_before = o.price_key();
        let complete = o.fill(U256::from(3_000u64), U256::from(1_000u64)).unwrap();
        assert!(!complete);
        assert_eq!(o.state, OrderState::PartiallyFilled);
        assert_eq!(o.want_buy, U256::from(12_000u64));
        assert_eq!(o.want_sell, U256::from(4_000u64));
        // 12000/4000 == 15000/5000
        assert_eq!(o.price_key(), key_before);
    }

    #[test]
    fn test_complete_fill() {
        let mut o = order(15_000, 5_000);
        let complete = o.fill(U256::from(15_000u64), U256::from(5_000u64)).unwrap();
        assert!(complete);
        assert_eq!(o.state, OrderState::Closed);
        assert!(o.is_empty());
    }

    #[test]
    fn test_one_sided_exhaustion_closes() {
        // Rounding can zero one leg first; the order still closes.
        let mut o = order(15_000, 5_000);
        let complete = o.fill(U256::from(15_000u64), U256::from(4_999u64)).unwrap();
        assert!(complete);
        assert!(o.want_sell.is_zero());
    }

    #[test]
    fn test_overfill_rejected() {
        let mut o = order(100, 100);
        assert!(o.fill(U256::from(101u64), U256::from(50u64)).is_err());
    }

    #[test]
    fn test_cancel_refunds_remaining() {
        let mut o = order(15_000, 5_000);
        o.fill(U256::from(3_000u64), U256::from(1_000u64)).unwrap();
        let refund = o.cancel().unwrap();
        assert_eq!(refund, U256::from(4_000u64));
        assert_eq!(o.state, OrderState::Cancelled);
        assert!(o.cancel().is_err());
    }

    #[test]
    fn test_force_close_from_resting() {
        let mut o = order(9, 9);
        let refund = o.force_close().unwrap();
        assert_eq!(refund, U256::from(9u64));
        assert_eq!(o.state, OrderState::Closed);
    }

    #[test]
    fn test_proceeds_rounding() {
        let o = order(15_000, 5_000);
        // 1000 * 5000 / 15000 = 333.33 -> 333
        assert_eq!(o.proceeds_for(U256::from(1_000u64)), U256::from(333u64));
    }

    #[test]
    fn test_terminal_states_reject_fills() {
        let mut o = order(100, 100);
        o.cancel().unwrap();
        assert!(o.fill(U256::from(1u64), U256::from(1u64)).is_err());
    }

    #[test]
    fn test_coin_sides() {
        let o = order(1, 1);
        assert_eq!(o.coin_wanted(), CoinId::new(1));
        assert_eq!(o.coin_given(), CoinId::new(2));
    }
}
