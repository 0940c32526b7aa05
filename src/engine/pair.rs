// ============================================================================
// Pair Views and Co-Execution
// ============================================================================
//
// `PairInner` is the single canonical pool object: reserves under their own
// lock, both book sides under another, so reserve reads never wait on book
// walks. `Pair` is a cheap view handle over the inner object carrying an
// orientation; a reversed view translates every field access instead of
// swapping stored state.
//
// A swap is planned first and applied second, under one book lock. The plan
// phase walks pool segments and resting orders interleaved: while the best
// order's rate beats the pool's marginal rate the order fills at its own
// price, otherwise the pool is walked exactly down to that price before the
// order is touched. Quotes run the plan phase alone and mutate nothing but
// the pagination cache.

use parking_lot::{Mutex, RwLock};
use primitive_types::{U256, U512};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::domain::coin::{Address, CoinId};
use crate::domain::order::{Order, OrderId, Side};
use crate::domain::order_book::BookSide;
use crate::domain::pair::{Orientation, PairKey};
use crate::error::{SwapError, SwapResult};
use crate::interfaces::SwapEvent;
use crate::numeric::{amm, MathError, Price, COMMISSION_BASE};
use crate::storage::{codec, keys};

use super::registry::EngineCtx;

// ============================================================================
// Inner pool state
// ============================================================================

pub(crate) struct Books {
    pub bid: BookSide,
    pub ask: BookSide,
}

impl Books {
    pub fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bid,
            Side::Ask => &mut self.ask,
        }
    }
}

pub(crate) struct PairInner {
    pub key: PairKey,
    pub id: u32,
    /// Canonical reserves (coin0, coin1); independent of the book lock
    pub reserves: RwLock<(U256, U256)>,
    pub books: Mutex<Books>,
}

impl PairInner {
    pub fn new(key: PairKey, id: u32, reserve0: U256, reserve1: U256, page_size: usize) -> Self {
        Self {
            key,
            id,
            reserves: RwLock::new((reserve0, reserve1)),
            books: Mutex::new(Books {
                bid: BookSide::new(key, Side::Bid, page_size),
                ask: BookSide::new(key, Side::Ask, page_size),
            }),
        }
    }
}

// ============================================================================
// Swap results
// ============================================================================

/// One maker credited during a swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFill {
    pub id: OrderId,
    pub owner: Address,
    /// Coin and amount credited to the maker
    pub coin: CoinId,
    pub amount: U256,
    pub complete: bool,
}

/// An order force-closed during a swap because its remainder fell below the
/// minimum volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredOrder {
    pub id: OrderId,
    pub owner: Address,
    pub coin: CoinId,
    pub refund: U256,
}

/// Outcome of an executed swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapDetails {
    /// Total input taken from the taker, order legs included
    pub amount_in: U256,
    /// Total output delivered to the taker, net of commissions
    pub amount_out: U256,
    pub fills: SmallVec<[OrderFill; 4]>,
    pub expired: SmallVec<[ExpiredOrder; 2]>,
}

// ============================================================================
// Walk plan
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Target {
    Input(U256),
    Output(U256),
}

#[derive(Debug, Clone, Copy)]
struct FillPlan {
    id: OrderId,
    /// Input coin paid by the taker for this order
    take: U256,
    /// Gross output coin released from the maker's escrow
    give: U256,
    /// Commission on the taker leg, credited to reserves
    fee0: U256,
    /// Commission on the maker leg, credited to reserves
    fee1: U256,
}

#[derive(Debug, Default)]
struct WalkPlan {
    /// Input routed through pool segments
    amm_in: U256,
    /// Output produced by pool segments
    amm_out: U256,
    fills: SmallVec<[FillPlan; 4]>,
}

impl WalkPlan {
    /// (total input, total output net of commissions)
    fn totals(&self) -> SwapResult<(U256, U256)> {
        let mut input = self.amm_in;
        let mut output = self.amm_out;
        for fill in &self.fills {
            input = input.checked_add(fill.take).ok_or(SwapError::Overflow)?;
            let net = fill.give.checked_sub(fill.fee1).ok_or(SwapError::Overflow)?;
            output = output.checked_add(net).ok_or(SwapError::Overflow)?;
        }
        Ok((input, output))
    }
}

/// `floor(amount * permille / 1000)`
fn permille_of(amount: U256, permille: u64) -> U256 {
    let wide = amount.full_mul(U256::from(permille)) / U512::from(COMMISSION_BASE);
    U256::try_from(wide).unwrap_or(U256::MAX)
}

/// `ceil(a * b / d)` for d > 0, saturating at the 256-bit boundary.
fn mul_div_ceil(a: U256, b: U256, d: U256) -> SwapResult<U256> {
    if d.is_zero() {
        return Err(SwapError::Overflow);
    }
    let wide = a.full_mul(b);
    let den = U512::from(d);
    let (q, r) = (wide / den, wide % den);
    let q = if r.is_zero() { q } else { q + U512::one() };
    U256::try_from(q).map_err(|_| SwapError::Overflow)
}

// ============================================================================
// Pair view
// ============================================================================

/// Oriented view handle over a canonical pair.
#[derive(Clone)]
pub struct Pair {
    inner: Arc<PairInner>,
    orientation: Orientation,
    ctx: Arc<EngineCtx>,
}

impl Pair {
    pub(crate) fn new(inner: Arc<PairInner>, orientation: Orientation, ctx: Arc<EngineCtx>) -> Self {
        Self {
            inner,
            orientation,
            ctx,
        }
    }

    pub fn key(&self) -> PairKey {
        self.inner.key
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// (view coin0, view coin1): the taker sells view coin0 for view coin1.
    pub fn coins(&self) -> (CoinId, CoinId) {
        self.inner.key.coins_oriented(self.orientation)
    }

    /// The same pair looked at from the other direction.
    pub fn reverse(&self) -> Pair {
        Pair {
            inner: Arc::clone(&self.inner),
            orientation: self.orientation.flip(),
            ctx: Arc::clone(&self.ctx),
        }
    }

    /// Oriented reserves (view coin0, view coin1).
    pub fn reserves(&self) -> (U256, U256) {
        let (r0, r1) = *self.inner.reserves.read();
        match self.orientation {
            Orientation::Forward => (r0, r1),
            Orientation::Reversed => (r1, r0),
        }
    }

    /// Spot rate: view coin1 per view coin0.
    pub fn price(&self) -> SwapResult<Price> {
        let (r0, r1) = *self.inner.reserves.read();
        if r0.is_zero() || r1.is_zero() {
            return Err(SwapError::InsufficientLiquidity);
        }
        let canonical = Price::new(r1, r0);
        Ok(match self.orientation {
            Orientation::Forward => canonical,
            Orientation::Reversed => canonical.inverse(),
        })
    }

    fn store_reserves(&self, v0: U256, v1: U256) {
        let canonical = match self.orientation {
            Orientation::Forward => (v0, v1),
            Orientation::Reversed => (v1, v0),
        };
        *self.inner.reserves.write() = canonical;
    }

    /// The book side an incoming taker (selling view coin0) consumes:
    /// makers there want exactly that coin.
    fn matching_side(&self) -> Side {
        if self.orientation.is_forward() {
            Side::Bid
        } else {
            Side::Ask
        }
    }

    // ------------------------------------------------------------------
    // Liquidity
    // ------------------------------------------------------------------

    /// Fund an empty pool and return the initial liquidity,
    /// `floor(sqrt(amount0 * amount1))`.
    pub fn create_liquidity(&self, amount0: U256, amount1: U256) -> SwapResult<U256> {
        let (r0, r1) = self.reserves();
        if !r0.is_zero() || !r1.is_zero() {
            return Err(SwapError::PairExists);
        }
        let liquidity =
            amm::create_liquidity(amount0, amount1, self.ctx.config.minimum_liquidity)?;
        self.store_reserves(amount0, amount1);

        let (c0, c1) = self.coins();
        self.ctx.checker.coin_added(c0, amount0);
        self.ctx.checker.coin_added(c1, amount1);
        self.ctx.dirty.mark_pair(self.inner.key);
        self.ctx.events.on_event(&SwapEvent::LiquidityAdded {
            pair: self.inner.key,
            amount0,
            amount1,
            minted: liquidity,
        });
        Ok(liquidity)
    }

    /// Add liquidity to a funded pool. `total_supply` is the outstanding
    /// liquidity tracked by the host's coin registry.
    pub fn mint_liquidity(
        &self,
        amount0: U256,
        amount1: U256,
        total_supply: U256,
    ) -> SwapResult<U256> {
        let (r0, r1) = self.reserves();
        let minted = amm::mint_liquidity(total_supply, amount0, amount1, r0, r1)?;
        let new0 = r0.checked_add(amount0).ok_or(SwapError::Overflow)?;
        let new1 = r1.checked_add(amount1).ok_or(SwapError::Overflow)?;
        self.store_reserves(new0, new1);

        let (c0, c1) = self.coins();
        self.ctx.checker.coin_added(c0, amount0);
        self.ctx.checker.coin_added(c1, amount1);
        self.ctx.dirty.mark_pair(self.inner.key);
        self.ctx.events.on_event(&SwapEvent::LiquidityAdded {
            pair: self.inner.key,
            amount0,
            amount1,
            minted,
        });
        Ok(minted)
    }

    /// Burn liquidity and withdraw the proportional share of both reserves.
    pub fn burn_liquidity(
        &self,
        liquidity: U256,
        total_supply: U256,
    ) -> SwapResult<(U256, U256)> {
        let (r0, r1) = self.reserves();
        let (amount0, amount1) = amm::burn_liquidity(total_supply, liquidity, r0, r1)?;
        self.store_reserves(r0 - amount0, r1 - amount1);

        let (c0, c1) = self.coins();
        self.ctx.checker.coin_removed(c0, amount0);
        self.ctx.checker.coin_removed(c1, amount1);
        self.ctx.dirty.mark_pair(self.inner.key);
        self.ctx.events.on_event(&SwapEvent::LiquidityRemoved {
            pair: self.inner.key,
            amount0,
            amount1,
            burned: liquidity,
        });
        Ok((amount0, amount1))
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Place a limit order wanting `want_buy` view coin0 in exchange for
    /// `want_sell` view coin1. The caller must have escrowed `want_sell`
    /// before calling.
    pub fn add_order(
        &self,
        want_buy: U256,
        want_sell: U256,
        owner: Address,
        height: u64,
    ) -> SwapResult<OrderId> {
        let minimum = U256::from(self.ctx.config.minimum_order_volume);
        if want_buy < minimum || want_sell < minimum {
            return Err(SwapError::OrderVolumeTooLow);
        }
        let id = OrderId::new(self.ctx.allocate_order_id()?);
        let side = self.matching_side();
        let order = Order::new(id, self.inner.key, side, want_buy, want_sell, owner, height);

        self.ctx.events.on_event(&SwapEvent::OrderPlaced {
            id,
            pair: self.inner.key,
            side,
            want_buy,
            want_sell,
            owner,
        });
        self.inner.books.lock().side_mut(side).insert(order);
        self.ctx.dirty.mark_orders(self.inner.key);
        tracing::debug!(order = %id, pair = ?self.inner.key, "order placed");
        Ok(id)
    }

    /// Look up a live order by id, from memory or storage.
    pub fn order(&self, id: OrderId) -> SwapResult<Option<Order>> {
        let books = self.inner.books.lock();
        for book in [&books.bid, &books.ask] {
            if book.contains(id) {
                return Ok(book.get(id).cloned());
            }
        }
        drop(books);
        self.order_from_storage(id)
    }

    fn order_from_storage(&self, id: OrderId) -> SwapResult<Option<Order>> {
        let Some(blob) = self.ctx.storage.get(&keys::order_blob_key(id)) else {
            return Ok(None);
        };
        let mut order = codec::decode_order(&blob)?;
        if order.pair != self.inner.key {
            return Ok(None);
        }
        order.stored_key = Some(order.price_key());
        Ok(Some(order))
    }

    /// Cancel an order owned by `owner`, refunding the unspent escrow.
    /// Returns the refund coin and amount.
    pub fn cancel_order(&self, id: OrderId, owner: Address) -> SwapResult<(CoinId, U256)> {
        let mut books = self.inner.books.lock();
        let side = if books.bid.contains(id) {
            Side::Bid
        } else if books.ask.contains(id) {
            Side::Ask
        } else {
            // Resident on disk beyond the paged prefix: adopt it into the
            // overlay so the tombstone cleans up its records on commit.
            let order = self
                .order_from_storage(id)?
                .ok_or(SwapError::OrderNotFound(id.raw()))?;
            let side = order.side;
            books.side_mut(side).adopt(order);
            side
        };

        let book = books.side_mut(side);
        let order = book.get(id).ok_or(SwapError::OrderNotFound(id.raw()))?;
        if order.owner != owner {
            return Err(SwapError::NotOrderOwner);
        }
        let coin = order.coin_given();

        book.unlink(id);
        let refund = book
            .get_mut(id)
            .ok_or(SwapError::OrderNotFound(id.raw()))?
            .cancel()
            .map_err(SwapError::Storage)?;
        book.tombstone(id);
        drop(books);

        self.ctx.ledger.add_balance(owner, coin, refund);
        self.ctx.dirty.mark_orders(self.inner.key);
        self.ctx.events.on_event(&SwapEvent::OrderCancelled {
            id,
            refund_coin: coin,
            refund,
        });
        tracing::debug!(order = %id, %refund, "order cancelled");
        Ok((coin, refund))
    }

    /// Force-close every order placed at or before `height`, refunding the
    /// unspent escrow. Returns the closed orders.
    pub fn expire_orders(&self, height: u64) -> SwapResult<Vec<ExpiredOrder>> {
        let tree = self.ctx.storage.as_ref();
        let mut expired = Vec::new();
        let mut books = self.inner.books.lock();

        for side in [Side::Bid, Side::Ask] {
            let book = books.side_mut(side);
            let mut stale = Vec::new();
            let mut rank = 0usize;
            while let Some(id) = book.order_id_at(rank, tree)? {
                if let Some(order) = book.get(id) {
                    if order.created_height <= height {
                        stale.push(id);
                    }
                }
                rank += 1;
            }
            for id in stale {
                let Some(order) = book.get(id) else { continue };
                let (owner, coin) = (order.owner, order.coin_given());
                book.unlink(id);
                let refund = match book.get_mut(id) {
                    Some(order) => order.force_close().map_err(SwapError::Storage)?,
                    None => continue,
                };
                book.tombstone(id);
                expired.push(ExpiredOrder {
                    id,
                    owner,
                    coin,
                    refund,
                });
            }
        }
        drop(books);

        for entry in &expired {
            self.ctx
                .ledger
                .add_balance(entry.owner, entry.coin, entry.refund);
            self.ctx.events.on_event(&SwapEvent::OrderExpired {
                id: entry.id,
                refund_coin: entry.coin,
                refund: entry.refund,
            });
        }
        if !expired.is_empty() {
            self.ctx.dirty.mark_orders(self.inner.key);
            tracing::debug!(count = expired.len(), "orders expired");
        }
        Ok(expired)
    }

    // ------------------------------------------------------------------
    // Swaps
    // ------------------------------------------------------------------

    /// Swap an exact `amount_in` of view coin0 through orders and pool.
    pub fn sell_with_orders(&self, amount_in: U256) -> SwapResult<SwapDetails> {
        let mut books = self.inner.books.lock();
        let side = self.matching_side();
        let plan = self.plan(books.side_mut(side), Target::Input(amount_in))?;
        self.apply(&mut books, side, plan)
    }

    /// Swap for an exact `amount_out` of view coin1 through orders and
    /// pool. The delivered amount can exceed the request by rounding, never
    /// undercut it.
    pub fn buy_with_orders(&self, amount_out: U256) -> SwapResult<SwapDetails> {
        let mut books = self.inner.books.lock();
        let side = self.matching_side();
        let plan = self.plan(books.side_mut(side), Target::Output(amount_out))?;
        self.apply(&mut books, side, plan)
    }

    /// Quote the output of [`Pair::sell_with_orders`] without executing.
    pub fn calculate_buy_for_sell_with_orders(&self, amount_in: U256) -> SwapResult<U256> {
        let mut books = self.inner.books.lock();
        let side = self.matching_side();
        let plan = self.plan(books.side_mut(side), Target::Input(amount_in))?;
        Ok(plan.totals()?.1)
    }

    /// Quote the input of [`Pair::buy_with_orders`] without executing.
    pub fn calculate_sell_for_buy_with_orders(&self, amount_out: U256) -> SwapResult<U256> {
        let mut books = self.inner.books.lock();
        let side = self.matching_side();
        let plan = self.plan(books.side_mut(side), Target::Output(amount_out))?;
        Ok(plan.totals()?.0)
    }

    // ------------------------------------------------------------------
    // Walk planning
    // ------------------------------------------------------------------

    fn plan(&self, book: &mut BookSide, target: Target) -> SwapResult<WalkPlan> {
        let (r0, r1) = self.reserves();
        if r0.is_zero() || r1.is_zero() {
            return Err(SwapError::InsufficientLiquidity);
        }
        match target {
            Target::Input(amount) => self.plan_exact_input(book, r0, r1, amount),
            Target::Output(amount) => self.plan_exact_output(book, r0, r1, amount),
        }
    }

    fn plan_exact_input(
        &self,
        book: &mut BookSide,
        mut r0: U256,
        mut r1: U256,
        amount_in: U256,
    ) -> SwapResult<WalkPlan> {
        if amount_in.is_zero() {
            return Err(SwapError::InsufficientInputAmount);
        }
        let tree = self.ctx.storage.as_ref();
        let c = self.ctx.config.commission_permille;
        let oc = self.ctx.config.order_commission_permille;
        let mut plan = WalkPlan::default();
        let mut remaining = amount_in;
        let mut rank = 0usize;

        while !remaining.is_zero() {
            let Some(order) = book.order_at(rank, tree)?.cloned() else {
                break;
            };

            // While the pool's marginal rate beats the order, serve from
            // the pool, stopping exactly at the order's price.
            if order.maker_rate() <= Price::new(r1, r0) {
                let step =
                    amm::amount_to_reach_price(r0, r1, order.want_sell, order.want_buy, c)?;
                if step >= remaining && !step.is_zero() {
                    break; // order price unreachable with the remaining input
                }
                if !step.is_zero() {
                    match amm::calculate_buy_for_sell(r0, r1, step, c) {
                        Ok(out) => {
                            plan.amm_in = plan.amm_in.checked_add(step).ok_or(SwapError::Overflow)?;
                            plan.amm_out =
                                plan.amm_out.checked_add(out).ok_or(SwapError::Overflow)?;
                            r0 = r0.checked_add(step).ok_or(SwapError::Overflow)?;
                            r1 -= out;
                        }
                        // A segment too small to produce output is donated
                        // to the pool rather than aborting the swap.
                        Err(MathError::InsufficientInputAmount) => {
                            plan.amm_in = plan.amm_in.checked_add(step).ok_or(SwapError::Overflow)?;
                            r0 = r0.checked_add(step).ok_or(SwapError::Overflow)?;
                        }
                        Err(err) => return Err(err.into()),
                    }
                    remaining -= step;
                    if remaining.is_zero() {
                        break;
                    }
                }
            }

            // Fill the order at its own price.
            if remaining < order.want_buy {
                let give = order.proceeds_for(remaining);
                plan.fills.push(FillPlan {
                    id: order.id,
                    take: remaining,
                    give,
                    fee0: permille_of(remaining, oc),
                    fee1: permille_of(give, oc),
                });
                remaining = U256::zero();
            } else {
                plan.fills.push(FillPlan {
                    id: order.id,
                    take: order.want_buy,
                    give: order.want_sell,
                    fee0: permille_of(order.want_buy, oc),
                    fee1: permille_of(order.want_sell, oc),
                });
                remaining -= order.want_buy;
                rank += 1;
            }
        }

        if !remaining.is_zero() {
            match amm::calculate_buy_for_sell(r0, r1, remaining, c) {
                Ok(out) => {
                    plan.amm_in = plan.amm_in.checked_add(remaining).ok_or(SwapError::Overflow)?;
                    plan.amm_out = plan.amm_out.checked_add(out).ok_or(SwapError::Overflow)?;
                }
                Err(MathError::InsufficientInputAmount) if !plan.fills.is_empty() => {
                    plan.amm_in = plan.amm_in.checked_add(remaining).ok_or(SwapError::Overflow)?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(plan)
    }

    fn plan_exact_output(
        &self,
        book: &mut BookSide,
        mut r0: U256,
        mut r1: U256,
        amount_out: U256,
    ) -> SwapResult<WalkPlan> {
        if amount_out.is_zero() {
            return Err(SwapError::InsufficientOutputAmount);
        }
        let tree = self.ctx.storage.as_ref();
        let c = self.ctx.config.commission_permille;
        let oc = self.ctx.config.order_commission_permille;
        let fee_net = U256::from(COMMISSION_BASE - oc);
        let mut plan = WalkPlan::default();
        let mut remaining_out = amount_out;
        let mut rank = 0usize;

        while !remaining_out.is_zero() {
            let Some(order) = book.order_at(rank, tree)?.cloned() else {
                break;
            };

            if order.maker_rate() <= Price::new(r1, r0) {
                let step =
                    amm::amount_to_reach_price(r0, r1, order.want_sell, order.want_buy, c)?;
                if !step.is_zero() {
                    match amm::calculate_buy_for_sell(r0, r1, step, c) {
                        Ok(seg_out) if seg_out >= remaining_out => {
                            // Satisfiable before reaching the order price.
                            break;
                        }
                        Ok(seg_out) => {
                            plan.amm_in = plan.amm_in.checked_add(step).ok_or(SwapError::Overflow)?;
                            plan.amm_out = plan
                                .amm_out
                                .checked_add(seg_out)
                                .ok_or(SwapError::Overflow)?;
                            r0 = r0.checked_add(step).ok_or(SwapError::Overflow)?;
                            r1 -= seg_out;
                            remaining_out -= seg_out;
                        }
                        Err(MathError::InsufficientInputAmount) => {
                            plan.amm_in = plan.amm_in.checked_add(step).ok_or(SwapError::Overflow)?;
                            r0 = r0.checked_add(step).ok_or(SwapError::Overflow)?;
                        }
                        Err(err) => return Err(err.into()),
                    }
                    if remaining_out.is_zero() {
                        break;
                    }
                    if order.maker_rate() <= Price::new(r1, r0) {
                        // Could not reach the order's price; remainder is
                        // served by the closing pool segment below.
                        break;
                    }
                }
            }

            let fee_full = permille_of(order.want_sell, oc);
            let net_full = order.want_sell - fee_full;
            if remaining_out < net_full {
                // Partial: gross escrow release whose net covers the rest.
                let gross = mul_div_ceil(remaining_out, U256::from(COMMISSION_BASE), fee_net)?
                    .min(order.want_sell);
                let take = mul_div_ceil(gross, order.want_buy, order.want_sell)?.min(order.want_buy);
                let fee1 = permille_of(gross, oc);
                plan.fills.push(FillPlan {
                    id: order.id,
                    take,
                    give: gross,
                    fee0: permille_of(take, oc),
                    fee1,
                });
                // Rounding guarantees the net covers the remainder; any
                // residue falls through to the closing pool segment.
                remaining_out = remaining_out.saturating_sub(gross - fee1);
                break;
            } else {
                plan.fills.push(FillPlan {
                    id: order.id,
                    take: order.want_buy,
                    give: order.want_sell,
                    fee0: permille_of(order.want_buy, oc),
                    fee1: fee_full,
                });
                remaining_out -= net_full;
                rank += 1;
            }
        }

        if !remaining_out.is_zero() {
            let need = amm::calculate_sell_for_buy(r0, r1, remaining_out, c)?;
            plan.amm_in = plan.amm_in.checked_add(need).ok_or(SwapError::Overflow)?;
            plan.amm_out = plan
                .amm_out
                .checked_add(remaining_out)
                .ok_or(SwapError::Overflow)?;
        }
        Ok(plan)
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    fn apply(&self, books: &mut Books, side: Side, plan: WalkPlan) -> SwapResult<SwapDetails> {
        let (r0, r1) = self.reserves();
        let c = self.ctx.config.commission_permille;

        // Validate the aggregate pool leg before mutating anything.
        if let Err(err) = amm::check_swap(plan.amm_in, plan.amm_out, r0, r1, c) {
            tracing::error!(
                pair = ?self.inner.key,
                amm_in = %plan.amm_in,
                amm_out = %plan.amm_out,
                "swap invariant check failed, aborting"
            );
            return Err(err.into());
        }

        let (amount_in, amount_out) = plan.totals()?;
        let (vc0, vc1) = self.coins();
        let minimum = U256::from(self.ctx.config.minimum_order_volume);
        let mut details = SwapDetails {
            amount_in,
            amount_out,
            fills: SmallVec::new(),
            expired: SmallVec::new(),
        };
        let mut fee0_total = U256::zero();
        let mut fee1_total = U256::zero();

        let book = books.side_mut(side);
        for fill in &plan.fills {
            book.unlink(fill.id);
            let order = book
                .get_mut(fill.id)
                .ok_or(SwapError::OrderNotFound(fill.id.raw()))?;
            let owner = order.owner;
            let complete = order.fill(fill.take, fill.give).map_err(SwapError::Storage)?;
            book.set_last_filled(fill.id);

            self.ctx.events.on_event(&SwapEvent::OrderFilled {
                id: fill.id,
                taken: fill.take,
                given: fill.give,
                complete,
            });

            let maker_credit = fill.take - fill.fee0;
            self.ctx.ledger.add_balance(owner, vc0, maker_credit);
            details.fills.push(OrderFill {
                id: fill.id,
                owner,
                coin: vc0,
                amount: maker_credit,
                complete,
            });

            if complete {
                book.tombstone(fill.id);
            } else {
                let dusty = book
                    .get(fill.id)
                    .map(|o| o.want_buy < minimum || o.want_sell < minimum)
                    .unwrap_or(false);
                if dusty {
                    let refund = match book.get_mut(fill.id) {
                        Some(order) => order.force_close().map_err(SwapError::Storage)?,
                        None => U256::zero(),
                    };
                    book.tombstone(fill.id);
                    self.ctx.ledger.add_balance(owner, vc1, refund);
                    self.ctx.events.on_event(&SwapEvent::OrderExpired {
                        id: fill.id,
                        refund_coin: vc1,
                        refund,
                    });
                    details.expired.push(ExpiredOrder {
                        id: fill.id,
                        owner,
                        coin: vc1,
                        refund,
                    });
                } else {
                    book.relink(fill.id);
                }
            }

            fee0_total = fee0_total.checked_add(fill.fee0).ok_or(SwapError::Overflow)?;
            fee1_total = fee1_total.checked_add(fill.fee1).ok_or(SwapError::Overflow)?;
        }

        if !book.head_is_sorted() {
            tracing::warn!(pair = ?self.inner.key, "book head out of order after fills");
        }

        // Reserve update: pool legs plus both commission streams.
        let new0 = r0
            .checked_add(plan.amm_in)
            .and_then(|v| v.checked_add(fee0_total))
            .ok_or(SwapError::Overflow)?;
        let new1 = r1
            .checked_sub(plan.amm_out)
            .ok_or(SwapError::InsufficientLiquidity)?
            .checked_add(fee1_total)
            .ok_or(SwapError::Overflow)?;
        self.store_reserves(new0, new1);

        let pool_in = plan.amm_in.checked_add(fee0_total).ok_or(SwapError::Overflow)?;
        self.ctx.checker.coin_added(vc0, pool_in);
        self.ctx.checker.coin_removed(vc1, plan.amm_out);
        if !fee1_total.is_zero() {
            self.ctx.checker.coin_added(vc1, fee1_total);
        }

        self.ctx.dirty.mark_pair(self.inner.key);
        if !plan.fills.is_empty() {
            self.ctx.dirty.mark_orders(self.inner.key);
        }
        self.ctx.events.on_event(&SwapEvent::Swap {
            pair: self.inner.key,
            coin_in: vc0,
            coin_out: vc1,
            amount_in,
            amount_out,
        });
        tracing::debug!(
            pair = ?self.inner.key,
            %amount_in,
            %amount_out,
            fills = details.fills.len(),
            "swap executed"
        );
        Ok(details)
    }
}
