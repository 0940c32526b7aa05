// ============================================================================
// Pair Registry
// Pair lifecycle, shared engine context and the deterministic commit
// ============================================================================
//
// The registry owns the shared engine context (storage handle, config,
// collaborator sinks, id counters and the dirty sets) and hands out pair
// views. Pairs hydrate lazily from storage on first access and stay cached.
//
// Commit writes every uncommitted change out in a fixed order so every
// replica produces an identical write sequence: counters first, then dirty
// pair data in descending pair-key order, then dirty books in descending
// pair-key order with each book flushing its orders in ascending id order.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use primitive_types::U256;

use crate::domain::coin::CoinId;
use crate::domain::config::SwapConfig;
use crate::domain::pair::{Orientation, PairKey};
use crate::error::{SwapError, SwapResult};
use crate::interfaces::{AccountLedger, EventSink, InvariantChecker, SwapEvent};
use crate::storage::{codec, keys, Tree};

use super::pair::{Pair, PairInner};

// ============================================================================
// Shared context
// ============================================================================

/// Dirty-state tracker shared by every pair view. Opaque to callers; views
/// mark, commit drains.
#[derive(Default)]
pub(crate) struct DirtyState {
    pairs: Mutex<BTreeSet<PairKey>>,
    orders: Mutex<BTreeSet<PairKey>>,
}

impl DirtyState {
    pub fn mark_pair(&self, key: PairKey) {
        self.pairs.lock().insert(key);
    }

    pub fn mark_orders(&self, key: PairKey) {
        self.orders.lock().insert(key);
    }

    fn take_pairs(&self) -> BTreeSet<PairKey> {
        std::mem::take(&mut self.pairs.lock())
    }

    fn take_orders(&self) -> BTreeSet<PairKey> {
        std::mem::take(&mut self.orders.lock())
    }
}

/// Lazily hydrated persisted counter.
#[derive(Default)]
struct Counter {
    value: Option<u32>,
    dirty: bool,
}

impl Counter {
    fn hydrate(&mut self, tree: &dyn Tree, key: &[u8]) -> SwapResult<u32> {
        if let Some(value) = self.value {
            return Ok(value);
        }
        let value = match tree.get(key) {
            Some(bytes) => codec::decode_counter(&bytes)?,
            None => 0,
        };
        self.value = Some(value);
        Ok(value)
    }

    fn allocate(&mut self, tree: &dyn Tree, key: &[u8]) -> SwapResult<u32> {
        let value = self.hydrate(tree, key)?;
        self.value = Some(value + 1);
        self.dirty = true;
        Ok(value)
    }

    fn flush(&mut self, tree: &dyn Tree, key: &[u8]) {
        if self.dirty {
            if let Some(value) = self.value {
                tree.set(key, codec::encode_counter(value));
            }
            self.dirty = false;
        }
    }
}

/// Everything pair views need from their registry.
pub(crate) struct EngineCtx {
    pub storage: Arc<dyn Tree>,
    pub config: SwapConfig,
    pub ledger: Arc<dyn AccountLedger>,
    pub checker: Arc<dyn InvariantChecker>,
    pub events: Arc<dyn EventSink>,
    pub dirty: DirtyState,
    next_pair_id: Mutex<Counter>,
    next_order_id: Mutex<Counter>,
}

impl EngineCtx {
    pub(crate) fn new(
        storage: Arc<dyn Tree>,
        config: SwapConfig,
        ledger: Arc<dyn AccountLedger>,
        checker: Arc<dyn InvariantChecker>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            storage,
            config,
            ledger,
            checker,
            events,
            dirty: DirtyState::default(),
            next_pair_id: Mutex::new(Counter::default()),
            next_order_id: Mutex::new(Counter::default()),
        }
    }

    pub fn allocate_pair_id(&self) -> SwapResult<u32> {
        self.next_pair_id
            .lock()
            .allocate(self.storage.as_ref(), &keys::next_pair_id_key())
    }

    pub fn allocate_order_id(&self) -> SwapResult<u32> {
        self.next_order_id
            .lock()
            .allocate(self.storage.as_ref(), &keys::next_order_id_key())
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct PairRegistry {
    ctx: Arc<EngineCtx>,
    pairs: RwLock<HashMap<PairKey, Arc<PairInner>>>,
}

impl PairRegistry {
    pub(crate) fn from_ctx(ctx: EngineCtx) -> Self {
        Self {
            ctx: Arc::new(ctx),
            pairs: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SwapConfig {
        &self.ctx.config
    }

    fn view(&self, inner: Arc<PairInner>, orientation: Orientation) -> Pair {
        Pair::new(inner, orientation, Arc::clone(&self.ctx))
    }

    /// Look up the pair for two coins, hydrating from storage if needed.
    /// The returned view is oriented so its coin0 is `a`.
    pub fn pair(&self, a: CoinId, b: CoinId) -> SwapResult<Option<Pair>> {
        let (key, orientation) = PairKey::ordered(a, b).ok_or(SwapError::IdenticalCoins)?;
        if let Some(inner) = self.pairs.read().get(&key) {
            return Ok(Some(self.view(Arc::clone(inner), orientation)));
        }

        let Some(blob) = self.ctx.storage.get(&keys::pair_data_key(&key)) else {
            return Ok(None);
        };
        let data = codec::decode_pair(&blob)?;
        let mut pairs = self.pairs.write();
        let inner = pairs.entry(key).or_insert_with(|| {
            Arc::new(PairInner::new(
                key,
                data.id,
                data.reserve0,
                data.reserve1,
                self.ctx.config.order_page_size,
            ))
        });
        Ok(Some(self.view(Arc::clone(inner), orientation)))
    }

    /// Create and fund a new pair. Fails if the pair exists. Returns the
    /// view oriented to (a, b) and the initial liquidity.
    pub fn create_pair(
        &self,
        a: CoinId,
        b: CoinId,
        amount0: U256,
        amount1: U256,
    ) -> SwapResult<(Pair, U256)> {
        let (key, orientation) = PairKey::ordered(a, b).ok_or(SwapError::IdenticalCoins)?;
        if self.pair(a, b)?.is_some() {
            return Err(SwapError::PairExists);
        }

        let id = self.ctx.allocate_pair_id()?;
        let inner = Arc::new(PairInner::new(
            key,
            id,
            U256::zero(),
            U256::zero(),
            self.ctx.config.order_page_size,
        ));
        let view = self.view(Arc::clone(&inner), orientation);
        // Fund before publishing so no other access observes empty reserves.
        let liquidity = view.create_liquidity(amount0, amount1)?;
        self.pairs.write().insert(key, inner);

        self.ctx.events.on_event(&SwapEvent::PairCreated { pair: key, id });
        tracing::info!(pair = ?key, id, "pair created");
        Ok((view, liquidity))
    }

    /// Idempotent get-or-create: an existing pair is returned untouched
    /// (the amounts are ignored), otherwise the pair is created and funded.
    pub fn return_pair(
        &self,
        a: CoinId,
        b: CoinId,
        amount0: U256,
        amount1: U256,
    ) -> SwapResult<Pair> {
        if let Some(pair) = self.pair(a, b)? {
            return Ok(pair);
        }
        Ok(self.create_pair(a, b, amount0, amount1)?.0)
    }

    /// Every pair key known to storage or memory, ascending.
    pub fn pair_keys(&self) -> SwapResult<Vec<PairKey>> {
        let mut found: BTreeSet<PairKey> = self.pairs.read().keys().copied().collect();
        let prefix = keys::pair_prefix();
        let end = keys::prefix_end(&prefix);
        for (key, _) in self.ctx.storage.range(&prefix, &end, usize::MAX) {
            let pair = PairKey::from_bytes(&key[prefix.len()..])
                .ok_or_else(|| SwapError::Storage("malformed pair data key".to_string()))?;
            found.insert(pair);
        }
        Ok(found.into_iter().collect())
    }

    /// Write all uncommitted state for ledger version `version`.
    pub fn commit(&self, version: u64) -> SwapResult<()> {
        let tree = self.ctx.storage.as_ref();

        self.ctx
            .next_pair_id
            .lock()
            .flush(tree, &keys::next_pair_id_key());
        self.ctx
            .next_order_id
            .lock()
            .flush(tree, &keys::next_order_id_key());

        let dirty_pairs = self.ctx.dirty.take_pairs();
        let pair_count = dirty_pairs.len();
        {
            let pairs = self.pairs.read();
            for key in dirty_pairs.iter().rev() {
                let Some(inner) = pairs.get(key) else {
                    return Err(SwapError::Storage(format!(
                        "dirty pair {key:?} not resident"
                    )));
                };
                let (reserve0, reserve1) = *inner.reserves.read();
                let data = crate::domain::pair::PairData {
                    id: inner.id,
                    reserve0,
                    reserve1,
                };
                tree.set(&keys::pair_data_key(key), codec::encode_pair(&data));
            }
        }

        let dirty_orders = self.ctx.dirty.take_orders();
        let mut order_writes = 0usize;
        {
            let pairs = self.pairs.read();
            for key in dirty_orders.iter().rev() {
                let Some(inner) = pairs.get(key) else {
                    return Err(SwapError::Storage(format!(
                        "dirty book {key:?} not resident"
                    )));
                };
                let mut books = inner.books.lock();
                if books.bid.has_uncommitted() {
                    order_writes += books.bid.flush(tree)?;
                }
                if books.ask.has_uncommitted() {
                    order_writes += books.ask.flush(tree)?;
                }
            }
        }

        tracing::debug!(version, pairs = pair_count, orders = order_writes, "state committed");
        Ok(())
    }
}
