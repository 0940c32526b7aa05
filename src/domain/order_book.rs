// ============================================================================
// Lazy Paginated Book Side
// ============================================================================
//
// One side of a pair's order book. Orders are kept best-for-taker first,
// sorted by (price key, order id). Only a prefix is resident: `loaded` holds
// the merged, sorted prefix; deeper orders are paged in from the storage
// index on demand, `page_size` entries at a time, resuming from `cursor`.
//
// In-memory mutations never touch storage until commit. New or resorted
// orders whose position falls beyond the pagination frontier wait in the
// `pending` overlay and are merged in as paging catches up to them. When a
// paged index entry collides with an id the book already knows, the
// in-memory version wins unconditionally.

use std::collections::{BTreeSet, HashMap};

use crate::error::{SwapError, SwapResult};
use crate::numeric::PriceKey;
use crate::storage::{codec, keys, Tree};

use super::order::{Order, OrderId, Side};
use super::pair::PairKey;

/// Position of an order in a side's total order.
type BookPos = (PriceKey, OrderId);

pub struct BookSide {
    pair: PairKey,
    side: Side,
    page_size: usize,
    /// Every in-memory order, including tombstones awaiting commit
    orders: HashMap<OrderId, Order>,
    /// Sorted resident prefix, best first
    loaded: Vec<OrderId>,
    /// In-memory orders positioned beyond the pagination frontier
    pending: BTreeSet<BookPos>,
    /// Tombstones whose disk records must be removed on commit
    deleted: BTreeSet<OrderId>,
    /// Orders needing (re)serialization on commit
    dirty: BTreeSet<OrderId>,
    /// Last storage index entry consumed; the next page starts after it
    cursor: Option<BookPos>,
    /// Storage index fully consumed
    exhausted: bool,
    /// Most recently filled order on this side
    last_filled: Option<OrderId>,
}

impl BookSide {
    pub fn new(pair: PairKey, side: Side, page_size: usize) -> Self {
        Self {
            pair,
            side,
            page_size: page_size.max(1),
            orders: HashMap::new(),
            loaded: Vec::new(),
            pending: BTreeSet::new(),
            deleted: BTreeSet::new(),
            dirty: BTreeSet::new(),
            cursor: None,
            exhausted: false,
            last_filled: None,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn pair(&self) -> PairKey {
        self.pair
    }

    pub fn last_filled(&self) -> Option<OrderId> {
        self.last_filled
    }

    pub fn set_last_filled(&mut self, id: OrderId) {
        self.last_filled = Some(id);
    }

    pub fn has_uncommitted(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Number of orders currently resident in the sorted prefix.
    pub fn loaded_len(&self) -> usize {
        self.loaded.len()
    }

    // ------------------------------------------------------------------
    // Position bookkeeping
    // ------------------------------------------------------------------

    fn sort_pos(&self, id: OrderId) -> BookPos {
        self.orders
            .get(&id)
            .map(|o| o.sort_key())
            .unwrap_or((PriceKey::MIN, id))
    }

    /// A position belongs to the resident prefix if paging has already
    /// moved past it.
    fn in_prefix(&self, pos: BookPos) -> bool {
        if self.exhausted {
            return true;
        }
        match self.cursor {
            Some(frontier) => pos <= frontier,
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Add a fresh order to the side.
    pub fn insert(&mut self, order: Order) {
        let id = order.id;
        let pos = order.sort_key();
        self.orders.insert(id, order);
        self.dirty.insert(id);
        if self.in_prefix(pos) {
            let at = self.loaded.partition_point(|&x| self.sort_pos(x) < pos);
            self.loaded.insert(at, id);
        } else {
            self.pending.insert(pos);
        }
    }

    /// Detach an order from its sorted position. Must be called before
    /// mutating amounts, while the cached key still matches the position.
    pub fn unlink(&mut self, id: OrderId) {
        let pos = match self.orders.get(&id) {
            Some(order) => order.sort_key(),
            None => return,
        };
        if self.pending.remove(&pos) {
            return;
        }
        let at = self.loaded.partition_point(|&x| self.sort_pos(x) < pos);
        if self.loaded.get(at) == Some(&id) {
            self.loaded.remove(at);
        } else if let Some(found) = self.loaded.iter().position(|&x| x == id) {
            self.loaded.remove(found);
        }
    }

    /// Re-attach an order at the position of its current key.
    pub fn relink(&mut self, id: OrderId) {
        let pos = match self.orders.get(&id) {
            Some(order) => order.sort_key(),
            None => return,
        };
        if self.in_prefix(pos) {
            let at = self.loaded.partition_point(|&x| self.sort_pos(x) < pos);
            self.loaded.insert(at, id);
        } else {
            self.pending.insert(pos);
        }
    }

    /// Record a terminal order for commit-time cleanup. The order must
    /// already be unlinked.
    pub fn tombstone(&mut self, id: OrderId) {
        let persisted = match self.orders.get(&id) {
            Some(order) => order.stored_key.is_some(),
            None => return,
        };
        if persisted {
            self.deleted.insert(id);
            self.dirty.insert(id);
        } else {
            // Never reached disk: forget it entirely.
            self.orders.remove(&id);
            self.dirty.remove(&id);
        }
    }

    /// Whether the side knows this id at all, tombstones included. A true
    /// result means the in-memory version supersedes anything on disk.
    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    /// Bring a storage-resident order into the overlay without linking it
    /// into the sorted prefix. Used for point mutations (cancel) of orders
    /// beyond the pagination frontier; paging skips ids it already knows.
    pub(crate) fn adopt(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Cheap structural check of the resident prefix head, used to detect
    /// mis-sorted state after fill bookkeeping.
    pub fn head_is_sorted(&self) -> bool {
        self.loaded.len() < 2
            || self.sort_pos(self.loaded[0]) <= self.sort_pos(self.loaded[1])
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id).filter(|o| !o.state.is_terminal())
    }

    /// Mutable access; marks the order dirty. Terminal orders are hidden.
    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        if self.orders.get(&id).map_or(true, |o| o.state.is_terminal()) {
            return None;
        }
        self.dirty.insert(id);
        self.orders.get_mut(&id)
    }

    // ------------------------------------------------------------------
    // Paged traversal
    // ------------------------------------------------------------------

    /// Id of the order at rank `index` (0 = best), paging from storage as
    /// needed.
    pub fn order_id_at(&mut self, index: usize, tree: &dyn Tree) -> SwapResult<Option<OrderId>> {
        while self.loaded.len() <= index && !(self.exhausted && self.pending.is_empty()) {
            self.load_page(tree)?;
        }
        Ok(self.loaded.get(index).copied())
    }

    /// The order at rank `index`, paging from storage as needed.
    pub fn order_at(&mut self, index: usize, tree: &dyn Tree) -> SwapResult<Option<&Order>> {
        match self.order_id_at(index, tree)? {
            Some(id) => Ok(self.orders.get(&id)),
            None => Ok(None),
        }
    }

    fn load_page(&mut self, tree: &dyn Tree) -> SwapResult<()> {
        if !self.exhausted {
            let prefix = keys::order_index_prefix(&self.pair, self.side);
            let start = match &self.cursor {
                Some((price, id)) => {
                    keys::key_after(&keys::order_index_key(&self.pair, self.side, price, *id))
                }
                None => prefix.clone(),
            };
            let end = keys::prefix_end(&prefix);
            let entries = tree.range(&start, &end, self.page_size);
            let fetched = entries.len();

            for (key, _) in entries {
                let (price, id) = keys::decode_index_entry(&key)
                    .ok_or_else(|| SwapError::Storage("malformed order index key".to_string()))?;
                self.cursor = Some((price, id));
                if self.orders.contains_key(&id) {
                    // In-memory overlay wins; its entry merges via pending.
                    continue;
                }
                let blob = tree
                    .get(&keys::order_blob_key(id))
                    .ok_or_else(|| SwapError::Storage(format!("order {id} blob missing")))?;
                let mut order = codec::decode_order(&blob)?;
                if order.pair != self.pair || order.side != self.side {
                    return Err(SwapError::Storage(format!(
                        "order {id} does not belong to this book side"
                    )));
                }
                order.stored_key = Some(price);
                self.drain_pending_below((price, id));
                self.orders.insert(id, order);
                self.loaded.push(id);
            }

            if fetched < self.page_size {
                self.exhausted = true;
            }
        }
        if self.exhausted {
            while let Some(pos) = self.pending.pop_first() {
                self.loaded.push(pos.1);
            }
        }
        Ok(())
    }

    fn drain_pending_below(&mut self, bound: BookPos) {
        while let Some(&first) = self.pending.first() {
            if first < bound {
                self.pending.remove(&first);
                self.loaded.push(first.1);
            } else {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Write every dirty order out: tombstones delete their blob and index
    /// entry, live orders rewrite their blob and relocate their index entry
    /// if the key changed. Iterates in ascending id order.
    pub fn flush(&mut self, tree: &dyn Tree) -> SwapResult<usize> {
        let dirty = std::mem::take(&mut self.dirty);
        let mut written = 0usize;
        for id in dirty {
            if self.deleted.remove(&id) {
                if let Some(order) = self.orders.remove(&id) {
                    tree.remove(&keys::order_blob_key(id));
                    if let Some(old) = order.stored_key {
                        tree.remove(&keys::order_index_key(&self.pair, self.side, &old, id));
                    }
                }
                written += 1;
            } else if let Some(order) = self.orders.get_mut(&id) {
                tree.set(&keys::order_blob_key(id), codec::encode_order(order));
                let new_key = order.price_key();
                if order.stored_key != Some(new_key) {
                    if let Some(old) = order.stored_key {
                        tree.remove(&keys::order_index_key(&self.pair, self.side, &old, id));
                    }
                    tree.set(
                        &keys::order_index_key(&self.pair, self.side, &new_key, id),
                        id.raw().to_be_bytes().to_vec(),
                    );
                    order.stored_key = Some(new_key);
                }
                written += 1;
            }
        }
        Ok(written)
    }
}
