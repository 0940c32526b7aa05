// ============================================================================
// Persisted Key Layout
// ============================================================================
//
// Every key lives under a single namespace byte followed by a kind byte:
//
//   s p <coin0 be4> <coin1 be4>                      pair data
//   s o <coin0 be4> <coin1 be4> <side> <price> <id>  order index (value: id)
//   s b <id be4>                                     order blob
//   s i                                              next pair id counter
//   s j                                              next order id counter
//
// The order index key embeds the sortable price key, so an ascending range
// scan over one side's prefix yields orders best-for-taker first, ties
// broken by ascending order id.

use crate::domain::order::{OrderId, Side};
use crate::domain::pair::PairKey;
use crate::numeric::{PriceKey, PRICE_KEY_LEN};

pub const NAMESPACE: u8 = b's';
pub const KIND_PAIR: u8 = b'p';
pub const KIND_ORDER_INDEX: u8 = b'o';
pub const KIND_ORDER_BLOB: u8 = b'b';
pub const KIND_NEXT_PAIR_ID: u8 = b'i';
pub const KIND_NEXT_ORDER_ID: u8 = b'j';

pub fn pair_data_key(pair: &PairKey) -> Vec<u8> {
    let mut key = Vec::with_capacity(10);
    key.push(NAMESPACE);
    key.push(KIND_PAIR);
    key.extend_from_slice(&pair.to_bytes());
    key
}

/// Prefix covering every pair data record.
pub fn pair_prefix() -> Vec<u8> {
    vec![NAMESPACE, KIND_PAIR]
}

/// Prefix covering one side of one pair's order index.
pub fn order_index_prefix(pair: &PairKey, side: Side) -> Vec<u8> {
    let mut key = Vec::with_capacity(11);
    key.push(NAMESPACE);
    key.push(KIND_ORDER_INDEX);
    key.extend_from_slice(&pair.to_bytes());
    key.push(side.byte());
    key
}

pub fn order_index_key(pair: &PairKey, side: Side, price: &PriceKey, id: OrderId) -> Vec<u8> {
    let mut key = order_index_prefix(pair, side);
    key.extend_from_slice(price.as_bytes());
    key.extend_from_slice(&id.raw().to_be_bytes());
    key
}

pub fn order_blob_key(id: OrderId) -> Vec<u8> {
    let mut key = Vec::with_capacity(6);
    key.push(NAMESPACE);
    key.push(KIND_ORDER_BLOB);
    key.extend_from_slice(&id.raw().to_be_bytes());
    key
}

pub fn next_pair_id_key() -> Vec<u8> {
    vec![NAMESPACE, KIND_NEXT_PAIR_ID]
}

pub fn next_order_id_key() -> Vec<u8> {
    vec![NAMESPACE, KIND_NEXT_ORDER_ID]
}

/// Exclusive upper bound for a range scan over `prefix`.
///
/// None of the engine's prefixes end in 0xff, so incrementing the last
/// byte is always sufficient.
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    if let Some(last) = end.last_mut() {
        debug_assert!(*last < 0xff);
        *last += 1;
    }
    end
}

/// Smallest key strictly greater than `key`.
pub fn key_after(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0);
    next
}

/// Recover (price key, order id) from a full order index key.
pub fn decode_index_entry(key: &[u8]) -> Option<(PriceKey, OrderId)> {
    // namespace + kind + pair + side = 11 bytes of prefix
    let suffix = key.get(11..)?;
    if suffix.len() != PRICE_KEY_LEN + 4 {
        return None;
    }
    let price = PriceKey::from_slice(&suffix[..PRICE_KEY_LEN])?;
    let id = u32::from_be_bytes(suffix[PRICE_KEY_LEN..].try_into().ok()?);
    Some((price, OrderId::new(id)))
}
