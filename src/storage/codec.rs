// ============================================================================
// Persisted Record Codec
// ============================================================================
//
// Hand-written big-endian encoding with length-prefixed amounts. Amounts
// strip leading zero bytes so small values stay small on disk. Order blobs
// carry a version byte: version 2 is current, version 1 (no creation
// height) is still decoded for records written before heights were kept.

use primitive_types::U256;

use crate::domain::coin::{Address, CoinId};
use crate::domain::order::{Order, OrderId, Side};
use crate::domain::pair::{PairData, PairKey};
use crate::error::{SwapError, SwapResult};

/// Version written for new order blobs.
pub const ORDER_CODEC_VERSION: u8 = 2;

// ============================================================================
// Primitives
// ============================================================================

fn put_u256(buf: &mut Vec<u8>, value: U256) {
    let be = value.to_big_endian();
    let first = be.iter().position(|&b| b != 0).unwrap_or(32);
    buf.push((32 - first) as u8);
    buf.extend_from_slice(&be[first..]);
}

/// Sequential reader over a persisted record.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> SwapResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| SwapError::Storage("record truncated".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> SwapResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> SwapResult<u32> {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(arr))
    }

    fn u64(&mut self) -> SwapResult<u64> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(arr))
    }

    fn u256(&mut self) -> SwapResult<U256> {
        let len = self.u8()? as usize;
        if len > 32 {
            return Err(SwapError::Storage(format!("amount length {len} exceeds 32")));
        }
        Ok(U256::from_big_endian(self.take(len)?))
    }

    fn finish(&self) -> SwapResult<()> {
        if self.pos != self.bytes.len() {
            return Err(SwapError::Storage(format!(
                "{} trailing bytes in record",
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Pair data
// ============================================================================

pub fn encode_pair(data: &PairData) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + 2 + 64);
    buf.extend_from_slice(&data.id.to_be_bytes());
    put_u256(&mut buf, data.reserve0);
    put_u256(&mut buf, data.reserve1);
    buf
}

pub fn decode_pair(bytes: &[u8]) -> SwapResult<PairData> {
    let mut cursor = Cursor::new(bytes);
    let id = cursor.u32()?;
    let reserve0 = cursor.u256()?;
    let reserve1 = cursor.u256()?;
    cursor.finish()?;
    Ok(PairData {
        id,
        reserve0,
        reserve1,
    })
}

// ============================================================================
// Order blobs
// ============================================================================

pub fn encode_order(order: &Order) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 4 + 8 + 1 + 20 + 8 + 2 + 64);
    buf.push(ORDER_CODEC_VERSION);
    buf.extend_from_slice(&order.id.raw().to_be_bytes());
    buf.extend_from_slice(&order.pair.to_bytes());
    buf.push(order.side.byte());
    buf.extend_from_slice(order.owner.as_bytes());
    buf.extend_from_slice(&order.created_height.to_be_bytes());
    put_u256(&mut buf, order.want_buy);
    put_u256(&mut buf, order.want_sell);
    buf
}

pub fn decode_order(bytes: &[u8]) -> SwapResult<Order> {
    let mut cursor = Cursor::new(bytes);
    let version = cursor.u8()?;
    if version != 1 && version != ORDER_CODEC_VERSION {
        return Err(SwapError::Storage(format!(
            "unknown order codec version {version}"
        )));
    }

    let id = OrderId::new(cursor.u32()?);
    let pair = PairKey::from_bytes(cursor.take(8)?)
        .ok_or_else(|| SwapError::Storage("malformed pair key in order".to_string()))?;
    let side = Side::from_byte(cursor.u8()?)
        .ok_or_else(|| SwapError::Storage("malformed side byte in order".to_string()))?;
    let mut owner_bytes = [0u8; 20];
    owner_bytes.copy_from_slice(cursor.take(20)?);
    let owner = Address::new(owner_bytes);
    let created_height = if version >= 2 { cursor.u64()? } else { 0 };
    let want_buy = cursor.u256()?;
    let want_sell = cursor.u256()?;
    cursor.finish()?;

    Ok(Order::new(
        id,
        pair,
        side,
        want_buy,
        want_sell,
        owner,
        created_height,
    ))
}

// ============================================================================
// Counters
// ============================================================================

pub fn encode_counter(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_counter(bytes: &[u8]) -> SwapResult<u32> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| SwapError::Storage("malformed counter".to_string()))?;
    Ok(u32::from_be_bytes(arr))
}
