// ============================================================================
// Pair Identity
// Canonical coin ordering and view orientation
// ============================================================================
//
// Exactly one pool exists per unordered coin set. The canonical key always
// holds the lower coin id first; callers that think in the opposite
// direction get a view carrying `Orientation::Reversed`, and every field
// access is translated through that orientation instead of ever swapping
// stored data.

use primitive_types::U256;

use super::coin::CoinId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which way a view looks at a canonical pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Orientation {
    /// View coin0 is the canonical coin0
    Forward,
    /// View coin0 is the canonical coin1
    Reversed,
}

impl Orientation {
    pub fn flip(self) -> Self {
        match self {
            Orientation::Forward => Orientation::Reversed,
            Orientation::Reversed => Orientation::Forward,
        }
    }

    pub fn is_forward(self) -> bool {
        matches!(self, Orientation::Forward)
    }
}

/// Canonical pair key: `coin0 < coin1` always holds.
///
/// Derived `Ord` sorts by (coin0, coin1), which matches the byte order of
/// the big-endian storage encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairKey {
    coin0: CoinId,
    coin1: CoinId,
}

impl PairKey {
    /// Canonicalize an unordered coin pair. Returns the key together with
    /// the orientation of the (a, b) view, or `None` for identical coins.
    pub fn ordered(a: CoinId, b: CoinId) -> Option<(PairKey, Orientation)> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some((Self { coin0: a, coin1: b }, Orientation::Forward)),
            std::cmp::Ordering::Greater => {
                Some((Self { coin0: b, coin1: a }, Orientation::Reversed))
            }
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn coin0(&self) -> CoinId {
        self.coin0
    }

    pub fn coin1(&self) -> CoinId {
        self.coin1
    }

    pub fn contains(&self, coin: CoinId) -> bool {
        self.coin0 == coin || self.coin1 == coin
    }

    /// The coin on the other side of `coin`, if `coin` belongs to the pair.
    pub fn other(&self, coin: CoinId) -> Option<CoinId> {
        if coin == self.coin0 {
            Some(self.coin1)
        } else if coin == self.coin1 {
            Some(self.coin0)
        } else {
            None
        }
    }

    /// (view coin0, view coin1) under the given orientation.
    pub fn coins_oriented(&self, orientation: Orientation) -> (CoinId, CoinId) {
        match orientation {
            Orientation::Forward => (self.coin0, self.coin1),
            Orientation::Reversed => (self.coin1, self.coin0),
        }
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.coin0.raw().to_be_bytes());
        out[4..].copy_from_slice(&self.coin1.raw().to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 8 {
            return None;
        }
        let coin0 = CoinId::new(u32::from_be_bytes(bytes[..4].try_into().ok()?));
        let coin1 = CoinId::new(u32::from_be_bytes(bytes[4..].try_into().ok()?));
        if coin0 >= coin1 {
            return None;
        }
        Some(Self { coin0, coin1 })
    }
}

/// Persisted pool state: numeric id plus canonical reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairData {
    pub id: u32,
    pub reserve0: U256,
    pub reserve1: U256,
}
