// ============================================================================
// Exact Rational Prices and Sortable Price Keys
// ============================================================================
//
// An order's price is the exact ratio of two 256-bit amounts. Comparisons
// cross-multiply into 512 bits, so they are exact for every representable
// amount; floating point never enters any consensus-relevant decision.
//
// For persistence the ratio is flattened into a fixed-width byte key whose
// plain byte order matches ascending numeric order: one biased-exponent byte
// followed by 18 ASCII decimal digits of the normalized mantissa. The store
// can then return orders best-price-first with a simple range scan, and the
// in-memory book sorts by the exact same key so paging never reorders.

use std::cmp::Ordering;
use std::fmt;

use primitive_types::{U256, U512};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of mantissa digits kept in a serialized price key.
pub const PRICE_KEY_DIGITS: usize = 18;

/// Total byte length of a serialized price key.
pub const PRICE_KEY_LEN: usize = 1 + PRICE_KEY_DIGITS;

const EXPONENT_BIAS: i32 = 128;

// ============================================================================
// Price
// ============================================================================

/// An exact price as a ratio of two amounts.
///
/// The denominator must be non-zero. Equality and ordering are rational:
/// `2/4 == 1/2`.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Price {
    num: U256,
    den: U256,
}

impl Price {
    pub fn new(num: U256, den: U256) -> Self {
        debug_assert!(!den.is_zero(), "price denominator must be non-zero");
        Self { num, den }
    }

    pub fn num(&self) -> U256 {
        self.num
    }

    pub fn den(&self) -> U256 {
        self.den
    }

    /// The reciprocal price. Only valid for non-zero numerators.
    pub fn inverse(&self) -> Price {
        Price::new(self.den, self.num)
    }

    /// Flatten into the sortable byte representation.
    pub fn key(&self) -> PriceKey {
        PriceKey::from_ratio(self.num, self.den)
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.num.full_mul(other.den) == other.num.full_mul(self.den)
    }
}

impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.num
            .full_mul(other.den)
            .cmp(&other.num.full_mul(self.den))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

// ============================================================================
// PriceKey
// ============================================================================

/// Fixed-width byte encoding of a price whose byte order equals numeric
/// order: `[biased exponent][18 mantissa digits]`.
///
/// Ratios that agree to 18 significant digits collapse to the same key;
/// such ties are broken by order id everywhere a key is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceKey([u8; PRICE_KEY_LEN]);

impl PriceKey {
    /// Sorts before every encodable price.
    pub const MIN: PriceKey = PriceKey([0u8; PRICE_KEY_LEN]);

    /// Encode `num / den` by decimal long division.
    ///
    /// A zero numerator yields [`PriceKey::MIN`]; a zero denominator yields
    /// a key that sorts after every finite price. Neither occurs for resting
    /// orders, which always have non-zero amounts on both sides.
    pub fn from_ratio(num: U256, den: U256) -> Self {
        if num.is_zero() {
            return Self::MIN;
        }
        if den.is_zero() {
            return PriceKey([0xff; PRICE_KEY_LEN]);
        }

        let ten = U512::from(10u64);
        let wide_den = U512::from(den);
        let mut rem = U512::from(num % den);
        let mut digits: [u8; PRICE_KEY_DIGITS] = [b'0'; PRICE_KEY_DIGITS];
        let mut filled = 0usize;
        let exponent;

        let quot = num / den;
        if quot.is_zero() {
            // Pure fraction: count leading zeros to find the exponent, then
            // collect significant digits.
            let mut zeros = 0i32;
            while filled < PRICE_KEY_DIGITS {
                rem = rem * ten;
                let d = (rem / wide_den).low_u64() as u8;
                rem = rem % wide_den;
                if d == 0 && filled == 0 {
                    zeros += 1;
                    continue;
                }
                digits[filled] = b'0' + d;
                filled += 1;
            }
            exponent = -zeros - 1;
        } else {
            let int_digits = quot.to_string().into_bytes();
            exponent = int_digits.len() as i32 - 1;
            for d in int_digits.into_iter().take(PRICE_KEY_DIGITS) {
                digits[filled] = d;
                filled += 1;
            }
            while filled < PRICE_KEY_DIGITS {
                rem = rem * ten;
                let d = (rem / wide_den).low_u64() as u8;
                rem = rem % wide_den;
                digits[filled] = b'0' + d;
                filled += 1;
            }
        }

        // |exponent| <= 78 for 256-bit operands, so the bias cannot wrap.
        let mut key = [0u8; PRICE_KEY_LEN];
        key[0] = (exponent + EXPONENT_BIAS) as u8;
        key[1..].copy_from_slice(&digits);
        PriceKey(key)
    }

    pub fn as_bytes(&self) -> &[u8; PRICE_KEY_LEN] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; PRICE_KEY_LEN] = bytes.try_into().ok()?;
        Some(PriceKey(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn price(num: u128, den: u128) -> Price {
        Price::new(U256::from(num), U256::from(den))
    }

    #[test]
    fn test_rational_equality() {
        assert_eq!(price(1, 2), price(2, 4));
        assert_eq!(price(3, 1), price(300, 100));
        assert_ne!(price(1, 3), price(1, 2));
    }

    #[test]
    fn test_exact_ordering() {
        assert!(price(1, 3) < price(1, 2));
        assert!(price(2, 1) > price(1, 2));
        // 333333/1000000 < 1/3: only exact arithmetic gets this right.
        assert!(price(333_333, 1_000_000) < price(1, 3));
        assert!(price(333_334, 1_000_000) > price(1, 3));
    }

    #[test]
    fn test_inverse() {
        assert_eq!(price(1, 3).inverse(), price(3, 1));
    }

    #[test]
    fn test_key_layout_integer() {
        // 3/1 = 3.0e0: exponent byte 128, mantissa "3" then zeros.
        let key = PriceKey::from_ratio(U256::from(3u64), U256::from(1u64));
        let bytes = key.as_bytes();
        assert_eq!(bytes[0], 128);
        assert_eq!(bytes[1], b'3');
        assert!(bytes[2..].iter().all(|&b| b == b'0'));
    }

    #[test]
    fn test_key_layout_fraction() {
        // 1/2 = 5.0e-1: exponent byte 127, mantissa "5" then zeros.
        let key = PriceKey::from_ratio(U256::from(1u64), U256::from(2u64));
        let bytes = key.as_bytes();
        assert_eq!(bytes[0], 127);
        assert_eq!(bytes[1], b'5');
        assert!(bytes[2..].iter().all(|&b| b == b'0'));
    }

    #[test]
    fn test_key_repeating_fraction() {
        // 1/3 = 3.33...e-1
        let key = PriceKey::from_ratio(U256::from(1u64), U256::from(3u64));
        let bytes = key.as_bytes();
        assert_eq!(bytes[0], 127);
        assert!(bytes[1..].iter().all(|&b| b == b'3'));
    }

    #[test]
    fn test_key_order_matches_price_order() {
        let cases = [
            (1u128, 1_000_000u128),
            (1, 3),
            (1, 2),
            (999_999, 1_000_000),
            (1, 1),
            (1_000_001, 1_000_000),
            (3, 1),
            (1_000_000, 1),
        ];
        for window in cases.windows(2) {
            let (an, ad) = window[0];
            let (bn, bd) = window[1];
            let ka = PriceKey::from_ratio(U256::from(an), U256::from(ad));
            let kb = PriceKey::from_ratio(U256::from(bn), U256::from(bd));
            assert!(ka < kb, "{an}/{ad} vs {bn}/{bd}");
        }
    }

    #[test]
    fn test_key_equal_for_equal_ratios() {
        let a = PriceKey::from_ratio(U256::from(2u64), U256::from(4u64));
        let b = PriceKey::from_ratio(U256::from(1u64), U256::from(2u64));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_round_trip_bytes() {
        let key = PriceKey::from_ratio(U256::from(7u64), U256::from(11u64));
        let restored = PriceKey::from_slice(key.as_bytes()).unwrap();
        assert_eq!(key, restored);
        assert!(PriceKey::from_slice(&[0u8; 5]).is_none());
    }

    proptest! {
        #[test]
        fn prop_key_order_is_consistent(
            an in 1u128..u128::MAX,
            ad in 1u128..u128::MAX,
            bn in 1u128..u128::MAX,
            bd in 1u128..u128::MAX,
        ) {
            let pa = price(an, ad);
            let pb = price(bn, bd);
            let ka = pa.key();
            let kb = pb.key();
            match pa.cmp(&pb) {
                Ordering::Less => prop_assert!(ka <= kb),
                Ordering::Greater => prop_assert!(ka >= kb),
                Ordering::Equal => prop_assert_eq!(ka, kb),
            }
        }

        #[test]
        fn prop_cmp_agrees_with_f64_far_from_ties(
            an in 1u64..u64::MAX,
            ad in 1u64..u64::MAX,
            bn in 1u64..u64::MAX,
            bd in 1u64..u64::MAX,
        ) {
            let exact = price(an as u128, ad as u128).cmp(&price(bn as u128, bd as u128));
            let fa = an as f64 / ad as f64;
            let fb = bn as f64 / bd as f64;
            // Only check when floats are unambiguous.
            if (fa - fb).abs() > f64::EPSILON * fa.max(fb) * 4.0 {
                let approx = if fa < fb { Ordering::Less } else { Ordering::Greater };
                prop_assert_eq!(exact, approx);
            }
        }
    }
}
