// ============================================================================
// Constant-Product Math Kernel
// Pure integer formulas shared by swap execution, quoting and liquidity ops
// ============================================================================
//
// All amounts are 256-bit unsigned integers. Intermediate products widen to
// 512 bits; anything that would not fit in 512 bits is rejected with
// `MathError::Overflow`. No floating point is used anywhere: identical inputs
// must produce identical outputs on every replica.
//
// The commission is expressed in permille (units per 1000). Outputs are
// rounded down and then reduced by one base unit, inputs are rounded up and
// then increased by one base unit, so every rounding error favors the pool.

use primitive_types::{U256, U512};

use super::errors::{MathError, MathResult};

/// Denominator of the permille commission representation.
pub const COMMISSION_BASE: u64 = 1000;

/// Narrow a 512-bit intermediate back to 256 bits.
fn narrow(value: U512) -> MathResult<U256> {
    U256::try_from(value).map_err(|_| MathError::Overflow)
}

/// Integer square root of a 512-bit value via Newton iteration.
///
/// The result always fits in 256 bits because the argument is below 2^512.
pub(crate) fn isqrt(n: U512) -> U512 {
    if n.is_zero() {
        return U512::zero();
    }
    // Start above the true root so the iteration decreases monotonically.
    let mut x = U512::one() << ((n.bits() + 1) / 2);
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Output of coin1 obtained for selling `amount_in` of coin0 into a pool
/// with reserves (`reserve0`, `reserve1`).
///
/// Uniswap-style closed form with the commission taken from the input side:
///
/// ```text
/// out = (in * (1000 - c) * r1) / (r0 * 1000 + in * (1000 - c)) - 1
/// ```
pub fn calculate_buy_for_sell(
    reserve0: U256,
    reserve1: U256,
    amount_in: U256,
    commission: u64,
) -> MathResult<U256> {
    debug_assert!(commission < COMMISSION_BASE);
    if reserve0.is_zero() || reserve1.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    if amount_in.is_zero() {
        return Err(MathError::InsufficientInputAmount);
    }

    let fee = U256::from(COMMISSION_BASE - commission);
    let in_with_fee: U512 = amount_in.full_mul(fee);
    let numerator = in_with_fee
        .checked_mul(U512::from(reserve1))
        .ok_or(MathError::Overflow)?;
    let denominator = U512::from(reserve0) * U512::from(COMMISSION_BASE) + in_with_fee;

    let quotient = numerator / denominator;
    if quotient <= U512::one() {
        return Err(MathError::InsufficientInputAmount);
    }
    let out = narrow(quotient - U512::one())?;
    if out >= reserve1 {
        return Err(MathError::InsufficientLiquidity);
    }
    Ok(out)
}

/// Input of coin0 required to obtain exactly `amount_out` of coin1 from a
/// pool with reserves (`reserve0`, `reserve1`).
///
/// Inverse of [`calculate_buy_for_sell`], rounded up:
///
/// ```text
/// in = (r0 * out * 1000) / ((r1 - out) * (1000 - c)) + 1
/// ```
pub fn calculate_sell_for_buy(
    reserve0: U256,
    reserve1: U256,
    amount_out: U256,
    commission: u64,
) -> MathResult<U256> {
    debug_assert!(commission < COMMISSION_BASE);
    if reserve0.is_zero() || reserve1.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    if amount_out.is_zero() {
        return Err(MathError::InsufficientOutputAmount);
    }
    if amount_out >= reserve1 {
        return Err(MathError::InsufficientLiquidity);
    }

    let fee = U256::from(COMMISSION_BASE - commission);
    let numerator = reserve0
        .full_mul(amount_out)
        .checked_mul(U512::from(COMMISSION_BASE))
        .ok_or(MathError::Overflow)?;
    let denominator = (reserve1 - amount_out).full_mul(fee);

    narrow(numerator / denominator + U512::one())
}

/// Verify the commission-adjusted constant-product invariant for a swap that
/// adds `amount_in` of coin0 and removes `amount_out` of coin1:
///
/// ```text
/// (n0 * 1000 - in * c) * (n1 * 1000) >= r0 * r1 * 1000^2
/// ```
///
/// where (n0, n1) are the post-swap reserves. A violation means the swap
/// formulas were bypassed or mis-applied and the operation must be aborted.
pub fn check_swap(
    amount_in: U256,
    amount_out: U256,
    reserve0: U256,
    reserve1: U256,
    commission: u64,
) -> MathResult<()> {
    if amount_in.is_zero() && amount_out.is_zero() {
        return Ok(());
    }
    let new0 = reserve0
        .checked_add(amount_in)
        .ok_or(MathError::Overflow)?;
    let new1 = reserve1
        .checked_sub(amount_out)
        .ok_or(MathError::InsufficientLiquidity)?;

    let base = U512::from(COMMISSION_BASE);
    let adjusted0 = U512::from(new0) * base - U512::from(amount_in) * U512::from(commission);
    let adjusted1 = U512::from(new1) * base;
    let lhs = adjusted0
        .checked_mul(adjusted1)
        .ok_or(MathError::Overflow)?;
    let rhs = reserve0
        .full_mul(reserve1)
        .checked_mul(base * base)
        .ok_or(MathError::Overflow)?;

    if lhs < rhs {
        return Err(MathError::KInvariantViolation);
    }
    Ok(())
}

/// Input amount of coin0 that moves the pool's marginal rate down to the
/// target `price_num / price_den` (coin1 per coin0), accounting for the
/// commission on the input.
///
/// Solves the positive root of
///
/// ```text
/// (1000-c) x^2 + (2000-c) r0 x + 1000 r0 (r0 - r1 * den / num) = 0
/// ```
///
/// rounded down so the target rate is never overshot. Returns zero when the
/// pool already trades at or below the target.
pub fn amount_to_reach_price(
    reserve0: U256,
    reserve1: U256,
    price_num: U256,
    price_den: U256,
    commission: u64,
) -> MathResult<U256> {
    debug_assert!(commission < COMMISSION_BASE);
    if reserve0.is_zero() || reserve1.is_zero() || price_num.is_zero() || price_den.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }

    // d = r1 * den - r0 * num; non-positive means the pool rate is already
    // at or below the target.
    let pool_side = reserve1.full_mul(price_den);
    let target_side = reserve0.full_mul(price_num);
    let d = match pool_side.checked_sub(target_side) {
        Some(d) if !d.is_zero() => d,
        _ => return Ok(U256::zero()),
    };

    let a = U512::from(COMMISSION_BASE - commission);
    let b = U512::from(reserve0)
        .checked_mul(U512::from(2 * COMMISSION_BASE - commission))
        .ok_or(MathError::Overflow)?;
    // c_term = 1000 * r0 * d / num, truncated. Truncation only shrinks the
    // root, which keeps the result on the conservative side of the target.
    let c_term = d
        .checked_mul(U512::from(COMMISSION_BASE))
        .ok_or(MathError::Overflow)?
        .checked_mul(U512::from(reserve0))
        .ok_or(MathError::Overflow)?
        / U512::from(price_num);

    let discriminant = b
        .checked_mul(b)
        .ok_or(MathError::Overflow)?
        .checked_add(
            c_term
                .checked_mul(a << 2)
                .ok_or(MathError::Overflow)?,
        )
        .ok_or(MathError::Overflow)?;

    let root = isqrt(discriminant);
    narrow((root - b) / (a << 1))
}

/// Initial liquidity for a freshly funded pool: `floor(sqrt(a0 * a1))`.
///
/// Fails if the result is below `minimum_liquidity`, which keeps dust pools
/// from existing at all.
pub fn create_liquidity(amount0: U256, amount1: U256, minimum_liquidity: u64) -> MathResult<U256> {
    if amount0.is_zero() || amount1.is_zero() {
        return Err(MathError::InsufficientInputAmount);
    }
    let liquidity = narrow(isqrt(amount0.full_mul(amount1)))?;
    if liquidity < U256::from(minimum_liquidity) {
        return Err(MathError::InsufficientLiquidity);
    }
    Ok(liquidity)
}

/// Liquidity minted for adding (`amount0`, `amount1`) to a pool with
/// reserves (`reserve0`, `reserve1`) and `total_supply` outstanding
/// liquidity. The smaller of the two proportional shares wins, so providing
/// off-ratio amounts donates the excess to the pool.
pub fn mint_liquidity(
    total_supply: U256,
    amount0: U256,
    amount1: U256,
    reserve0: U256,
    reserve1: U256,
) -> MathResult<U256> {
    if reserve0.is_zero() || reserve1.is_zero() || total_supply.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    let share0 = amount0.full_mul(total_supply) / U512::from(reserve0);
    let share1 = amount1.full_mul(total_supply) / U512::from(reserve1);
    let minted = narrow(share0.min(share1))?;
    if minted.is_zero() {
        return Err(MathError::InsufficientInputAmount);
    }
    Ok(minted)
}

/// Amounts returned for burning `liquidity` out of `total_supply`, rounded
/// down in the pool's favor.
pub fn burn_liquidity(
    total_supply: U256,
    liquidity: U256,
    reserve0: U256,
    reserve1: U256,
) -> MathResult<(U256, U256)> {
    if liquidity.is_zero() {
        return Err(MathError::InsufficientInputAmount);
    }
    if total_supply.is_zero() || liquidity > total_supply {
        return Err(MathError::InsufficientLiquidity);
    }
    let amount0 = narrow(liquidity.full_mul(reserve0) / U512::from(total_supply))?;
    let amount1 = narrow(liquidity.full_mul(reserve1) / U512::from(total_supply))?;
    if amount0.is_zero() || amount1.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    Ok((amount0, amount1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn u(v: u128) -> U256 {
        U256::from(v)
    }

    #[test]
    fn test_buy_for_sell_basic() {
        // 0.2% commission, balanced pool
        let out = calculate_buy_for_sell(u(10_000), u(10_000), u(4_147), 2).unwrap();
        assert_eq!(out, u(2_926));
    }

    #[test]
    fn test_buy_for_sell_rejects_empty_pool() {
        assert_eq!(
            calculate_buy_for_sell(U256::zero(), u(10_000), u(100), 2),
            Err(MathError::InsufficientLiquidity)
        );
        assert_eq!(
            calculate_buy_for_sell(u(10_000), u(10_000), U256::zero(), 2),
            Err(MathError::InsufficientInputAmount)
        );
    }

    #[test]
    fn test_buy_for_sell_rejects_dust_input() {
        // Output would round to zero after the guard unit.
        assert_eq!(
            calculate_buy_for_sell(u(1_000_000), u(1_000_000), u(1), 2),
            Err(MathError::InsufficientInputAmount)
        );
    }

    #[test]
    fn test_sell_for_buy_is_upper_inverse() {
        let reserve0 = u(10_000);
        let reserve1 = u(10_000);
        let out = calculate_buy_for_sell(reserve0, reserve1, u(4_147), 2).unwrap();
        let needed = calculate_sell_for_buy(reserve0, reserve1, out, 2).unwrap();
        // Paying the quoted input must be enough to obtain `out`.
        assert!(needed <= u(4_147));
        let replay = calculate_buy_for_sell(reserve0, reserve1, needed, 2).unwrap();
        assert!(replay >= out);
    }

    #[test]
    fn test_sell_for_buy_rejects_draining() {
        assert_eq!(
            calculate_sell_for_buy(u(10_000), u(10_000), u(10_000), 2),
            Err(MathError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_check_swap_accepts_formula_output() {
        let (r0, r1) = (u(10_000), u(10_000));
        let out = calculate_buy_for_sell(r0, r1, u(4_147), 2).unwrap();
        check_swap(u(4_147), out, r0, r1, 2).unwrap();
    }

    #[test]
    fn test_check_swap_rejects_overdraw() {
        // One unit more output than the formula allows breaks the invariant.
        let (r0, r1) = (u(10_000), u(10_000));
        let out = calculate_buy_for_sell(r0, r1, u(4_147), 2).unwrap();
        assert_eq!(
            check_swap(u(4_147), out + u(20), r0, r1, 2),
            Err(MathError::KInvariantViolation)
        );
    }

    #[test]
    fn test_amount_to_reach_price() {
        // Balanced 10000/10000 pool, target rate 1/3 coin1 per coin0.
        let x = amount_to_reach_price(u(10_000), u(10_000), u(1), u(3), 2).unwrap();
        assert!(x > u(7_000) && x < u(7_700), "x = {x}");

        // Defining inequality: the target is never overshot.
        let lhs = (U512::from(10_000u64) + U512::from(x))
            * (U512::from(10_000_000u64) + U512::from(998u64) * U512::from(x));
        let rhs = U512::from(10_000u64) * U512::from(10_000u64) * U512::from(1000u64)
            * U512::from(3u64);
        assert!(lhs <= rhs);
    }

    #[test]
    fn test_amount_to_reach_price_already_below() {
        // Pool rate 1/2, target 2/1: nothing to walk.
        let x = amount_to_reach_price(u(5_000), u(2_500), u(2), u(1), 2).unwrap();
        assert!(x.is_zero());
    }

    #[test]
    fn test_create_liquidity() {
        assert_eq!(create_liquidity(u(10_000), u(10_000), 1000).unwrap(), u(10_000));
        assert_eq!(
            create_liquidity(u(10), u(10), 1000),
            Err(MathError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_mint_burn_round_trip() {
        let total = u(10_000);
        let (r0, r1) = (u(10_000), u(40_000));
        let minted = mint_liquidity(total, u(1_000), u(4_000), r0, r1).unwrap();
        assert_eq!(minted, u(1_000));

        let (b0, b1) = burn_liquidity(total + minted, minted, r0 + u(1_000), r1 + u(4_000)).unwrap();
        assert_eq!(b0, u(1_000));
        assert_eq!(b1, u(4_000));
    }

    #[test]
    fn test_mint_off_ratio_takes_smaller_share() {
        let minted = mint_liquidity(u(10_000), u(2_000), u(4_000), u(10_000), u(40_000)).unwrap();
        // 4000/40000 is the limiting side.
        assert_eq!(minted, u(1_000));
    }

    #[test]
    fn test_isqrt() {
        assert_eq!(isqrt(U512::zero()), U512::zero());
        assert_eq!(isqrt(U512::from(1u64)), U512::from(1u64));
        assert_eq!(isqrt(U512::from(99u64)), U512::from(9u64));
        assert_eq!(isqrt(U512::from(100u64)), U512::from(10u64));
        let big = U256::MAX.full_mul(U256::MAX);
        assert_eq!(isqrt(big), U512::from(U256::MAX));
    }

    proptest! {
        #[test]
        fn prop_swap_preserves_invariant(
            r0 in 1_000u128..u128::MAX / 2_000,
            r1 in 1_000u128..u128::MAX / 2_000,
            amount in 1u128..u128::MAX / 2_000,
        ) {
            if let Ok(out) = calculate_buy_for_sell(u(r0), u(r1), u(amount), 2) {
                prop_assert!(check_swap(u(amount), out, u(r0), u(r1), 2).is_ok());
                prop_assert!(out < u(r1));
            }
        }

        #[test]
        fn prop_quoted_input_is_sufficient(
            r0 in 1_000u128..u128::MAX / 2_000,
            r1 in 1_000u128..u128::MAX / 2_000,
            out in 1u128..u128::MAX / 2_000,
        ) {
            if let Ok(input) = calculate_sell_for_buy(u(r0), u(r1), u(out), 2) {
                match calculate_buy_for_sell(u(r0), u(r1), input, 2) {
                    Ok(obtained) => {
                        prop_assert!(obtained + U256::from(2u64) >= u(out));
                        prop_assert!(check_swap(input, obtained, u(r0), u(r1), 2).is_ok());
                    }
                    // A one-unit request can round to nothing after the
                    // guard unit is subtracted.
                    Err(_) => prop_assert!(out <= 2),
                }
            }
        }

        #[test]
        fn prop_walk_never_overshoots_target(
            r0 in 1_000u128..1u128 << 100,
            r1 in 1_000u128..1u128 << 100,
            num in 1u128..1u128 << 64,
            den in 1u128..1u128 << 64,
        ) {
            let x = amount_to_reach_price(u(r0), u(r1), u(num), u(den), 2).unwrap();
            if !x.is_zero() {
                // (r0 + x)(1000 r0 + 998 x) <= 1000 r0 r1 den / num
                let lhs = (U512::from(u(r0)) + U512::from(x))
                    * (U512::from(u(r0)) * U512::from(1000u64) + U512::from(998u64) * U512::from(x))
                    * U512::from(u(num));
                let rhs = U512::from(u(r0)) * U512::from(u(r1))
                    * U512::from(1000u64) * U512::from(u(den));
                prop_assert!(lhs <= rhs);
            }
        }
    }
}
