//! U256 arithmetic helpers for sizing and slippage.

use alloy::primitives::U256;

/// Basis points denominator (10000 = 100%).
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (exact up to 10^38).
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if (exp as usize) < POW10.len() {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// `value * (10000 - bps) / 10000`, integer division.
#[inline(always)]
pub fn apply_bps_down(value: U256, bps: u16) -> U256 {
    let factor = U256::from(10_000u16.saturating_sub(bps));
    value * factor / BPS_DENOMINATOR
}

/// `value * bps / 10000`, integer division.
#[inline(always)]
pub fn mul_bps(value: U256, bps: u16) -> U256 {
    value * U256::from(bps) / BPS_DENOMINATOR
}

/// Lossy U256 -> f64 for display and threshold comparison only.
#[inline(always)]
pub fn u256_to_f64(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        value.to::<u128>() as f64
    } else {
        let mut acc = 0.0f64;
        for limb in value.as_limbs().iter().rev() {
            acc = acc * (u64::MAX as f64 + 1.0) + *limb as f64;
        }
        acc
    }
}

/// Convert a USD amount into token base units at `price` USD per whole
/// token. Zero when the inputs are degenerate.
#[inline(always)]
pub fn usd_to_units(usd: f64, price: f64, decimals: u8) -> U256 {
    if usd <= 0.0 || price <= 0.0 {
        return U256::ZERO;
    }
    let whole = usd / price;
    let units = whole * 10f64.powi(decimals as i32);
    if !units.is_finite() || units < 0.0 {
        return U256::ZERO;
    }
    U256::from(units as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow10_lookup() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(pow10(38), U256::from(POW10[38]));
    }

    #[test]
    fn bps_down() {
        let v = U256::from(10_000u64);
        assert_eq!(apply_bps_down(v, 50), U256::from(9_950u64));
        assert_eq!(apply_bps_down(v, 0), v);
        assert_eq!(apply_bps_down(v, 10_000), U256::ZERO);
    }

    #[test]
    fn bps_mul() {
        let v = U256::from(10_000u64);
        assert_eq!(mul_bps(v, 9), U256::from(9u64));
        assert_eq!(mul_bps(v, 5_000), U256::from(5_000u64));
    }

    #[test]
    fn usd_conversion() {
        // $1000 of a $1 stable with 6 decimals.
        assert_eq!(usd_to_units(1_000.0, 1.0, 6), U256::from(1_000_000_000u64));
        // $3000 of a $3000 token with 18 decimals = 1 whole token.
        assert_eq!(
            usd_to_units(3_000.0, 3_000.0, 18),
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert_eq!(usd_to_units(0.0, 1.0, 18), U256::ZERO);
        assert_eq!(usd_to_units(10.0, 0.0, 18), U256::ZERO);
    }

    #[test]
    fn f64_conversion_roundtrip_small() {
        let v = U256::from(123_456_789u64);
        assert_eq!(u256_to_f64(v), 123_456_789.0);
    }
}
