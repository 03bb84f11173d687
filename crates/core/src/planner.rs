//! Pure planning: sizing, venue selection, split search, and the profit
//! guard. Everything here consumes immutable snapshots (prices, decimals,
//! quotes, fees) and returns values; all I/O lives in the manager.

use alloy::primitives::U256;

use flashliq_chain::router::VenueId;

use crate::math::{apply_bps_down, mul_bps, usd_to_units};

/// Flash-loan premium, in basis points of the borrowed amount (~0.09%).
pub const FLASH_PREMIUM_BPS: u16 = 9;

/// Venue-A share of the five candidate splits, in percent.
pub const SPLIT_RATIOS_PCT: [u8; 5] = [100, 75, 50, 25, 0];

/// Immutable snapshot feeding the repay sizing.
#[derive(Debug, Clone, Copy)]
pub struct SizingInputs {
    pub usd_notional: f64,
    pub close_factor_bps: u16,
    pub min_liq_usd: f64,
    pub max_liq_usd: f64,
    pub debt_price_usd: f64,
    pub collateral_price_usd: f64,
    pub debt_decimals: u8,
    pub collateral_decimals: u8,
}

/// Sized repayment in USD and token base units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    pub repay_usd: f64,
    pub debt_units: U256,
    pub collateral_units: U256,
}

/// Size the repayment: close factor applied to the notional, clamped into
/// the configured USD window. None when the result cannot clear the minimum.
pub fn size_repay(inputs: &SizingInputs) -> Option<Sizing> {
    // Unpriced assets behave like $1 so sizing still proceeds on testnets.
    let debt_price = if inputs.debt_price_usd > 0.0 {
        inputs.debt_price_usd
    } else {
        1.0
    };
    let collateral_price = if inputs.collateral_price_usd > 0.0 {
        inputs.collateral_price_usd
    } else {
        1.0
    };

    let capped = inputs.usd_notional * inputs.close_factor_bps as f64 / 10_000.0;
    let repay_usd = capped.max(inputs.min_liq_usd).min(inputs.max_liq_usd);
    if repay_usd < inputs.min_liq_usd {
        return None;
    }

    let debt_units = usd_to_units(repay_usd, debt_price, inputs.debt_decimals);
    let collateral_units = usd_to_units(repay_usd, collateral_price, inputs.collateral_decimals);
    if debt_units.is_zero() || collateral_units.is_zero() {
        return None;
    }

    Some(Sizing {
        repay_usd,
        debt_units,
        collateral_units,
    })
}

/// Split is attempted from the trigger upward (inclusive).
pub fn should_split(repay_usd: f64, trigger_usd: f64) -> bool {
    repay_usd >= trigger_usd
}

/// Single-venue choice: A preferred when both quote non-zero.
pub fn choose_single_venue(quote_a: U256, quote_b: U256) -> Option<VenueId> {
    if !quote_a.is_zero() {
        Some(VenueId::Quickswap)
    } else if !quote_b.is_zero() {
        Some(VenueId::Sushiswap)
    } else {
        None
    }
}

/// Leg input for a given venue-A percentage; venue B takes the remainder so
/// the two inputs always sum to `total`.
pub fn split_inputs(total: U256, venue_a_pct: u8) -> (U256, U256) {
    let in_a = total * U256::from(venue_a_pct) / U256::from(100u8);
    (in_a, total - in_a)
}

/// Quoted outcome of one candidate ratio.
#[derive(Debug, Clone, Copy)]
pub struct RatioQuote {
    pub venue_a_pct: u8,
    pub out_a: U256,
    pub out_b: U256,
}

impl RatioQuote {
    pub fn total(&self) -> U256 {
        self.out_a + self.out_b
    }
}

/// Pick the ratio with the highest combined output. None when every ratio
/// quotes zero. Earlier entries win ties, so 100/0 beats an equal 0/100.
pub fn choose_split(quotes: &[RatioQuote]) -> Option<RatioQuote> {
    let best = quotes.iter().copied().reduce(|best, q| {
        if q.total() > best.total() {
            q
        } else {
            best
        }
    })?;
    (!best.total().is_zero()).then_some(best)
}

/// `amountOutMin` after slippage: `quoted * (10000 - slip_bps) / 10000`.
pub fn amount_out_min(quoted: U256, slip_bps: u16) -> U256 {
    apply_bps_down(quoted, slip_bps)
}

/// Flash-loan premium on the borrowed amount.
pub fn flash_premium(debt_units: U256) -> U256 {
    mul_bps(debt_units, FLASH_PREMIUM_BPS)
}

/// Profit guard: proceeds must strictly exceed debt + premium + gas.
/// Exact break-even aborts; one wei above proceeds.
pub fn clears_profit_guard(
    total_amount_out_min: U256,
    debt_units: U256,
    premium_units: U256,
    gas_cost_in_debt_units: U256,
) -> bool {
    total_amount_out_min > debt_units + premium_units + gas_cost_in_debt_units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> SizingInputs {
        SizingInputs {
            usd_notional: 1_000.0,
            close_factor_bps: 5_000,
            min_liq_usd: 100.0,
            max_liq_usd: 51_000.0,
            debt_price_usd: 1.0,
            collateral_price_usd: 1.0,
            debt_decimals: 6,
            collateral_decimals: 18,
        }
    }

    #[test]
    fn sizing_applies_close_factor() {
        let s = size_repay(&base_inputs()).unwrap();
        assert_eq!(s.repay_usd, 500.0);
        assert_eq!(s.debt_units, U256::from(500_000_000u64)); // 500 * 1e6
        assert_eq!(
            s.collateral_units,
            U256::from(500u64) * U256::from(10u64).pow(U256::from(18u64))
        );
    }

    #[test]
    fn sizing_clamps_into_usd_window() {
        let mut inputs = base_inputs();
        inputs.usd_notional = 1_000_000.0;
        assert_eq!(size_repay(&inputs).unwrap().repay_usd, 51_000.0);

        inputs.usd_notional = 50.0;
        // Clamp lifts tiny notionals to the floor rather than skipping them.
        assert_eq!(size_repay(&inputs).unwrap().repay_usd, 100.0);
    }

    #[test]
    fn sizing_rejects_when_window_is_inverted() {
        let mut inputs = base_inputs();
        inputs.max_liq_usd = 50.0; // below the minimum
        assert!(size_repay(&inputs).is_none());
    }

    #[test]
    fn sizing_defaults_unpriced_assets_to_one_dollar() {
        let mut inputs = base_inputs();
        inputs.debt_price_usd = 0.0;
        inputs.collateral_price_usd = -1.0;
        let s = size_repay(&inputs).unwrap();
        assert_eq!(s.debt_units, U256::from(500_000_000u64));
    }

    #[test]
    fn split_boundary_is_inclusive() {
        assert!(should_split(15_000.0, 15_000.0));
        assert!(should_split(15_000.01, 15_000.0));
        assert!(!should_split(14_999.99, 15_000.0));
    }

    #[test]
    fn single_venue_prefers_a() {
        assert_eq!(
            choose_single_venue(U256::from(1u64), U256::from(100u64)),
            Some(VenueId::Quickswap)
        );
        assert_eq!(
            choose_single_venue(U256::ZERO, U256::from(1u64)),
            Some(VenueId::Sushiswap)
        );
        assert_eq!(choose_single_venue(U256::ZERO, U256::ZERO), None);
    }

    #[test]
    fn split_inputs_sum_to_total() {
        let total = U256::from(1_000_003u64);
        for pct in SPLIT_RATIOS_PCT {
            let (a, b) = split_inputs(total, pct);
            assert_eq!(a + b, total);
        }
        assert_eq!(split_inputs(total, 0).0, U256::ZERO);
        assert_eq!(split_inputs(total, 100).1, U256::ZERO);
    }

    #[test]
    fn split_selection_maximizes_total_output() {
        let quotes = vec![
            RatioQuote {
                venue_a_pct: 100,
                out_a: U256::from(900u64),
                out_b: U256::ZERO,
            },
            RatioQuote {
                venue_a_pct: 50,
                out_a: U256::from(480u64),
                out_b: U256::from(470u64),
            },
            RatioQuote {
                venue_a_pct: 0,
                out_a: U256::ZERO,
                out_b: U256::from(890u64),
            },
        ];
        assert_eq!(choose_split(&quotes).unwrap().venue_a_pct, 50);
    }

    #[test]
    fn split_selection_rejects_all_zero() {
        let quotes = vec![RatioQuote {
            venue_a_pct: 100,
            out_a: U256::ZERO,
            out_b: U256::ZERO,
        }];
        assert!(choose_split(&quotes).is_none());
        assert!(choose_split(&[]).is_none());
    }

    #[test]
    fn slippage_min_out() {
        assert_eq!(
            amount_out_min(U256::from(10_000u64), 50),
            U256::from(9_950u64)
        );
        assert_eq!(amount_out_min(U256::from(10_000u64), 0), U256::from(10_000u64));
    }

    #[test]
    fn premium_is_nine_bps() {
        assert_eq!(flash_premium(U256::from(10_000u64)), U256::from(9u64));
        assert_eq!(flash_premium(U256::from(1_000_000u64)), U256::from(900u64));
    }

    #[test]
    fn profit_guard_boundary() {
        let debt = U256::from(1_000_000u64);
        let premium = flash_premium(debt);
        let gas = U256::from(2_500u64);
        let required = debt + premium + gas;

        // Exact break-even aborts.
        assert!(!clears_profit_guard(required, debt, premium, gas));
        // One wei above proceeds.
        assert!(clears_profit_guard(
            required + U256::from(1u64),
            debt,
            premium,
            gas
        ));
    }
}
