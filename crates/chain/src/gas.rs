//! EIP-1559 fee derivation and replace-by-fee escalation.

use std::sync::Arc;

use crate::rpc::RpcClient;

/// Priority fee fallback when the node refuses `eth_maxPriorityFeePerGas`.
const FALLBACK_PRIORITY_FEE: u128 = 30_000_000_000; // 30 gwei

/// Base fee fallback when the latest block carries none.
const FALLBACK_BASE_FEE: u128 = 50_000_000_000; // 50 gwei

/// One fee pair, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Chain-state reading behind a quote, kept for telemetry.
#[derive(Debug, Clone, Copy)]
pub struct GasReading {
    pub base_fee: u128,
    pub priority_fee: u128,
    pub max_fee: u128,
}

impl GasReading {
    pub fn quote(&self) -> GasQuote {
        GasQuote {
            max_fee_per_gas: self.max_fee,
            max_priority_fee_per_gas: self.priority_fee,
        }
    }
}

/// Derives an initial fee pair from chain state:
/// `max_fee = 2 * base_fee + priority_fee`, priority as reported.
pub struct GasOracle {
    rpc: Arc<RpcClient>,
}

impl GasOracle {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    /// Read current fees, falling back per field on RPC failure.
    pub async fn quote(&self) -> GasReading {
        let priority_fee = self
            .rpc
            .max_priority_fee_per_gas()
            .await
            .ok()
            .filter(|p| *p > 0)
            .unwrap_or(FALLBACK_PRIORITY_FEE);

        let base_fee = self
            .rpc
            .latest_base_fee()
            .await
            .ok()
            .flatten()
            .filter(|b| *b > 0)
            .unwrap_or(FALLBACK_BASE_FEE);

        GasReading {
            base_fee,
            priority_fee,
            max_fee: compute_max_fee(base_fee, priority_fee),
        }
    }
}

/// `2 * base + priority`; the aggressive-inclusion formula.
pub fn compute_max_fee(base_fee: u128, priority_fee: u128) -> u128 {
    base_fee * 2 + priority_fee
}

/// Grows both fee fields by a fixed multiplier per RBF attempt.
#[derive(Debug, Clone, Copy)]
pub struct FeeEscalator {
    bump_factor: f64,
}

impl FeeEscalator {
    pub fn new(bump_factor: f64) -> Self {
        Self { bump_factor }
    }

    /// The next fee pair after one bump.
    pub fn next(&self, prev: GasQuote) -> GasQuote {
        GasQuote {
            max_fee_per_gas: bump(prev.max_fee_per_gas, self.bump_factor),
            max_priority_fee_per_gas: bump(prev.max_priority_fee_per_gas, self.bump_factor),
        }
    }
}

fn bump(fee: u128, factor: f64) -> u128 {
    (fee as f64 * factor) as u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_fee_formula() {
        assert_eq!(
            compute_max_fee(50_000_000_000, 30_000_000_000),
            130_000_000_000
        );
        assert_eq!(compute_max_fee(0, 1), 1);
    }

    #[test]
    fn escalation_is_monotone() {
        let escalator = FeeEscalator::new(1.2);
        let mut quote = GasQuote {
            max_fee_per_gas: 100_000_000_000,
            max_priority_fee_per_gas: 30_000_000_000,
        };
        for _ in 0..3 {
            let next = escalator.next(quote);
            assert!(next.max_fee_per_gas > quote.max_fee_per_gas);
            assert!(next.max_priority_fee_per_gas > quote.max_priority_fee_per_gas);
            assert!(next.max_fee_per_gas >= next.max_priority_fee_per_gas);
            quote = next;
        }
    }

    #[test]
    fn bump_applies_uniformly() {
        let escalator = FeeEscalator::new(1.2);
        let next = escalator.next(GasQuote {
            max_fee_per_gas: 100,
            max_priority_fee_per_gas: 50,
        });
        assert_eq!(next.max_fee_per_gas, 120);
        assert_eq!(next.max_priority_fee_per_gas, 60);
    }
}
