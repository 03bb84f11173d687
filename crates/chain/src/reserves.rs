//! V2 pair discovery, per-block reserve snapshots, and the local
//! constant-product quote.
//!
//! Pair addresses never change, so that cache lives for the process. Reserve
//! pairs are only meaningful within the block they were read in: entries are
//! stored as `(reserves, block)` behind an atomic block gauge and dropped
//! wholesale when the observed block advances. Reads against an older block
//! return zero rather than resurrecting stale data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use tracing::trace;

use crate::contracts::{IUniswapV2Factory, IUniswapV2Pair};
use crate::rpc::RpcClient;

/// Reserve pair aligned to the caller's (token_in, token_out) order.
pub type Reserves = (U256, U256);

pub struct ReservesCache {
    rpc: Arc<RpcClient>,
    /// (factory, token0, token1) -> pair address; None caches a missing pair.
    pairs: DashMap<(Address, Address, Address), Option<Address>>,
    /// pair -> raw (reserve0, reserve1) for the current block.
    reserves: DashMap<Address, Reserves>,
    current_block: AtomicU64,
}

impl ReservesCache {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self {
            rpc,
            pairs: DashMap::new(),
            reserves: DashMap::new(),
            current_block: AtomicU64::new(0),
        }
    }

    /// Advance the block gauge, invalidating all reserve entries when the
    /// number moves forward. Returns false (and leaves the cache untouched)
    /// when `block` is older than the gauge.
    fn observe_block(&self, block: u64) -> bool {
        let current = self.current_block.load(Ordering::Acquire);
        if block < current {
            return false;
        }
        if block > current
            && self
                .current_block
                .compare_exchange(current, block, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.reserves.clear();
            trace!(block, "reserves cache rolled to new block");
        }
        true
    }

    /// Resolve the pair address for (token_a, token_b) on `factory`.
    pub async fn pair_address(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Option<Address> {
        let (t0, t1) = order_tokens(token_a, token_b);
        let key = (factory, t0, t1);
        if let Some(cached) = self.pairs.get(&key) {
            return *cached;
        }

        let call = IUniswapV2Factory::getPairCall {
            tokenA: token_a,
            tokenB: token_b,
        };
        let pair = match self.rpc.eth_call(factory, call.abi_encode().into(), None).await {
            Ok(ret) if ret.len() >= 32 => {
                let addr = Address::from_slice(&ret[12..32]);
                (!addr.is_zero()).then_some(addr)
            }
            _ => None,
        };
        self.pairs.insert(key, pair);
        pair
    }

    /// Fetch reserves for (token_in, token_out) on `factory`, aligned to that
    /// order, memoized within `block`. Zeroes signal stale or unavailable.
    pub async fn reserves(
        &self,
        factory: Address,
        token_in: Address,
        token_out: Address,
        block: u64,
    ) -> Reserves {
        if !self.observe_block(block) {
            return (U256::ZERO, U256::ZERO);
        }
        let Some(pair) = self.pair_address(factory, token_in, token_out).await else {
            return (U256::ZERO, U256::ZERO);
        };

        let raw = if let Some(cached) = self.reserves.get(&pair) {
            *cached
        } else {
            let call = IUniswapV2Pair::getReservesCall {};
            let fetched = match self.rpc.eth_call(pair, call.abi_encode().into(), None).await {
                Ok(ret) if ret.len() >= 96 => (
                    U256::from_be_slice(&ret[0..32]),
                    U256::from_be_slice(&ret[32..64]),
                ),
                _ => return (U256::ZERO, U256::ZERO),
            };
            // Another reader may have won the race; either copy is from the
            // same block, so both are equally valid.
            self.reserves.insert(pair, fetched);
            fetched
        };

        align_reserves(raw, token_in, token_out)
    }

    /// Local constant-product quote against on-chain reserves:
    /// `(997 * a * r_out) / (1000 * r_in + 997 * a)`. Zero signals that the
    /// pool is missing, empty, or the block is stale.
    pub async fn quote_local(
        &self,
        factory: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        block: u64,
    ) -> U256 {
        let (reserve_in, reserve_out) = self.reserves(factory, token_in, token_out, block).await;
        v2_amount_out(amount_in, reserve_in, reserve_out)
    }
}

/// V2 canonical token ordering: token0 < token1 by address bytes.
pub fn order_tokens(a: Address, b: Address) -> (Address, Address) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Realign raw (reserve0, reserve1) to the caller's (token_in, token_out).
pub fn align_reserves(raw: Reserves, token_in: Address, token_out: Address) -> Reserves {
    if token_in <= token_out {
        raw
    } else {
        (raw.1, raw.0)
    }
}

/// Closed-form x·y=k output with the 0.3% fee, integer division.
pub fn v2_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }
    let amount_in_with_fee = amount_in * U256::from(997u64);
    let numerator = amount_in_with_fee * reserve_out;
    let denominator = reserve_in * U256::from(1000u64) + amount_in_with_fee;
    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn amount_out_matches_closed_form() {
        let a = U256::from(1_000u64);
        let r_in = U256::from(1_000_000u64);
        let r_out = U256::from(2_000_000u64);
        // (997 * 1000 * 2_000_000) / (1_000_000 * 1000 + 997 * 1000)
        let expected = U256::from(997u64) * a * r_out
            / (r_in * U256::from(1000u64) + U256::from(997u64) * a);
        assert_eq!(v2_amount_out(a, r_in, r_out), expected);
        assert_eq!(v2_amount_out(a, r_in, r_out), U256::from(1992031u64));
    }

    #[test]
    fn amount_out_zero_on_degenerate_inputs() {
        let one = U256::from(1u64);
        assert_eq!(v2_amount_out(U256::ZERO, one, one), U256::ZERO);
        assert_eq!(v2_amount_out(one, U256::ZERO, one), U256::ZERO);
        assert_eq!(v2_amount_out(one, one, U256::ZERO), U256::ZERO);
    }

    #[test]
    fn token_ordering_is_canonical() {
        let low = address!("0000000000000000000000000000000000000001");
        let high = address!("00000000000000000000000000000000000000ff");
        assert_eq!(order_tokens(low, high), (low, high));
        assert_eq!(order_tokens(high, low), (low, high));
    }

    #[test]
    fn reserves_align_to_caller_order() {
        let low = address!("0000000000000000000000000000000000000001");
        let high = address!("00000000000000000000000000000000000000ff");
        let raw = (U256::from(10u64), U256::from(20u64));
        assert_eq!(align_reserves(raw, low, high), (U256::from(10u64), U256::from(20u64)));
        assert_eq!(align_reserves(raw, high, low), (U256::from(20u64), U256::from(10u64)));
    }

    #[tokio::test]
    async fn stale_block_reads_return_zero() {
        let rpc = Arc::new(RpcClient::new("http://localhost:1", None, None).unwrap());
        let cache = ReservesCache::new(rpc);
        assert!(cache.observe_block(100));
        // Older block: getters must not roll the gauge back.
        assert!(!cache.observe_block(99));
        let out = cache
            .quote_local(Address::ZERO, Address::ZERO, Address::ZERO, U256::from(1u64), 99)
            .await;
        assert_eq!(out, U256::ZERO);
        assert_eq!(cache.current_block.load(Ordering::Acquire), 100);
    }
}
