//! Constant-product venue table, router quoting, and swap calldata.
//!
//! Exactly two V2-compatible venues are routed: Quickswap (venue A) and
//! Sushiswap (venue B). Router quotes go through `getAmountsOut` and are
//! memoized per (router, path, amount, block); the cache rolls forward with
//! the block gauge and reads against an older block return zero.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use tracing::trace;

use crate::constants;
use crate::contracts::IUniswapV2Router02;
use crate::rpc::RpcClient;

/// Venue identity; A is preferred when quotes tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VenueId {
    Quickswap,
    Sushiswap,
}

impl VenueId {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Quickswap => "Quickswap",
            Self::Sushiswap => "Sushiswap",
        }
    }
}

/// One V2-compatible venue: a router and its factory.
#[derive(Debug, Clone, Copy)]
pub struct Venue {
    pub id: VenueId,
    pub router: Address,
    pub factory: Address,
}

/// Venue A: Quickswap.
pub const VENUE_A: Venue = Venue {
    id: VenueId::Quickswap,
    router: constants::QUICKSWAP_ROUTER,
    factory: constants::QUICKSWAP_FACTORY,
};

/// Venue B: Sushiswap.
pub const VENUE_B: Venue = Venue {
    id: VenueId::Sushiswap,
    router: constants::SUSHISWAP_ROUTER,
    factory: constants::SUSHISWAP_FACTORY,
};

pub const VENUES: [Venue; 2] = [VENUE_A, VENUE_B];

pub fn venue(id: VenueId) -> Venue {
    match id {
        VenueId::Quickswap => VENUE_A,
        VenueId::Sushiswap => VENUE_B,
    }
}

type QuoteKey = (Address, Vec<Address>, U256, u64);

/// Router-level quoting with a per-block quote cache.
pub struct DexRouter {
    rpc: Arc<RpcClient>,
    quotes: DashMap<QuoteKey, U256>,
    current_block: AtomicU64,
}

impl DexRouter {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self {
            rpc,
            quotes: DashMap::new(),
            current_block: AtomicU64::new(0),
        }
    }

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
            self.quotes.clear();
            trace!(block, "quote cache rolled to new block");
        }
        true
    }

    /// Uncached `getAmountsOut` quote; the last element of the returned
    /// amounts array. Zero on any failure.
    pub async fn quote(&self, router: Address, path: &[Address], amount_in: U256) -> U256 {
        if amount_in.is_zero() || path.len() < 2 {
            return U256::ZERO;
        }
        let call = IUniswapV2Router02::getAmountsOutCall {
            amountIn: amount_in,
            path: path.to_vec(),
        };
        match self.rpc.eth_call(router, call.abi_encode().into(), None).await {
            Ok(ret) => IUniswapV2Router02::getAmountsOutCall::abi_decode_returns(&ret)
                .ok()
                .and_then(|amounts| amounts.last().copied())
                .unwrap_or(U256::ZERO),
            Err(_) => U256::ZERO,
        }
    }

    /// Quote memoized within `block`. Stale blocks read as zero.
    pub async fn quote_cached(
        &self,
        router: Address,
        path: &[Address],
        amount_in: U256,
        block: u64,
    ) -> U256 {
        if !self.observe_block(block) {
            return U256::ZERO;
        }
        let key = (router, path.to_vec(), amount_in, block);
        if let Some(hit) = self.quotes.get(&key) {
            return *hit;
        }
        let out = self.quote(router, path, amount_in).await;
        self.quotes.insert(key, out);
        out
    }

    #[cfg(test)]
    fn seed_quote(&self, router: Address, path: &[Address], amount_in: U256, block: u64, out: U256) {
        self.quotes.insert((router, path.to_vec(), amount_in, block), out);
    }
}

/// ABI-encode `swapExactTokensForTokens(amountIn, amountOutMin, path, to, deadline)`.
pub fn build_v2_swap_calldata(
    amount_in: U256,
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: u64,
) -> Bytes {
    IUniswapV2Router02::swapExactTokensForTokensCall {
        amountIn: amount_in,
        amountOutMin: amount_out_min,
        path: path.to_vec(),
        to,
        deadline: U256::from(deadline),
    }
    .abi_encode()
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn swap_calldata_roundtrip() {
        let path = [
            address!("1111111111111111111111111111111111111111"),
            address!("2222222222222222222222222222222222222222"),
        ];
        let to = address!("3333333333333333333333333333333333333333");
        let data = build_v2_swap_calldata(
            U256::from(1_000u64),
            U256::from(950u64),
            &path,
            to,
            1_700_000_180,
        );
        assert_eq!(&data[..4], &[0x38, 0xed, 0x17, 0x39]);

        let decoded =
            IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.amountIn, U256::from(1_000u64));
        assert_eq!(decoded.amountOutMin, U256::from(950u64));
        assert_eq!(decoded.path, path.to_vec());
        assert_eq!(decoded.to, to);
        assert_eq!(decoded.deadline, U256::from(1_700_000_180u64));
    }

    #[test]
    fn venue_table_is_two_distinct_routers() {
        assert_ne!(VENUE_A.router, VENUE_B.router);
        assert_ne!(VENUE_A.factory, VENUE_B.factory);
        assert_eq!(venue(VenueId::Quickswap).router, VENUE_A.router);
        assert_eq!(venue(VenueId::Sushiswap).router, VENUE_B.router);
    }

    #[tokio::test]
    async fn cached_quote_hits_within_block_and_zeroes_when_stale() {
        let rpc = Arc::new(RpcClient::new("http://localhost:1", None, None).unwrap());
        let router = DexRouter::new(rpc);
        let path = [Address::ZERO, Address::repeat_byte(1)];

        router.observe_block(50);
        router.seed_quote(VENUE_A.router, &path, U256::from(10u64), 50, U256::from(99u64));

        let hit = router
            .quote_cached(VENUE_A.router, &path, U256::from(10u64), 50)
            .await;
        assert_eq!(hit, U256::from(99u64));

        // A newer block invalidates; an older one reads zero without
        // touching the gauge.
        router.observe_block(51);
        let stale = router
            .quote_cached(VENUE_A.router, &path, U256::from(10u64), 50)
            .await;
        assert_eq!(stale, U256::ZERO);
        assert_eq!(router.current_block.load(Ordering::Acquire), 51);
    }
}
