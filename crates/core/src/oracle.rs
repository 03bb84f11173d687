//! Pricing and token-metadata caches.
//!
//! `PriceOracle` answers "USD per whole token": configured overrides first,
//! then a DEX-derived quote of one whole token into USDC (direct pair, then
//! via WMATIC), and finally 1.0 so sizing still proceeds on quiet test
//! deployments. `DecimalsCache` and `ReserveParamsStore` are process-lifetime
//! and safe to be stale.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use tracing::debug;

use flashliq_chain::constants;
use flashliq_chain::contracts::IERC20;
use flashliq_chain::router::{DexRouter, VENUE_A, VENUE_B};
use flashliq_chain::rpc::RpcClient;

use crate::math::{pow10, u256_to_f64};
use crate::types::ReserveParams;

/// Fallback when a token does not answer `decimals()`.
const DEFAULT_DECIMALS: u8 = 18;

/// Process-lifetime ERC-20 decimals cache (0..=36 accepted, 18 on failure).
pub struct DecimalsCache {
    rpc: Arc<RpcClient>,
    cache: DashMap<Address, u8>,
}

impl DecimalsCache {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self {
            rpc,
            cache: DashMap::new(),
        }
    }

    pub async fn get(&self, token: Address) -> u8 {
        if let Some(hit) = self.cache.get(&token) {
            return *hit;
        }
        let decimals = match self
            .rpc
            .eth_call(token, IERC20::decimalsCall {}.abi_encode().into(), None)
            .await
        {
            Ok(ret) if ret.len() >= 32 => {
                let value = U256::from_be_slice(&ret[ret.len() - 32..]).to::<u64>();
                if value <= 36 {
                    value as u8
                } else {
                    DEFAULT_DECIMALS
                }
            }
            _ => DEFAULT_DECIMALS,
        };
        self.cache.insert(token, decimals);
        decimals
    }

    /// Seed a known value (tests, config warm-up).
    pub fn put(&self, token: Address, decimals: u8) {
        self.cache.insert(token, decimals);
    }
}

/// Per-debt-asset liquidation parameters with config overrides.
pub struct ReserveParamsStore {
    overrides: HashMap<Address, ReserveParams>,
}

impl ReserveParamsStore {
    pub fn new(overrides: HashMap<Address, ReserveParams>) -> Self {
        Self { overrides }
    }

    pub fn get(&self, token: Address) -> ReserveParams {
        self.overrides.get(&token).copied().unwrap_or_default()
    }
}

/// USD price source.
pub struct PriceOracle {
    router: Arc<DexRouter>,
    decimals: Arc<DecimalsCache>,
    overrides: HashMap<Address, f64>,
}

impl PriceOracle {
    pub fn new(
        router: Arc<DexRouter>,
        decimals: Arc<DecimalsCache>,
        overrides: HashMap<Address, f64>,
    ) -> Self {
        Self {
            router,
            decimals,
            overrides,
        }
    }

    /// USD per whole token. Never fails; degrades to 1.0.
    pub async fn usd_price(&self, token: Address) -> f64 {
        if let Some(price) = self.overrides.get(&token) {
            return *price;
        }
        if token == constants::USDC {
            return 1.0;
        }

        let decimals = self.decimals.get(token).await;
        let one_unit = pow10(decimals);

        // Direct token -> USDC on either venue.
        let direct = self
            .quote_either(&[token, constants::USDC], one_unit)
            .await;
        if !direct.is_zero() {
            return u256_to_f64(direct) / 10f64.powi(constants::USDC_DECIMALS as i32);
        }

        // Two hops via the wrapped native token.
        let to_wmatic = self
            .quote_either(&[token, constants::WMATIC], one_unit)
            .await;
        if !to_wmatic.is_zero() {
            let to_usdc = self
                .quote_either(&[constants::WMATIC, constants::USDC], to_wmatic)
                .await;
            if !to_usdc.is_zero() {
                return u256_to_f64(to_usdc) / 10f64.powi(constants::USDC_DECIMALS as i32);
            }
        }

        debug!(token = %token, "no DEX price, defaulting to 1.0");
        1.0
    }

    async fn quote_either(&self, path: &[Address], amount_in: U256) -> U256 {
        let out = self.router.quote(VENUE_A.router, path, amount_in).await;
        if !out.is_zero() {
            return out;
        }
        self.router.quote(VENUE_B.router, path, amount_in).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn rpc() -> Arc<RpcClient> {
        Arc::new(RpcClient::new("http://localhost:1", None, None).unwrap())
    }

    #[test]
    fn reserve_params_default_and_override() {
        let token = address!("1111111111111111111111111111111111111111");
        let store = ReserveParamsStore::new(HashMap::from([(
            token,
            ReserveParams {
                liquidation_bonus_bps: 10_800,
                close_factor_bps: 4_000,
            },
        )]));
        assert_eq!(store.get(token).close_factor_bps, 4_000);

        let other = address!("2222222222222222222222222222222222222222");
        let params = store.get(other);
        assert_eq!(params.liquidation_bonus_bps, 10_500);
        assert_eq!(params.close_factor_bps, 5_000);
    }

    #[tokio::test]
    async fn override_price_wins_without_rpc() {
        let token = address!("1111111111111111111111111111111111111111");
        let router = Arc::new(DexRouter::new(rpc()));
        let decimals = Arc::new(DecimalsCache::new(rpc()));
        let oracle = PriceOracle::new(router, decimals, HashMap::from([(token, 2_345.0)]));
        assert_eq!(oracle.usd_price(token).await, 2_345.0);
    }

    #[tokio::test]
    async fn usdc_is_always_one() {
        let router = Arc::new(DexRouter::new(rpc()));
        let decimals = Arc::new(DecimalsCache::new(rpc()));
        let oracle = PriceOracle::new(router, decimals, HashMap::new());
        assert_eq!(oracle.usd_price(constants::USDC).await, 1.0);
    }

    #[tokio::test]
    async fn seeded_decimals_bypass_rpc() {
        let cache = DecimalsCache::new(rpc());
        let token = address!("1111111111111111111111111111111111111111");
        cache.put(token, 6);
        assert_eq!(cache.get(token).await, 6);
    }
}
