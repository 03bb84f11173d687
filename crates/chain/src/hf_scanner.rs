//! Batched health-factor reads against the lending pool.
//!
//! One aggregated `eth_call` through Multicall3 covers the whole monitored
//! set; a JSON-RPC batch of independent `eth_call`s is the degraded path. A
//! health factor of 0.0 means "unknown" and is never acted on. This call
//! never errors: every parse failure maps to 0.0 for that user.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use tracing::{debug, warn};

use crate::contracts::{IMulticall3, IPool};
use crate::rpc::RpcClient;

/// One borrower's health snapshot, in input order.
#[derive(Debug, Clone, Copy)]
pub struct AccountHealth {
    pub user: Address,
    /// Health factor; wire value is scaled by 1e18. 0.0 = unknown.
    pub health_factor: f64,
    /// Total debt in USD (wire value in 8-decimal base units). 0.0 = unknown.
    pub total_debt_usd: f64,
}

pub struct HealthFactorScanner {
    rpc: Arc<RpcClient>,
    pool: Address,
    multicall: Address,
}

impl HealthFactorScanner {
    pub fn new(rpc: Arc<RpcClient>, pool: Address, multicall: Address) -> Self {
        Self { rpc, pool, multicall }
    }

    /// Fetch health factors for `users`, preserving input order.
    pub async fn fetch(&self, users: &[Address]) -> Vec<AccountHealth> {
        match users {
            [] => Vec::new(),
            [single] => vec![self.fetch_single(*single).await],
            many => match self.fetch_aggregated(many).await {
                Some(out) => out,
                None => self.fetch_batch_fallback(many).await,
            },
        }
    }

    async fn fetch_single(&self, user: Address) -> AccountHealth {
        let data = IPool::getUserAccountDataCall { user }.abi_encode();
        let (health_factor, total_debt_usd) =
            match self.rpc.eth_call(self.pool, data.into(), Some("latest")).await {
                Ok(ret) => decode_account_data(&ret),
                Err(e) => {
                    warn!(user = %user, error = %e, "getUserAccountData failed");
                    (0.0, 0.0)
                }
            };
        AccountHealth {
            user,
            health_factor,
            total_debt_usd,
        }
    }

    /// Multicall3 `tryAggregate(false, ...)` path. None signals the caller to
    /// fall back to a JSON-RPC batch.
    async fn fetch_aggregated(&self, users: &[Address]) -> Option<Vec<AccountHealth>> {
        let calls: Vec<IMulticall3::Call> = users
            .iter()
            .map(|user| IMulticall3::Call {
                target: self.pool,
                callData: IPool::getUserAccountDataCall { user: *user }
                    .abi_encode()
                    .into(),
            })
            .collect();
        let aggregate = IMulticall3::tryAggregateCall {
            requireSuccess: false,
            calls,
        };

        let ret = match self
            .rpc
            .eth_call(self.multicall, aggregate.abi_encode().into(), Some("latest"))
            .await
        {
            Ok(ret) => ret,
            Err(e) => {
                warn!(error = %e, "aggregator eth_call failed, using batch fallback");
                return None;
            }
        };

        let results = match IMulticall3::tryAggregateCall::abi_decode_returns(&ret) {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "aggregator return undecodable, using batch fallback");
                return None;
            }
        };

        let mut out = Vec::with_capacity(users.len());
        for (i, user) in users.iter().enumerate() {
            let (health_factor, total_debt_usd) = results
                .get(i)
                .map(|r| decode_account_data(&r.returnData))
                .unwrap_or((0.0, 0.0));
            out.push(AccountHealth {
                user: *user,
                health_factor,
                total_debt_usd,
            });
        }
        debug!(users = users.len(), "health factors via aggregator");
        Some(out)
    }

    /// JSON-RPC batch of independent `eth_call`s, correlated by index.
    async fn fetch_batch_fallback(&self, users: &[Address]) -> Vec<AccountHealth> {
        let calls: Vec<_> = users
            .iter()
            .map(|user| {
                (
                    self.pool,
                    IPool::getUserAccountDataCall { user: *user }
                        .abi_encode()
                        .into(),
                )
            })
            .collect();

        let responses = match self.rpc.batch_eth_call(&calls).await {
            Ok(responses) => responses,
            Err(e) => {
                warn!(error = %e, "batch fallback failed entirely");
                Vec::new()
            }
        };

        users
            .iter()
            .enumerate()
            .map(|(i, user)| {
                let (health_factor, total_debt_usd) = responses
                    .get(i)
                    .and_then(|r| r.as_ref())
                    .map(|ret| decode_account_data(ret))
                    .unwrap_or((0.0, 0.0));
                AccountHealth {
                    user: *user,
                    health_factor,
                    total_debt_usd,
                }
            })
            .collect()
    }
}

/// Decode `(health_factor, total_debt_usd)` from a `getUserAccountData`
/// return. The health factor is the 6th word (1e18-scaled), the total debt
/// the 2nd (8-decimal base units). Short or malformed data reads as zeroes.
pub fn decode_account_data(ret: &[u8]) -> (f64, f64) {
    if ret.len() < 32 * 6 {
        return (0.0, 0.0);
    }
    let hf = u256_as_f64(U256::from_be_slice(&ret[160..192])) / 1e18;
    let debt = u256_as_f64(U256::from_be_slice(&ret[32..64])) / 1e8;
    (hf, debt)
}

/// Lossy U256 -> f64, adequate for threshold comparisons.
fn u256_as_f64(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        value.to::<u128>() as f64
    } else {
        let limbs = value.as_limbs();
        let mut acc = 0.0f64;
        for limb in limbs.iter().rev() {
            acc = acc * (u64::MAX as f64 + 1.0) + *limb as f64;
        }
        acc
    }
}
