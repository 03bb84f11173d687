//! Per-candidate liquidation execution.
//!
//! The manager is the thin executor half of the planner/executor pair: it
//! gathers the snapshots the pure planner needs (decimals, prices, reserve
//! params, quotes, gas), then builds the executor calldata, assembles and
//! signs the transaction, and drives submission with replace-by-fee
//! escalation until a receipt arrives or the attempt budget is spent.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use serde_json::json;
use smallvec::SmallVec;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use flashliq_chain::router::{venue, VenueId, VENUE_A, VENUE_B};
use flashliq_chain::signer::TxFields;
use flashliq_chain::{build_v2_swap_calldata, constants, liquidation_params, GasQuote, Swap};

use crate::math::u256_to_f64;
use crate::planner::{self, RatioQuote, SizingInputs, SPLIT_RATIOS_PCT};
use crate::precompute::PrecomputeCache;
use crate::system::System;
use crate::telemetry::LiquidationRecord;
use crate::types::{ExecutionResult, LiquidationTarget, SkipReason};

/// Gas budget for the atomic liquidation transaction.
const LIQUIDATION_GAS_LIMIT: u64 = 1_900_000;

/// Swap deadline horizon.
const SWAP_DEADLINE_SECS: u64 = 180;

/// Receipt poll cadence.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Minimum profit the executor enforces on chain; the real guard is ours.
const MIN_PROFIT_WEI: u64 = 1;

pub struct Liquidator {
    sys: Arc<System>,
}

/// Quotes for one hop on both venues.
#[derive(Debug, Clone, Copy)]
struct VenueQuotes {
    a: U256,
    b: U256,
}

impl VenueQuotes {
    fn any(&self) -> U256 {
        if !self.a.is_zero() {
            self.a
        } else {
            self.b
        }
    }
}

impl Liquidator {
    pub fn new(sys: Arc<System>) -> Self {
        Self { sys }
    }

    /// Pre-encode executor calldata for a (user, debt, collateral) tuple with
    /// `debtToCover = 0`; rebuilt with live sizing at execution time.
    pub fn precompute_calldata(&self, user: Address, debt: Address, collateral: Address) {
        let key = PrecomputeCache::key(user, debt, collateral);
        if self.sys.precompute.contains(&key) {
            return;
        }
        let params = liquidation_params(
            user,
            debt,
            U256::ZERO,
            collateral,
            Vec::new(),
            self.sys.wallet.address(),
            U256::from(MIN_PROFIT_WEI),
        );
        let calldata = self.sys.executor_abi.encode_liquidate(params);
        self.sys
            .precompute
            .put_if_absent(key, format!("0x{}", alloy::hex::encode(&calldata)));
    }

    /// Build, guard, sign, and submit one atomic liquidation.
    pub async fn execute_atomic(
        &self,
        target: &LiquidationTarget,
        max_slippage_bps: f64,
        block: u64,
    ) -> Result<ExecutionResult> {
        let sys = &self.sys;
        let settings = &sys.settings;

        // Snapshot: token metadata, reserve params, prices.
        let debt_decimals = sys.decimals.get(target.debt_asset).await;
        let collateral_decimals = sys.decimals.get(target.collateral_asset).await;
        let reserve_params = sys.reserve_params.get(target.debt_asset);
        let debt_price = sys.prices.usd_price(target.debt_asset).await;
        let collateral_price = sys.prices.usd_price(target.collateral_asset).await;

        let Some(sizing) = planner::size_repay(&SizingInputs {
            usd_notional: target.usd_notional,
            close_factor_bps: reserve_params.close_factor_bps,
            min_liq_usd: settings.min_liq_usd,
            max_liq_usd: settings.max_liq_usd,
            debt_price_usd: debt_price,
            collateral_price_usd: collateral_price,
            debt_decimals,
            collateral_decimals,
        }) else {
            self.emit_skip(target, SkipReason::BelowMinimum);
            return Ok(ExecutionResult::skipped(SkipReason::BelowMinimum));
        };

        // Exit quote, one hop collateral -> debt on both venues.
        let exit = self
            .venue_quotes(
                target.collateral_asset,
                target.debt_asset,
                sizing.collateral_units,
                block,
            )
            .await;
        if exit.a.is_zero() && exit.b.is_zero() {
            self.emit_skip(target, SkipReason::InsufficientLiquidity);
            return Ok(ExecutionResult::skipped(SkipReason::InsufficientLiquidity));
        }

        let slip_bps = settings.clamp_slippage_bps(max_slippage_bps);
        let deadline = unix_now() + SWAP_DEADLINE_SECS;
        let path = [target.collateral_asset, target.debt_asset];

        // Plan the swap legs: proportional split above the trigger, single
        // venue otherwise (A preferred when both quote).
        let mut swaps: Vec<Swap> = Vec::with_capacity(2);
        let mut total_amount_out_min = U256::ZERO;
        if planner::should_split(sizing.repay_usd, settings.split_trigger_usd) {
            if let Some(best) = self.search_split(&path, sizing.collateral_units, block).await {
                for (venue_id, amount_in) in split_leg_amounts(sizing.collateral_units, best) {
                    if amount_in.is_zero() {
                        continue;
                    }
                    let router_addr = venue(venue_id).router;
                    let quoted = sys
                        .router
                        .quote_cached(router_addr, &path, amount_in, block)
                        .await;
                    let out_min = planner::amount_out_min(quoted, slip_bps);
                    total_amount_out_min += out_min;
                    swaps.push(Swap {
                        router: router_addr,
                        callData: build_v2_swap_calldata(
                            amount_in,
                            out_min,
                            &path,
                            settings.executor_address,
                            deadline,
                        ),
                    });
                }
            }
        }
        if swaps.is_empty() {
            // choose_single_venue cannot fail here: one quote is non-zero.
            let venue_id =
                planner::choose_single_venue(exit.a, exit.b).unwrap_or(VenueId::Quickswap);
            let quoted = if venue_id == VenueId::Quickswap {
                exit.a
            } else {
                exit.b
            };
            let out_min = planner::amount_out_min(quoted, slip_bps);
            total_amount_out_min = out_min;
            swaps.push(Swap {
                router: venue(venue_id).router,
                callData: build_v2_swap_calldata(
                    sizing.collateral_units,
                    out_min,
                    &path,
                    settings.executor_address,
                    deadline,
                ),
            });
        }

        let selected = planner::choose_single_venue(exit.a, exit.b)
            .unwrap_or(VenueId::Quickswap)
            .label();
        sys.events.emit(json!({
            "event": "route_quote",
            "pair": format!("{:#x}/{:#x}", target.collateral_asset, target.debt_asset),
            "amount_in_units": u256_to_f64(sizing.collateral_units),
            "quotes": [
                {"dex": VENUE_A.id.label(), "out_units": u256_to_f64(exit.a)},
                {"dex": VENUE_B.id.label(), "out_units": u256_to_f64(exit.b)},
            ],
            "selected_dex": selected,
        }));

        // Profit guard: proceeds must clear debt + flash premium + gas.
        let premium_units = planner::flash_premium(sizing.debt_units);
        let gas_reading = sys.gas.quote().await;
        sys.events.emit(json!({
            "event": "gas_quote",
            "base_fee": gas_reading.base_fee,
            "priority_fee": gas_reading.priority_fee,
            "max_fee": gas_reading.max_fee,
        }));
        let gas_cost_wei =
            U256::from(LIQUIDATION_GAS_LIMIT as u128 * gas_reading.max_fee);
        let gas_cost_in_debt = self
            .gas_cost_in_debt_units(target.debt_asset, gas_cost_wei, block)
            .await;

        if !planner::clears_profit_guard(
            total_amount_out_min,
            sizing.debt_units,
            premium_units,
            gas_cost_in_debt,
        ) {
            self.emit_skip(target, SkipReason::ProfitGuard);
            return Ok(ExecutionResult::skipped(SkipReason::ProfitGuard));
        }

        // Executor calldata and transaction assembly.
        let params = liquidation_params(
            target.user,
            target.debt_asset,
            sizing.debt_units,
            target.collateral_asset,
            swaps,
            sys.wallet.address(),
            U256::from(MIN_PROFIT_WEI),
        );
        let calldata = sys.executor_abi.encode_liquidate(params);

        sys.events.emit(json!({
            "event": "tx_built",
            "tx_kind": "single",
            "pair": format!("{:#x}/{:#x}", target.collateral_asset, target.debt_asset),
            "users_count": 1,
            "debt_units_total": u256_to_f64(sizing.debt_units),
            "amount_out_min_units": u256_to_f64(total_amount_out_min),
        }));

        let nonce = sys.nonce.next().await.context("nonce allocation")?;
        let mut tx = TxFields {
            chain_id: settings.chain_id,
            nonce,
            gas_limit: LIQUIDATION_GAS_LIMIT,
            max_fee_per_gas: gas_reading.max_fee,
            max_priority_fee_per_gas: gas_reading.priority_fee,
            to: settings.executor_address,
            value: U256::ZERO,
            data: calldata,
        };

        let mut record = self.base_record(target, &sizing, premium_units, gas_cost_wei);
        record.status = "ATTEMPT".into();
        sys.csv.write(&record);

        if settings.dry_run {
            info!(user = %target.user, nonce, "dry run: transaction built, not submitted");
            return Ok(ExecutionResult {
                submitted: false,
                success: true,
                tx_hash: None,
                skipped: None,
            });
        }

        let outcome = self.submit_with_rbf(&mut tx).await;
        record.tx_hash = outcome
            .tx_hash
            .map(|h| format!("{h:#x}"))
            .unwrap_or_default();
        record.status = if outcome.success {
            "SUCCESS".into()
        } else {
            "FAILED: no receipt".into()
        };
        sys.csv.write(&record);

        Ok(outcome)
    }

    /// Quote one hop on both venues: local reserve math first, router
    /// `getAmountsOut` as fallback, per venue.
    async fn venue_quotes(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        block: u64,
    ) -> VenueQuotes {
        let path = [token_in, token_out];
        let mut a = self
            .sys
            .reserves
            .quote_local(VENUE_A.factory, token_in, token_out, amount_in, block)
            .await;
        if a.is_zero() {
            a = self
                .sys
                .router
                .quote_cached(VENUE_A.router, &path, amount_in, block)
                .await;
        }
        let mut b = self
            .sys
            .reserves
            .quote_local(VENUE_B.factory, token_in, token_out, amount_in, block)
            .await;
        if b.is_zero() {
            b = self
                .sys
                .router
                .quote_cached(VENUE_B.router, &path, amount_in, block)
                .await;
        }
        VenueQuotes { a, b }
    }

    /// Quote every candidate ratio and pick the best.
    async fn search_split(
        &self,
        path: &[Address; 2],
        total_in: U256,
        block: u64,
    ) -> Option<RatioQuote> {
        let mut quotes: SmallVec<[RatioQuote; 5]> = SmallVec::new();
        for pct in SPLIT_RATIOS_PCT {
            let (in_a, in_b) = planner::split_inputs(total_in, pct);
            let out_a = if in_a.is_zero() {
                U256::ZERO
            } else {
                self.sys
                    .router
                    .quote_cached(VENUE_A.router, path, in_a, block)
                    .await
            };
            let out_b = if in_b.is_zero() {
                U256::ZERO
            } else {
                self.sys
                    .router
                    .quote_cached(VENUE_B.router, path, in_b, block)
                    .await
            };
            quotes.push(RatioQuote {
                venue_a_pct: pct,
                out_a,
                out_b,
            });
        }
        planner::choose_split(&quotes)
    }

    /// Price the gas budget in debt-asset units: wrapped-native -> debt
    /// directly, else wrapped-native -> stable -> debt. Zero when no route
    /// quotes, which weakens the guard but never blocks it.
    async fn gas_cost_in_debt_units(
        &self,
        debt_asset: Address,
        gas_cost_wei: U256,
        block: u64,
    ) -> U256 {
        if debt_asset == constants::WMATIC {
            return gas_cost_wei;
        }
        let direct = self
            .venue_quotes(constants::WMATIC, debt_asset, gas_cost_wei, block)
            .await
            .any();
        if !direct.is_zero() {
            return direct;
        }
        let to_stable = self
            .venue_quotes(constants::WMATIC, constants::USDC, gas_cost_wei, block)
            .await
            .any();
        if to_stable.is_zero() {
            return U256::ZERO;
        }
        if debt_asset == constants::USDC {
            return to_stable;
        }
        self.venue_quotes(constants::USDC, debt_asset, to_stable, block)
            .await
            .any()
    }

    /// Sign and submit with replace-by-fee escalation. Same nonce across
    /// attempts; both fee fields grow by the bump factor between attempts.
    async fn submit_with_rbf(&self, tx: &mut TxFields) -> ExecutionResult {
        let sys = &self.sys;
        let settings = &sys.settings;
        let use_private = settings.submit_private && sys.rpc.has_private_endpoint();
        let submit_kind = if use_private { "private" } else { "public" };

        let mut last_hash: Option<B256> = None;
        let mut submitted = false;

        for attempt in 0..=settings.rbf_max_bumps {
            match self.sign_and_send(tx, use_private).await {
                Ok(hash) => {
                    last_hash = Some(hash);
                    submitted = true;
                    sys.events.emit(json!({
                        "event": "tx_submitted",
                        "tx_hash": format!("{hash:#x}"),
                        "nonce": tx.nonce,
                        "submit_kind": submit_kind,
                        "rbf_index": attempt,
                        "max_fee_per_gas": tx.max_fee_per_gas,
                        "max_priority_fee": tx.max_priority_fee_per_gas,
                    }));

                    if self.wait_for_receipt(hash, settings.receipt_timeout_ms).await {
                        return ExecutionResult {
                            submitted: true,
                            success: true,
                            tx_hash: Some(hash),
                            skipped: None,
                        };
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "submission failed");
                }
            }

            if attempt < settings.rbf_max_bumps {
                let bumped = sys.escalator.next(GasQuote {
                    max_fee_per_gas: tx.max_fee_per_gas,
                    max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
                });
                tx.max_fee_per_gas = bumped.max_fee_per_gas;
                tx.max_priority_fee_per_gas = bumped.max_priority_fee_per_gas;
                sys.events.emit(json!({
                    "event": "tx_rbf_bump",
                    "tx_hash_prev": last_hash.map(|h| format!("{h:#x}")).unwrap_or_default(),
                    "nonce": tx.nonce,
                    "bump_index": attempt + 1,
                    "new_fees": {
                        "max_fee": tx.max_fee_per_gas,
                        "max_prio": tx.max_priority_fee_per_gas,
                    },
                }));
                sleep(Duration::from_secs(settings.rbf_interval_secs)).await;
            }
        }

        ExecutionResult {
            submitted,
            success: false,
            tx_hash: last_hash,
            skipped: None,
        }
    }

    async fn sign_and_send(&self, tx: &TxFields, private: bool) -> Result<B256> {
        let raw = self.sys.wallet.sign_eip1559(tx)?;
        Ok(self.sys.rpc.send_raw_transaction(&raw, private).await?)
    }

    /// Poll for a receipt until the timeout elapses.
    async fn wait_for_receipt(&self, tx_hash: B256, timeout_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.sys.rpc.transaction_receipt(tx_hash).await {
                self.sys.events.emit(json!({
                    "event": "tx_receipt",
                    "tx_hash": format!("{tx_hash:#x}"),
                }));
                return true;
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
        debug!(tx_hash = %tx_hash, timeout_ms, "no receipt within window");
        false
    }

    fn emit_skip(&self, target: &LiquidationTarget, reason: SkipReason) {
        self.sys.events.emit(json!({
            "event": "skip_reason",
            "pair": format!("{:#x}/{:#x}", target.collateral_asset, target.debt_asset),
            "user": format!("{:#x}", target.user),
            "usd_value": target.usd_notional,
            "reason": reason.label(),
        }));
    }

    fn base_record(
        &self,
        target: &LiquidationTarget,
        sizing: &planner::Sizing,
        premium_units: U256,
        gas_cost_wei: U256,
    ) -> LiquidationRecord {
        let settings = &self.sys.settings;
        LiquidationRecord {
            tx_hash: String::new(),
            user: format!("{:#x}", target.user),
            debt_asset: format!("{:#x}", target.debt_asset),
            collateral_asset: format!("{:#x}", target.collateral_asset),
            debt_amount: u256_to_f64(sizing.debt_units),
            collateral_amount: u256_to_f64(sizing.collateral_units),
            debt_usd: sizing.repay_usd,
            collateral_usd: sizing.repay_usd,
            liquidation_premium: u256_to_f64(premium_units),
            gas_cost_wei: gas_cost_wei.try_into().unwrap_or(u128::MAX),
            gas_cost_usd: 0.0,
            profit_usdc: 0.0,
            profit_eur: 0.0,
            status: String::new(),
            chain_id: settings.chain_id,
            executor_address: format!("{:#x}", settings.executor_address),
            gas_strategy: "eip1559_2x_base".into(),
            mev_mode: if settings.submit_private {
                "private".into()
            } else {
                "public".into()
            },
            rpc_endpoint: self.sys.rpc.public_url().to_string(),
            dry_run: settings.dry_run,
        }
    }
}

/// Leg amounts for the chosen ratio: venue A takes `venue_a_pct`, venue B
/// the remainder, summing exactly to the total.
fn split_leg_amounts(total: U256, best: RatioQuote) -> [(VenueId, U256); 2] {
    let (in_a, in_b) = planner::split_inputs(total, best.venue_a_pct);
    [(VenueId::Quickswap, in_a), (VenueId::Sushiswap, in_b)]
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_legs_cover_total() {
        let best = RatioQuote {
            venue_a_pct: 75,
            out_a: U256::from(1u64),
            out_b: U256::from(1u64),
        };
        let total = U256::from(1_000_001u64);
        let legs = split_leg_amounts(total, best);
        assert_eq!(legs[0].0, VenueId::Quickswap);
        assert_eq!(legs[1].0, VenueId::Sushiswap);
        assert_eq!(legs[0].1 + legs[1].1, total);
        assert_eq!(legs[0].1, U256::from(750_000u64));
    }

    #[test]
    fn gas_budget_fits_u256() {
        let wei = U256::from(LIQUIDATION_GAS_LIMIT as u128 * 130_000_000_000u128);
        assert_eq!(wei, U256::from(247_000_000_000_000_000u128));
    }
}
