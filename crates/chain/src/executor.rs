//! Liquidation executor contract ABI.
//!
//! The executor receives one atomic instruction: flash-borrow the debt asset,
//! repay the borrower, run the supplied swaps in order, repay the loan plus
//! premium, forward the residual to `profitReceiver`. The core only encodes
//! input for it; the flash-loan callback lives on chain.
//!
//! Deployments occasionally front the canonical entry points with proxy
//! selectors, so both 4-byte selectors can be overridden from config.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{bail, Result};

sol! {
    /// One swap leg: a router and opaque pre-encoded calldata for it.
    #[derive(Debug, PartialEq)]
    struct Swap {
        address router;
        bytes callData;
    }

    #[derive(Debug, PartialEq)]
    struct LiquidationParams {
        address user;
        address debtAsset;
        uint256 debtToCover;
        address collateralAsset;
        Swap[] swaps;
        address profitReceiver;
        uint256 minProfit;
    }

    #[derive(Debug, PartialEq)]
    struct BatchLiquidationParams {
        address[] users;
        address debtAsset;
        uint256[] debtToCover;
        address collateralAsset;
        Swap[] swaps;
        address profitReceiver;
        uint256 minProfit;
    }

    interface ILiquidationExecutor {
        function liquidateAndArb(LiquidationParams params) external;
        function liquidateBatchAndArb(BatchLiquidationParams params) external;
    }
}

/// Calldata builder for the executor, with overridable selectors.
#[derive(Debug, Clone)]
pub struct ExecutorAbi {
    liquidate_selector: [u8; 4],
    batch_selector: [u8; 4],
}

impl Default for ExecutorAbi {
    fn default() -> Self {
        Self {
            liquidate_selector: ILiquidationExecutor::liquidateAndArbCall::SELECTOR,
            batch_selector: ILiquidationExecutor::liquidateBatchAndArbCall::SELECTOR,
        }
    }
}

impl ExecutorAbi {
    /// Build with optional selector overrides (`"0x12345678"` or bare hex).
    pub fn with_overrides(
        liquidate_override: Option<&str>,
        batch_override: Option<&str>,
    ) -> Result<Self> {
        let mut abi = Self::default();
        if let Some(s) = liquidate_override {
            abi.liquidate_selector = parse_selector(s)?;
        }
        if let Some(s) = batch_override {
            abi.batch_selector = parse_selector(s)?;
        }
        Ok(abi)
    }

    /// ABI-encode a `liquidateAndArb` call.
    pub fn encode_liquidate(&self, params: LiquidationParams) -> Bytes {
        let mut data = ILiquidationExecutor::liquidateAndArbCall { params }.abi_encode();
        data[..4].copy_from_slice(&self.liquidate_selector);
        data.into()
    }

    /// ABI-encode a `liquidateBatchAndArb` call. Callers uphold
    /// `sum(debtToCover) <= flash loan amount`; lengths must match.
    pub fn encode_liquidate_batch(&self, params: BatchLiquidationParams) -> Result<Bytes> {
        if params.users.len() != params.debtToCover.len() {
            bail!(
                "batch length mismatch: {} users vs {} amounts",
                params.users.len(),
                params.debtToCover.len()
            );
        }
        let mut data = ILiquidationExecutor::liquidateBatchAndArbCall { params }.abi_encode();
        data[..4].copy_from_slice(&self.batch_selector);
        Ok(data.into())
    }
}

/// Convenience constructor for the single-liquidation tuple.
#[allow(clippy::too_many_arguments)]
pub fn liquidation_params(
    user: Address,
    debt_asset: Address,
    debt_to_cover: U256,
    collateral_asset: Address,
    swaps: Vec<Swap>,
    profit_receiver: Address,
    min_profit: U256,
) -> LiquidationParams {
    LiquidationParams {
        user,
        debtAsset: debt_asset,
        debtToCover: debt_to_cover,
        collateralAsset: collateral_asset,
        swaps,
        profitReceiver: profit_receiver,
        minProfit: min_profit,
    }
}

fn parse_selector(raw: &str) -> Result<[u8; 4]> {
    let hex = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = alloy::hex::decode(hex)?;
    if bytes.len() != 4 {
        bail!("selector must be 4 bytes, got {}", bytes.len());
    }
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn sample_params() -> LiquidationParams {
        liquidation_params(
            address!("1111111111111111111111111111111111111111"),
            address!("2222222222222222222222222222222222222222"),
            U256::from(5_000_000u64),
            address!("3333333333333333333333333333333333333333"),
            vec![Swap {
                router: address!("4444444444444444444444444444444444444444"),
                callData: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            }],
            address!("5555555555555555555555555555555555555555"),
            U256::from(1u64),
        )
    }

    #[test]
    fn liquidate_roundtrip() {
        let abi = ExecutorAbi::default();
        let params = sample_params();
        let data = abi.encode_liquidate(params.clone());

        let decoded = ILiquidationExecutor::liquidateAndArbCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.params, params);
    }

    #[test]
    fn batch_roundtrip() {
        let abi = ExecutorAbi::default();
        let params = BatchLiquidationParams {
            users: vec![
                address!("1111111111111111111111111111111111111111"),
                address!("6666666666666666666666666666666666666666"),
            ],
            debtAsset: address!("2222222222222222222222222222222222222222"),
            debtToCover: vec![U256::from(100u64), U256::from(250u64)],
            collateralAsset: address!("3333333333333333333333333333333333333333"),
            swaps: vec![],
            profitReceiver: address!("5555555555555555555555555555555555555555"),
            minProfit: U256::from(1u64),
        };
        let data = abi.encode_liquidate_batch(params.clone()).unwrap();

        let decoded = ILiquidationExecutor::liquidateBatchAndArbCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.params, params);
    }

    #[test]
    fn batch_rejects_length_mismatch() {
        let abi = ExecutorAbi::default();
        let params = BatchLiquidationParams {
            users: vec![address!("1111111111111111111111111111111111111111")],
            debtAsset: Address::ZERO,
            debtToCover: vec![],
            collateralAsset: Address::ZERO,
            swaps: vec![],
            profitReceiver: Address::ZERO,
            minProfit: U256::ZERO,
        };
        assert!(abi.encode_liquidate_batch(params).is_err());
    }

    #[test]
    fn selector_override_is_spliced() {
        let abi = ExecutorAbi::with_overrides(Some("0xaabbccdd"), None).unwrap();
        let data = abi.encode_liquidate(sample_params());
        assert_eq!(&data[..4], &[0xaa, 0xbb, 0xcc, 0xdd]);
        // Body is unchanged by the splice.
        let default_data = ExecutorAbi::default().encode_liquidate(sample_params());
        assert_eq!(&data[4..], &default_data[4..]);
    }

    #[test]
    fn selector_override_rejects_bad_length() {
        assert!(ExecutorAbi::with_overrides(Some("0xaabb"), None).is_err());
    }

    #[test]
    fn precompute_form_encodes_zero_cover() {
        // Precompute entries carry debtToCover = 0 and are rebuilt at
        // execution time; the encoding itself must be stable.
        let abi = ExecutorAbi::default();
        let mut params = sample_params();
        params.debtToCover = U256::ZERO;
        let a = abi.encode_liquidate(params.clone());
        let b = abi.encode_liquidate(params);
        assert_eq!(a, b);
    }
}
