//! On-chain contract interfaces queried via `eth_call`.

use alloy::sol;

sol! {
    /// Aave v3 lending pool, account-health surface only.
    interface IPool {
        function getUserAccountData(address user)
            external
            view
            returns (
                uint256 totalCollateralBase,
                uint256 totalDebtBase,
                uint256 availableBorrowsBase,
                uint256 currentLiquidationThreshold,
                uint256 ltv,
                uint256 healthFactor
            );
    }

    /// Multicall3 aggregator.
    interface IMulticall3 {
        struct Call {
            address target;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function tryAggregate(bool requireSuccess, Call[] calldata calls)
            external
            returns (Result[] memory returnData);
    }

    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    interface IUniswapV2Pair {
        function getReserves()
            external
            view
            returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }

    interface IUniswapV2Router02 {
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external
            view
            returns (uint256[] memory amounts);

        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }

    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn v2_swap_selector_is_canonical() {
        // swapExactTokensForTokens(uint256,uint256,address[],address,uint256)
        assert_eq!(
            IUniswapV2Router02::swapExactTokensForTokensCall::SELECTOR,
            [0x38, 0xed, 0x17, 0x39]
        );
    }

    #[test]
    fn get_amounts_out_selector_is_canonical() {
        // getAmountsOut(uint256,address[])
        assert_eq!(
            IUniswapV2Router02::getAmountsOutCall::SELECTOR,
            [0xd0, 0x6c, 0xa6, 0x1f]
        );
    }

    #[test]
    fn get_pair_selector_is_canonical() {
        // getPair(address,address)
        assert_eq!(
            IUniswapV2Factory::getPairCall::SELECTOR,
            [0xe6, 0xa4, 0x39, 0x05]
        );
    }

    #[test]
    fn get_reserves_selector_is_canonical() {
        // getReserves()
        assert_eq!(
            IUniswapV2Pair::getReservesCall::SELECTOR,
            [0x09, 0x02, 0xf1, 0xac]
        );
    }

    #[test]
    fn erc20_selectors_are_canonical() {
        assert_eq!(IERC20::decimalsCall::SELECTOR, [0x31, 0x3c, 0xe5, 0x67]);
        assert_eq!(IERC20::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(IERC20::allowanceCall::SELECTOR, [0xdd, 0x62, 0xed, 0x3e]);
    }
}
