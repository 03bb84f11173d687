//! Polygon mainnet addresses and chain parameters.

use alloy::primitives::{address, Address};

/// Polygon PoS chain id.
pub const CHAIN_ID: u64 = 137;

/// Aave v3 Pool (proxy).
pub const AAVE_V3_POOL: Address = address!("794a61358d6845594f94dc1db02a252b5b4814ad");

/// Multicall3 universal deployment.
pub const MULTICALL3: Address = address!("ca11bde05977b3631167028862be2a173976ca11");

/// Quickswap V2 router (venue A).
pub const QUICKSWAP_ROUTER: Address = address!("a5e0829caced8ffdd4de3c43696c57f7d7a678ff");

/// Quickswap V2 factory.
pub const QUICKSWAP_FACTORY: Address = address!("5757371414417b8c6caad45baef941abc7d3ab32");

/// Sushiswap V2 router (venue B).
pub const SUSHISWAP_ROUTER: Address = address!("1b02da8cb0d097eb8d57a175b88c7d8b47997506");

/// Sushiswap V2 factory.
pub const SUSHISWAP_FACTORY: Address = address!("c35dadb65012ec5796536bd9864ede8773abc74c");

/// Wrapped native token (WMATIC).
pub const WMATIC: Address = address!("0d500b1d8e8ef31e21c99d1db9a6444d3adf1270");

/// USDC (bridged), 6 decimals. Reference stable for pricing and gas routing.
pub const USDC: Address = address!("2791bca1f2de4661ed88a30c99a7a9449aa84174");

/// USDC decimals.
pub const USDC_DECIMALS: u8 = 6;
