//! Chain interaction layer for the liquidation bot.
//!
//! This crate owns everything that touches the wire:
//! - JSON-RPC client with public and private-submit endpoints
//! - Block watching with WebSocket / filter / polling fallback
//! - Contract interfaces (pool, Multicall3, V2 factories/pairs/routers, ERC-20)
//! - Executor-contract ABI encoding
//! - Health-factor scanning
//! - Per-block reserve and quote caches
//! - EIP-1559 fee derivation, signing, and nonce sequencing

pub mod block_watcher;
pub mod constants;
pub mod contracts;
pub mod executor;
pub mod gas;
pub mod hf_scanner;
pub mod reserves;
pub mod router;
pub mod rpc;
pub mod signer;

pub use block_watcher::BlockWatcher;
pub use executor::{
    liquidation_params, BatchLiquidationParams, ExecutorAbi, LiquidationParams, Swap,
};
pub use gas::{FeeEscalator, GasOracle, GasQuote, GasReading};
pub use hf_scanner::{AccountHealth, HealthFactorScanner};
pub use reserves::{v2_amount_out, ReservesCache};
pub use router::{build_v2_swap_calldata, venue, DexRouter, Venue, VenueId, VENUES, VENUE_A, VENUE_B};
pub use rpc::{RpcClient, RpcError, RpcResult};
pub use signer::{NonceManager, TxFields, Wallet};
