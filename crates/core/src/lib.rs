//! Core liquidation logic.
//!
//! This crate holds everything above the wire:
//! - typed configuration with documented defaults
//! - pricing, reserve-parameter, and decimals caches
//! - the pure planner (sizing, split search, profit guard)
//! - the liquidation manager (build, sign, RBF submission)
//! - structured-event and CSV telemetry sinks
//! - the worker pool and the block-driven engine

pub mod config;
pub mod engine;
pub mod manager;
pub mod math;
pub mod oracle;
pub mod planner;
pub mod pool;
pub mod precompute;
pub mod system;
pub mod telemetry;
pub mod types;

pub use config::{Config, Settings};
pub use engine::{classify, Engine, NoopConsolidator, ProfitConsolidator};
pub use manager::Liquidator;
pub use oracle::{DecimalsCache, PriceOracle, ReserveParamsStore};
pub use pool::WorkerPool;
pub use precompute::PrecomputeCache;
pub use system::System;
pub use telemetry::{CsvLog, EventLog, LiquidationRecord, Notifier, NullNotifier};
pub use types::{ExecutionResult, LiquidationTarget, ReserveParams, SkipReason};
