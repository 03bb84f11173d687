//! The `System` aggregate: every shared component, constructed once at
//! startup and passed by reference. Replaces the singletons the components
//! would otherwise reach for.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use flashliq_chain::{
    DexRouter, ExecutorAbi, FeeEscalator, GasOracle, HealthFactorScanner, NonceManager,
    ReservesCache, RpcClient, Wallet,
};

use crate::config::Settings;
use crate::oracle::{DecimalsCache, PriceOracle, ReserveParamsStore};
use crate::precompute::PrecomputeCache;
use crate::telemetry::{CsvLog, EventLog};

pub struct System {
    pub settings: Settings,
    pub rpc: Arc<RpcClient>,
    pub wallet: Wallet,
    pub nonce: NonceManager,
    pub gas: GasOracle,
    pub escalator: FeeEscalator,
    pub router: Arc<DexRouter>,
    pub reserves: ReservesCache,
    pub scanner: HealthFactorScanner,
    pub executor_abi: ExecutorAbi,
    pub decimals: Arc<DecimalsCache>,
    pub prices: PriceOracle,
    pub reserve_params: ReserveParamsStore,
    pub precompute: PrecomputeCache,
    pub events: EventLog,
    pub csv: CsvLog,
}

impl System {
    /// Wire every component from resolved settings. Failures here are
    /// startup failures; the process exits with code 1.
    pub fn build(settings: Settings) -> Result<(Arc<Self>, Vec<JoinHandle<()>>)> {
        let rpc = Arc::new(
            RpcClient::new(
                settings.rpc_url.clone(),
                settings.private_tx_url.clone(),
                settings.rpc_auth_header.as_deref(),
            )
            .context("RPC client")?,
        );

        let wallet = Wallet::from_hex(&settings.private_key).context("signer")?;
        info!(address = %wallet.address(), "wallet ready");

        let nonce = NonceManager::new(rpc.clone(), wallet.address());
        let gas = GasOracle::new(rpc.clone());
        let escalator = FeeEscalator::new(settings.rbf_bump_factor);
        let router = Arc::new(DexRouter::new(rpc.clone()));
        let reserves = ReservesCache::new(rpc.clone());
        let scanner =
            HealthFactorScanner::new(rpc.clone(), settings.aave_pool, settings.multicall);
        let executor_abi = ExecutorAbi::with_overrides(
            settings.liquidate_selector_override.as_deref(),
            settings.batch_selector_override.as_deref(),
        )
        .context("executor selectors")?;
        let decimals = Arc::new(DecimalsCache::new(rpc.clone()));
        let prices = PriceOracle::new(
            router.clone(),
            decimals.clone(),
            settings.price_usd_overrides.clone(),
        );
        let reserve_params = ReserveParamsStore::new(settings.reserve_param_overrides.clone());

        let (events, events_task) = EventLog::spawn(&settings.events_log_path);
        let (csv, csv_task) = CsvLog::spawn(&settings.csv_log_path);

        let system = Arc::new(Self {
            rpc,
            wallet,
            nonce,
            gas,
            escalator,
            router,
            reserves,
            scanner,
            executor_abi,
            decimals,
            prices,
            reserve_params,
            precompute: PrecomputeCache::new(),
            events,
            csv,
            settings,
        });
        Ok((system, vec![events_task, csv_task]))
    }
}
