//! Block-driven engine: consume the block stream, scan the monitored set,
//! and fan liquidation work out onto the worker pool.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use flashliq_chain::BlockWatcher;

use crate::manager::Liquidator;
use crate::pool::WorkerPool;
use crate::system::System;
use crate::telemetry::{Notifier, NullNotifier};
use crate::types::LiquidationTarget;

/// Accounts under this health factor get their calldata precomputed.
pub const PRECOMPUTE_HF_THRESHOLD: f64 = 1.05;

/// Accounts under this health factor are liquidatable.
pub const LIQUIDATION_HF_THRESHOLD: f64 = 1.0;

/// What a health factor demands this block. An unknown factor (0.0) demands
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HfClass {
    pub precompute: bool,
    pub liquidate: bool,
}

pub fn classify(hf: f64) -> HfClass {
    let known = hf > 0.0;
    HfClass {
        precompute: known && hf < PRECOMPUTE_HF_THRESHOLD,
        liquidate: known && hf < LIQUIDATION_HF_THRESHOLD,
    }
}

/// Boundary to the profit-consolidation swap, which runs outside the core as
/// its own non-atomic transaction. Returns a tx hash when it acted.
#[async_trait]
pub trait ProfitConsolidator: Send + Sync {
    async fn consolidate(&self) -> Option<String>;
}

/// Default consolidator: never acts.
pub struct NoopConsolidator;

#[async_trait]
impl ProfitConsolidator for NoopConsolidator {
    async fn consolidate(&self) -> Option<String> {
        None
    }
}

pub struct Engine {
    sys: Arc<System>,
    liquidator: Arc<Liquidator>,
    pool: WorkerPool,
    consolidator: Arc<dyn ProfitConsolidator>,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    pub fn new(sys: Arc<System>) -> Self {
        let pool = WorkerPool::new(sys.settings.max_concurrency);
        Self {
            liquidator: Arc::new(Liquidator::new(sys.clone())),
            pool,
            consolidator: Arc::new(NoopConsolidator),
            notifier: Arc::new(NullNotifier),
            sys,
        }
    }

    pub fn with_consolidator(mut self, consolidator: Arc<dyn ProfitConsolidator>) -> Self {
        self.consolidator = consolidator;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Run until ctrl-c. The watcher task feeds strictly increasing block
    /// numbers; each one triggers a scan-and-dispatch tick.
    pub async fn run(self) -> Result<()> {
        let settings = &self.sys.settings;
        let watcher = Arc::new(BlockWatcher::new(
            self.sys.rpc.clone(),
            settings.ws_urls.clone(),
            settings.ws_auth_header.clone(),
        ));
        let (mut blocks, watcher_task) = watcher.clone().start();
        info!(
            monitored = settings.monitor_users.len(),
            pairs = settings.debt_assets.len() * settings.collateral_assets.len(),
            "engine running"
        );

        loop {
            tokio::select! {
                block = blocks.recv() => {
                    match block {
                        Some(block) => self.on_block(block).await,
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        watcher.stop();
        let _ = watcher_task.await;
        self.pool.shutdown().await;
        info!("engine stopped");
        Ok(())
    }

    /// One block tick: scan health factors, precompute near-threshold
    /// accounts, dispatch liquidatable ones.
    async fn on_block(&self, block: u64) {
        let settings = &self.sys.settings;
        let users = &settings.monitor_users;
        if users.is_empty() {
            debug!(block, "no monitored users");
            return;
        }

        let healths = self.sys.scanner.fetch(users).await;

        let mut precompute_count = 0usize;
        let mut dispatch_count = 0usize;
        for health in &healths {
            let class = classify(health.health_factor);
            if class.precompute {
                precompute_count += 1;
                for debt in &settings.debt_assets {
                    for collateral in &settings.collateral_assets {
                        if debt == collateral {
                            continue;
                        }
                        self.liquidator
                            .precompute_calldata(health.user, *debt, *collateral);
                    }
                }
            }
            if class.liquidate {
                dispatch_count += 1;
                let usd_notional = if health.total_debt_usd > 0.0 {
                    health.total_debt_usd
                } else {
                    settings.min_liq_usd
                };
                for debt in &settings.debt_assets {
                    for collateral in &settings.collateral_assets {
                        if debt == collateral {
                            continue;
                        }
                        let target = LiquidationTarget {
                            user: health.user,
                            debt_asset: *debt,
                            collateral_asset: *collateral,
                            usd_notional,
                        };
                        let liquidator = self.liquidator.clone();
                        let notifier = self.notifier.clone();
                        let max_slippage = settings.max_slippage_bps;
                        // One task per (user, debt, collateral): a failure
                        // here never touches sibling tasks.
                        self.pool.enqueue(async move {
                            match liquidator
                                .execute_atomic(&target, max_slippage, block)
                                .await
                            {
                                Ok(result) => {
                                    notifier.record_attempt(result.success, 0.0);
                                }
                                Err(e) => {
                                    warn!(user = %target.user, error = %e, "liquidation task failed");
                                }
                            }
                        });
                    }
                }
            }
        }

        info!(
            block,
            scanned = healths.len(),
            precompute = precompute_count,
            liquidatable = dispatch_count,
            "block tick"
        );

        if let Some(tx_hash) = self.consolidator.consolidate().await {
            info!(tx_hash, "profit consolidation submitted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_account_demands_nothing() {
        let class = classify(1.20);
        assert!(!class.precompute);
        assert!(!class.liquidate);
    }

    #[test]
    fn near_threshold_account_precomputes_only() {
        let class = classify(1.03);
        assert!(class.precompute);
        assert!(!class.liquidate);
    }

    #[test]
    fn underwater_account_does_both() {
        let class = classify(0.80);
        assert!(class.precompute);
        assert!(class.liquidate);
    }

    #[test]
    fn unknown_health_factor_is_ignored() {
        let class = classify(0.0);
        assert!(!class.precompute);
        assert!(!class.liquidate);
    }

    #[test]
    fn thresholds_are_exclusive_at_boundary() {
        assert!(!classify(1.05).precompute);
        assert!(!classify(1.0).liquidate);
        assert!(classify(1.0).precompute);
    }
}
