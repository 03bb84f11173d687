//! Configuration from a key=value file with environment overlay.
//!
//! The file is `.env`-shaped; unknown keys are ignored. The process
//! environment fills in keys the file leaves out, so secrets can stay out of
//! the file entirely. `Settings` is the typed view the rest of the system
//! consumes, with every default the system relies on in one place.

use std::collections::HashMap;
use std::path::Path;

use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use flashliq_chain::constants;

use crate::types::ReserveParams;

/// Raw key=value store.
#[derive(Debug, Default, Clone)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    /// Load from a key=value file. A missing file is not fatal: the
    /// environment may carry everything.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut values = HashMap::new();
        match dotenvy::from_path_iter(path) {
            Ok(iter) => {
                for item in iter {
                    match item {
                        Ok((key, value)) => {
                            values.insert(key, value);
                        }
                        Err(e) => warn!(path = %path.display(), error = %e, "bad config line"),
                    }
                }
                info!(path = %path.display(), keys = values.len(), "config loaded");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "config file not readable"),
        }
        Self { values }
    }

    /// In-memory config, mainly for tests.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// File entries win; the process environment fills the gaps.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| anyhow!("missing required config: {key}"))
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn u32_or(&self, key: &str, default: u32) -> u32 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no") => false,
            _ => default,
        }
    }
}

/// Typed settings consumed by the engine and manager.
#[derive(Debug, Clone)]
pub struct Settings {
    pub dry_run: bool,

    pub rpc_url: String,
    pub private_tx_url: Option<String>,
    pub rpc_auth_header: Option<String>,
    pub ws_urls: Vec<String>,
    pub ws_auth_header: Option<String>,

    pub chain_id: u64,
    pub aave_pool: Address,
    pub multicall: Address,
    pub executor_address: Address,
    pub private_key: String,

    pub monitor_users: Vec<Address>,
    pub debt_assets: Vec<Address>,
    pub collateral_assets: Vec<Address>,

    pub min_liq_usd: f64,
    pub max_liq_usd: f64,
    pub max_slippage_bps: f64,
    pub split_trigger_usd: f64,

    pub rbf_bump_factor: f64,
    pub rbf_interval_secs: u64,
    pub rbf_max_bumps: u32,
    pub receipt_timeout_ms: u64,

    pub max_concurrency: usize,
    pub submit_private: bool,

    pub price_usd_overrides: HashMap<Address, f64>,
    pub reserve_param_overrides: HashMap<Address, ReserveParams>,
    pub liquidate_selector_override: Option<String>,
    pub batch_selector_override: Option<String>,

    pub events_log_path: String,
    pub csv_log_path: String,
}

impl Settings {
    /// Resolve typed settings; missing required keys are startup failures.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let rpc_url = cfg.require("RPC_URL")?;
        let private_key = cfg.require("PRIVATE_KEY")?;
        let executor_address = parse_address(&cfg.require("EXECUTOR_ADDRESS")?)
            .context("EXECUTOR_ADDRESS")?;

        let mut ws_urls = Vec::new();
        if let Some(url) = cfg.get("WEBSOCKET_RPC_URL") {
            ws_urls.push(url);
        }
        if let Some(url) = cfg.get("WEBSOCKET_RPC_URL_BACKUP") {
            ws_urls.push(url);
        }

        let aave_pool = match cfg.get("AAVE_POOL") {
            Some(raw) => parse_address(&raw).context("AAVE_POOL")?,
            None => constants::AAVE_V3_POOL,
        };
        let multicall = match cfg.get("MULTICALL_ADDRESS") {
            Some(raw) => parse_address(&raw).context("MULTICALL_ADDRESS")?,
            None => constants::MULTICALL3,
        };

        let debt_assets = parse_address_csv(
            &cfg.get("DEBT_ASSETS")
                .or_else(|| cfg.get("DEFAULT_DEBT_ASSET"))
                .unwrap_or_default(),
        );
        let collateral_assets = parse_address_csv(
            &cfg.get("COLLATERAL_ASSETS")
                .or_else(|| cfg.get("DEFAULT_COLLATERAL_ASSET"))
                .unwrap_or_default(),
        );

        Ok(Self {
            dry_run: cfg.bool_or("DRY_RUN", true),
            private_tx_url: cfg.get("PRIVATE_TX_URL"),
            rpc_auth_header: cfg.get("RPC_AUTH_HEADER"),
            ws_urls,
            ws_auth_header: cfg.get("WS_AUTH_HEADER"),
            chain_id: cfg.u64_or("CHAIN_ID", constants::CHAIN_ID),
            aave_pool,
            multicall,
            executor_address,
            private_key,
            monitor_users: parse_address_csv(&cfg.get_or("MONITOR_USERS", "")),
            debt_assets,
            collateral_assets,
            min_liq_usd: cfg.f64_or("MIN_LIQ_USD", 100.0),
            max_liq_usd: cfg.f64_or("MAX_LIQ_USD", 51_000.0),
            max_slippage_bps: cfg.f64_or("MAX_SLIPPAGE_BPS", 50.0),
            split_trigger_usd: cfg.f64_or("SPLIT_TRIGGER_USD", 15_000.0),
            rbf_bump_factor: cfg.f64_or("RBF_BUMP_FACTOR", 1.2),
            rbf_interval_secs: cfg.u64_or("RBF_INTERVAL_SEC", 4),
            rbf_max_bumps: cfg.u32_or("RBF_MAX_BUMPS", 3),
            receipt_timeout_ms: cfg.u64_or("RECEIPT_TIMEOUT_MS", 3_000),
            max_concurrency: cfg.u64_or("MAX_CONCURRENCY", 2).max(1) as usize,
            submit_private: cfg.bool_or("SUBMIT_PRIVATE", false),
            price_usd_overrides: parse_price_overrides(&cfg.get_or("PRICE_USD_OVERRIDES", "")),
            reserve_param_overrides: parse_reserve_overrides(
                &cfg.get_or("RESERVE_PARAM_OVERRIDES", ""),
            ),
            liquidate_selector_override: cfg.get("EXECUTOR_LIQ_ARB_SELECTOR"),
            batch_selector_override: cfg.get("EXECUTOR_LIQ_BATCH_SELECTOR"),
            events_log_path: cfg.get_or("EVENTS_LOG_PATH", "metrics.jsonl"),
            csv_log_path: cfg.get_or("CSV_LOG_PATH", "liquidation_log.csv"),
            rpc_url,
        })
    }

    /// Clamp a requested slippage to the configured ceiling.
    pub fn clamp_slippage_bps(&self, requested_bps: f64) -> u16 {
        requested_bps.min(self.max_slippage_bps).max(0.0) as u16
    }

    pub fn log_summary(&self) {
        info!(
            dry_run = self.dry_run,
            chain_id = self.chain_id,
            executor = %self.executor_address,
            monitored = self.monitor_users.len(),
            debt_assets = self.debt_assets.len(),
            collateral_assets = self.collateral_assets.len(),
            max_concurrency = self.max_concurrency,
            submit_private = self.submit_private,
            "settings resolved"
        );
        info!(
            min_liq_usd = self.min_liq_usd,
            max_liq_usd = self.max_liq_usd,
            max_slippage_bps = self.max_slippage_bps,
            split_trigger_usd = self.split_trigger_usd,
            rbf_bump_factor = self.rbf_bump_factor,
            rbf_max_bumps = self.rbf_max_bumps,
            receipt_timeout_ms = self.receipt_timeout_ms,
            "liquidation parameters"
        );
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| anyhow!("invalid address '{raw}': {e}"))
}

/// Comma-separated addresses; malformed entries are dropped with a warning.
pub fn parse_address_csv(raw: &str) -> Vec<Address> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<Address>() {
            Ok(addr) => Some(addr),
            Err(_) => {
                warn!(entry = s, "dropping malformed address in csv list");
                None
            }
        })
        .collect()
}

/// `token:price,token:price,...`
fn parse_price_overrides(raw: &str) -> HashMap<Address, f64> {
    let mut out = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((token, price)) = entry.split_once(':') else {
            continue;
        };
        let (Ok(token), Ok(price)) = (token.trim().parse::<Address>(), price.trim().parse::<f64>())
        else {
            continue;
        };
        out.insert(token, price);
    }
    out
}

/// `token:bonus_bps:close_factor_bps,...`
fn parse_reserve_overrides(raw: &str) -> HashMap<Address, ReserveParams> {
    let mut out = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut parts = entry.split(':');
        let (Some(token), Some(bonus), Some(close)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let (Ok(token), Ok(bonus), Ok(close)) = (
            token.trim().parse::<Address>(),
            bonus.trim().parse::<u16>(),
            close.trim().parse::<u16>(),
        ) else {
            continue;
        };
        if close > 10_000 {
            warn!(entry, "close factor above 10000 bps ignored");
            continue;
        }
        out.insert(
            token,
            ReserveParams {
                liquidation_bonus_bps: bonus,
                close_factor_bps: close,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const USER: &str = "0x1111111111111111111111111111111111111111";

    fn minimal_pairs() -> Vec<(&'static str, String)> {
        vec![
            ("RPC_URL", "http://localhost:8545".to_string()),
            (
                "PRIVATE_KEY",
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
            ),
            ("EXECUTOR_ADDRESS", USER.to_string()),
        ]
    }

    #[test]
    fn default_values_hold() {
        let cfg = Config::from_pairs(minimal_pairs());
        let s = Settings::from_config(&cfg).unwrap();
        assert!(s.dry_run);
        assert_eq!(s.min_liq_usd, 100.0);
        assert_eq!(s.max_liq_usd, 51_000.0);
        assert_eq!(s.max_slippage_bps, 50.0);
        assert_eq!(s.split_trigger_usd, 15_000.0);
        assert_eq!(s.rbf_bump_factor, 1.2);
        assert_eq!(s.rbf_interval_secs, 4);
        assert_eq!(s.rbf_max_bumps, 3);
        assert_eq!(s.receipt_timeout_ms, 3_000);
        assert_eq!(s.max_concurrency, 2);
        assert!(!s.submit_private);
        assert_eq!(s.chain_id, 137);
        assert_eq!(s.aave_pool, constants::AAVE_V3_POOL);
        assert_eq!(s.multicall, constants::MULTICALL3);
    }

    #[test]
    fn missing_required_key_fails() {
        let cfg = Config::from_pairs([("RPC_URL", "http://localhost:8545")]);
        assert!(Settings::from_config(&cfg).is_err());
    }

    #[test]
    fn csv_lists_parse_and_drop_garbage() {
        let parsed = parse_address_csv(&format!("{USER}, nonsense ,{USER}"));
        assert_eq!(parsed.len(), 2);
        assert!(parse_address_csv("").is_empty());
    }

    #[test]
    fn price_overrides_parse() {
        let out = parse_price_overrides(&format!("{USER}:1.5,bad,{USER}:x"));
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[&address!("1111111111111111111111111111111111111111")],
            1.5
        );
    }

    #[test]
    fn reserve_overrides_parse_and_validate() {
        let out = parse_reserve_overrides(&format!("{USER}:10800:4000,{USER}:1:20000"));
        // Second entry replaces nothing: close factor out of range.
        let params = out[&address!("1111111111111111111111111111111111111111")];
        assert_eq!(params.liquidation_bonus_bps, 10_800);
        assert_eq!(params.close_factor_bps, 4_000);
    }

    #[test]
    fn slippage_is_clamped_to_ceiling() {
        let cfg = Config::from_pairs(minimal_pairs());
        let s = Settings::from_config(&cfg).unwrap();
        assert_eq!(s.clamp_slippage_bps(30.0), 30);
        assert_eq!(s.clamp_slippage_bps(500.0), 50);
        assert_eq!(s.clamp_slippage_bps(-3.0), 0);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut pairs = minimal_pairs();
        pairs.push(("SOME_FUTURE_KNOB", "42".to_string()));
        let cfg = Config::from_pairs(pairs);
        assert!(Settings::from_config(&cfg).is_ok());
    }
}
