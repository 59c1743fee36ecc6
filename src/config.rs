//! Configuration loading and validation

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Seed for the decision rng; unset means entropy
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

/// Funding account configuration. The funding account is shared across
/// sessions and assumed externally balance-checked before session start.
#[derive(Debug, Clone, Deserialize)]
pub struct FundingConfig {
    /// Path to a JSON keypair file; a fresh keypair is generated if unset
    #[serde(default)]
    pub keypair_path: Option<String>,
    /// Balance available for provisioning, in SOL
    #[serde(default = "default_funding_balance")]
    pub balance_sol: f64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            keypair_path: None,
            balance_sol: default_funding_balance(),
        }
    }
}

/// Which settlement backend a session trades through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Aggregator-backed settlement over an HTTP trade API
    Aggregator,
    /// Peer-to-peer transfers, zero price impact, fee-only cost
    Transfer,
    /// Local bonding-curve simulation, no external calls
    CurveSim,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    /// Base URL of the aggregator trade API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Flat settlement fee charged per trade, in SOL
    #[serde(default = "default_fee_sol")]
    pub fee_sol: f64,
    /// Reference price for the transfer backend, SOL per token
    #[serde(default = "default_reference_price")]
    pub reference_price: f64,
    #[serde(default)]
    pub curve: CurveConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            api_url: default_api_url(),
            api_key: None,
            fee_sol: default_fee_sol(),
            reference_price: default_reference_price(),
            curve: CurveConfig::default(),
        }
    }
}

/// Bonding curve parameters for the simulated backend
#[derive(Debug, Clone, Deserialize)]
pub struct CurveConfig {
    #[serde(default = "default_base_price")]
    pub base_price: f64,
    #[serde(default = "default_max_price")]
    pub max_price: f64,
    #[serde(default = "default_total_supply")]
    pub total_supply: f64,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            base_price: default_base_price(),
            max_price: default_max_price(),
            total_supply: default_total_supply(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory for the JSONL trade log and session snapshots;
    /// unset keeps records in memory only
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: None }
    }
}

/// Per-session trading parameters. All values are clamped into their
/// documented bounds at session creation; nonsensical combinations are
/// rejected outright.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_wallet_count")]
    pub wallet_count: usize,
    #[serde(default = "default_trades_per_minute")]
    pub trades_per_minute: u32,
    /// Total SOL distributed to the wallet pool at session start
    #[serde(default = "default_starting_capital")]
    pub starting_capital: f64,
    /// Volume target in SOL; reaching it completes the session
    #[serde(default = "default_target_volume")]
    pub target_volume: f64,
    #[serde(default = "default_max_loss_percent")]
    pub max_loss_percent: f64,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u64,
    /// Probability of choosing buy in the unbiased regime
    #[serde(default = "default_buy_ratio")]
    pub buy_ratio: f64,
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: f64,
    #[serde(default = "default_max_trade_size")]
    pub max_trade_size: f64,
    #[serde(default = "default_parallel_trades")]
    pub parallel_trades: usize,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Tokens pre-distributed to each wallet so early sells are possible
    #[serde(default)]
    pub seed_asset_amount: f64,
    /// Wallets funded concurrently per provisioning batch
    #[serde(default = "default_funding_batch_size")]
    pub funding_batch_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wallet_count: default_wallet_count(),
            trades_per_minute: default_trades_per_minute(),
            starting_capital: default_starting_capital(),
            target_volume: default_target_volume(),
            max_loss_percent: default_max_loss_percent(),
            duration_minutes: default_duration_minutes(),
            buy_ratio: default_buy_ratio(),
            min_trade_size: default_min_trade_size(),
            max_trade_size: default_max_trade_size(),
            parallel_trades: default_parallel_trades(),
            slippage_bps: default_slippage_bps(),
            seed_asset_amount: 0.0,
            funding_batch_size: default_funding_batch_size(),
        }
    }
}

impl SessionConfig {
    /// Clamp every knob into its documented bounds and reject combinations
    /// that cannot produce a working session.
    pub fn sanitized(&self) -> Result<Self> {
        if self.starting_capital <= 0.0 {
            return Err(Error::Config("starting_capital must be positive".into()));
        }
        if self.target_volume <= 0.0 {
            return Err(Error::Config("target_volume must be positive".into()));
        }
        if self.min_trade_size <= 0.0 {
            return Err(Error::Config("min_trade_size must be positive".into()));
        }

        let mut cfg = self.clone();
        cfg.wallet_count = cfg.wallet_count.clamp(1, 100);
        cfg.trades_per_minute = cfg.trades_per_minute.clamp(1, 600);
        cfg.max_loss_percent = cfg.max_loss_percent.clamp(0.0, 100.0);
        cfg.duration_minutes = cfg.duration_minutes.clamp(1, 1440);
        cfg.buy_ratio = cfg.buy_ratio.clamp(0.0, 1.0);
        cfg.parallel_trades = cfg.parallel_trades.clamp(1, 10);
        cfg.slippage_bps = cfg.slippage_bps.min(10_000);
        cfg.funding_batch_size = cfg.funding_batch_size.clamp(5, 10);
        if cfg.max_trade_size < cfg.min_trade_size {
            cfg.max_trade_size = cfg.min_trade_size;
        }
        cfg.seed_asset_amount = cfg.seed_asset_amount.max(0.0);

        let per_wallet = cfg.starting_capital / cfg.wallet_count as f64;
        if per_wallet < cfg.min_trade_size {
            return Err(Error::Config(format!(
                "per-wallet funding {:.9} below min_trade_size {:.9}",
                per_wallet, cfg.min_trade_size
            )));
        }

        Ok(cfg)
    }

    /// Sleep between trade batches, per the session's rate target
    pub fn tick_interval(&self) -> std::time::Duration {
        let ms = 60.0 / (self.trades_per_minute as f64 * self.parallel_trades as f64) * 1000.0;
        std::time::Duration::from_millis(ms.max(1.0) as u64)
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix VOLRUN_)
            .add_source(
                config::Environment::with_prefix("VOLRUN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.session.sanitized().context("Invalid session config")?;

        Ok(config)
    }
}

// Default value functions
fn default_funding_balance() -> f64 {
    1.0
}

fn default_backend_kind() -> BackendKind {
    BackendKind::CurveSim
}

fn default_api_url() -> String {
    std::env::var("VOLRUN_API_URL").unwrap_or_else(|_| "https://quote-api.jup.ag/v6".into())
}

fn default_fee_sol() -> f64 {
    0.000005
}

fn default_reference_price() -> f64 {
    0.0001
}

fn default_base_price() -> f64 {
    0.000001
}

fn default_max_price() -> f64 {
    0.01
}

fn default_total_supply() -> f64 {
    1_000_000.0
}

fn default_wallet_count() -> usize {
    8
}

fn default_trades_per_minute() -> u32 {
    60
}

fn default_starting_capital() -> f64 {
    0.5
}

fn default_target_volume() -> f64 {
    100.0
}

fn default_max_loss_percent() -> f64 {
    10.0
}

fn default_duration_minutes() -> u64 {
    60
}

fn default_buy_ratio() -> f64 {
    0.6
}

fn default_min_trade_size() -> f64 {
    0.005
}

fn default_max_trade_size() -> f64 {
    0.05
}

fn default_parallel_trades() -> usize {
    4
}

fn default_slippage_bps() -> u32 {
    250
}

fn default_funding_batch_size() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = SessionConfig::default().sanitized().unwrap();
        assert_eq!(cfg.wallet_count, 8);
        assert!(cfg.min_trade_size <= cfg.max_trade_size);
    }

    #[test]
    fn test_clamping() {
        let cfg = SessionConfig {
            wallet_count: 10_000,
            trades_per_minute: 0,
            parallel_trades: 99,
            buy_ratio: 1.7,
            slippage_bps: 50_000,
            funding_batch_size: 1,
            max_trade_size: 0.001,
            min_trade_size: 0.002,
            starting_capital: 100.0,
            ..SessionConfig::default()
        };
        let cfg = cfg.sanitized().unwrap();
        assert_eq!(cfg.wallet_count, 100);
        assert_eq!(cfg.trades_per_minute, 1);
        assert_eq!(cfg.parallel_trades, 10);
        assert_eq!(cfg.buy_ratio, 1.0);
        assert_eq!(cfg.slippage_bps, 10_000);
        assert_eq!(cfg.funding_batch_size, 5);
        assert_eq!(cfg.max_trade_size, cfg.min_trade_size);
    }

    #[test]
    fn test_rejects_nonsense() {
        let cfg = SessionConfig {
            starting_capital: 0.0,
            ..SessionConfig::default()
        };
        assert!(matches!(cfg.sanitized(), Err(Error::Config(_))));

        let cfg = SessionConfig {
            target_volume: -5.0,
            ..SessionConfig::default()
        };
        assert!(cfg.sanitized().is_err());

        // Capital spread too thin across wallets to ever trade.
        let cfg = SessionConfig {
            starting_capital: 0.001,
            wallet_count: 100,
            ..SessionConfig::default()
        };
        assert!(cfg.sanitized().is_err());
    }

    #[test]
    fn test_tick_interval_formula() {
        let cfg = SessionConfig {
            trades_per_minute: 60,
            parallel_trades: 4,
            ..SessionConfig::default()
        };
        // 60 / (60 * 4) * 1000 = 250ms per batch
        assert_eq!(cfg.tick_interval(), std::time::Duration::from_millis(250));
    }
}
