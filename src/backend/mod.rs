//! Pluggable settlement backends
//!
//! The engine never talks to a ledger directly; every value movement goes
//! through [`SettlementBackend`]. Three implementations ship: an
//! aggregator-backed HTTP trader, a peer-to-peer transfer backend, and a
//! local bonding-curve simulation.

pub mod aggregator;
pub mod curve_sim;
pub mod transfer;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;
use crate::pricing::{PriceQuote, Side};

pub use aggregator::AggregatorBackend;
pub use curve_sim::CurveSimBackend;
pub use transfer::TransferBackend;

/// Result of a settled swap.
///
/// Deltas are what settlement did to the acting wallet's balances, fee
/// excluded; the scheduler applies them under the session lock and charges
/// the flat fee separately.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Backend-specific settlement reference (tx signature or digest)
    pub reference: String,
    /// Signed change to the wallet's SOL balance
    pub sol_delta: f64,
    /// Signed change to the wallet's token balance
    pub token_delta: f64,
    /// Notional SOL moved, counted toward session volume
    pub sol_volume: f64,
    /// Average fill price, SOL per token
    pub price: f64,
    pub price_impact_pct: f64,
}

/// Abstract settlement layer for quotes, swaps, and plain transfers.
#[async_trait]
pub trait SettlementBackend: Send + Sync {
    /// Quote a trade. For buys `amount` is SOL in; for sells, tokens in.
    async fn quote(&self, side: Side, amount: f64, slippage_bps: u32) -> Result<PriceQuote>;

    /// Settle a previously quoted trade for the given wallet.
    /// All-or-nothing: an error means no value moved.
    async fn swap(&self, wallet: &Pubkey, quote: &PriceQuote) -> Result<Settlement>;

    /// Move SOL between two accounts, confirmed before returning.
    /// Used for wallet funding, asset distribution, and sweep-back.
    async fn transfer(&self, from: &Pubkey, to: &Pubkey, amount_sol: f64) -> Result<String>;

    /// Flat settlement fee charged per trade, in SOL
    fn flat_fee_sol(&self) -> f64;

    fn kind(&self) -> BackendKind;
}

/// Build the backend selected by configuration.
pub fn build_backend(cfg: &BackendConfig) -> Result<Arc<dyn SettlementBackend>> {
    Ok(match cfg.kind {
        BackendKind::Aggregator => Arc::new(AggregatorBackend::new(
            cfg.api_url.clone(),
            cfg.api_key.clone(),
            cfg.fee_sol,
        )),
        BackendKind::Transfer => Arc::new(TransferBackend::new(cfg.reference_price, cfg.fee_sol)?),
        BackendKind::CurveSim => Arc::new(CurveSimBackend::new(
            crate::pricing::LinearCurve::new(
                cfg.curve.base_price,
                cfg.curve.max_price,
                cfg.curve.total_supply,
            )?,
            cfg.fee_sol,
        )),
    })
}

/// Deterministic settlement reference for simulated backends:
/// base58 of sha256 over the settlement identity.
pub(crate) fn settlement_ref(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    bs58::encode(hasher.finalize()).into_string()
}
