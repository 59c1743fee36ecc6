//! Trade execution
//!
//! Orchestrates quote and swap for one trade attempt against the settlement
//! backend. Settlement is all-or-nothing: any error here means no value
//! moved, and the scheduler records the attempt in `failed_trades` without
//! touching balances.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{Settlement, SettlementBackend};
use crate::error::Result;
use crate::policy::TradeDecision;
use crate::pricing::Side;

/// Multiplier applied to the configured slippage for sells
const SELL_SLIPPAGE_FACTOR: f64 = 1.3;

/// Outcome of one settled trade attempt
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub side: Side,
    pub settlement: Settlement,
    pub effective_slippage_bps: u32,
}

pub struct TradeExecutor {
    backend: Arc<dyn SettlementBackend>,
    slippage_bps: u32,
    max_trade_size: f64,
}

impl TradeExecutor {
    pub fn new(backend: Arc<dyn SettlementBackend>, slippage_bps: u32, max_trade_size: f64) -> Self {
        Self {
            backend,
            slippage_bps,
            max_trade_size,
        }
    }

    pub fn backend(&self) -> &Arc<dyn SettlementBackend> {
        &self.backend
    }

    pub fn flat_fee_sol(&self) -> f64 {
        self.backend.flat_fee_sol()
    }

    /// Dynamic slippage tolerance. Buys widen with trade size relative to
    /// the configured maximum; sells are priced more conservatively with a
    /// flat 1.3x factor.
    pub fn effective_slippage_bps(&self, side: Side, trade_size: f64) -> u32 {
        let factor = match side {
            Side::Buy => 1.0 + 0.5 * (trade_size / self.max_trade_size).min(1.0),
            Side::Sell => SELL_SLIPPAGE_FACTOR,
        };
        ((self.slippage_bps as f64 * factor).round() as u32).min(10_000)
    }

    /// Execute one buy or sell for the chosen wallet.
    pub async fn execute(&self, wallet: &Pubkey, decision: &TradeDecision) -> Result<TradeOutcome> {
        let slippage = self.effective_slippage_bps(decision.side, decision.amount);

        let quote = self
            .backend
            .quote(decision.side, decision.amount, slippage)
            .await?;
        let settlement = self.backend.swap(wallet, &quote).await?;

        debug!(
            side = %decision.side,
            wallet = %wallet,
            volume = settlement.sol_volume,
            price = settlement.price,
            reference = %settlement.reference,
            "trade settled"
        );

        Ok(TradeOutcome {
            side: decision.side,
            settlement,
            effective_slippage_bps: slippage,
        })
    }
}
