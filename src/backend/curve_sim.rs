//! Local bonding-curve settlement
//!
//! Settles trades against the in-process [`LinearCurve`] with no external
//! calls. The curve is re-priced at settlement time, so a concurrent batch
//! can move the price between quote and swap; moves beyond the quoted
//! slippage tolerance fail the trade.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::BackendKind;
use crate::error::{Error, Result};
use crate::pricing::{LinearCurve, PriceQuote, Side};

use super::{settlement_ref, Settlement, SettlementBackend};

pub struct CurveSimBackend {
    curve: Mutex<LinearCurve>,
    fee_sol: f64,
    /// Fraction of swaps that fail artificially, for stress tests
    failure_rate: f64,
    nonce: AtomicU64,
}

impl CurveSimBackend {
    pub fn new(curve: LinearCurve, fee_sol: f64) -> Self {
        Self {
            curve: Mutex::new(curve),
            fee_sol,
            failure_rate: 0.0,
            nonce: AtomicU64::new(0),
        }
    }

    /// Inject a deterministic failure cadence: every `1/rate`-th swap fails.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub async fn spot_price(&self) -> f64 {
        self.curve.lock().await.spot_price()
    }

    fn next_ref(&self, wallet: &Pubkey, side: Side) -> (u64, String) {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        let reference = settlement_ref(&[&wallet.to_string(), side.as_str(), &n.to_string()]);
        (n, reference)
    }
}

#[async_trait]
impl SettlementBackend for CurveSimBackend {
    async fn quote(&self, side: Side, amount: f64, slippage_bps: u32) -> Result<PriceQuote> {
        let curve = self.curve.lock().await;
        let fill = match side {
            Side::Buy => curve.fill_buy_sol(amount)?,
            Side::Sell => curve.fill_sell_tokens(amount)?,
        };
        Ok(LinearCurve::quote_from_fill(&fill, side, slippage_bps))
    }

    async fn swap(&self, wallet: &Pubkey, quote: &PriceQuote) -> Result<Settlement> {
        let (n, reference) = self.next_ref(wallet, quote.side);

        if self.failure_rate > 0.0 {
            let period = (1.0 / self.failure_rate).round() as u64;
            if period > 0 && n % period == period - 1 {
                return Err(Error::SettlementFailed("injected settlement failure".into()));
            }
        }

        let mut curve = self.curve.lock().await;
        let (fill, settlement) = match quote.side {
            Side::Buy => {
                let fill = curve.fill_buy_sol(quote.sol_amount)?;
                let s = Settlement {
                    reference,
                    sol_delta: -fill.sol,
                    token_delta: fill.tokens,
                    sol_volume: fill.sol,
                    price: fill.avg_price,
                    price_impact_pct: fill.price_impact_pct,
                };
                (fill, s)
            }
            Side::Sell => {
                let fill = curve.fill_sell_tokens(quote.token_amount)?;
                let s = Settlement {
                    reference,
                    sol_delta: fill.sol,
                    token_delta: -fill.tokens,
                    sol_volume: fill.sol,
                    price: fill.avg_price,
                    price_impact_pct: fill.price_impact_pct,
                };
                (fill, s)
            }
        };

        // Price moved past tolerance between quote and settlement.
        let tolerance = quote.price * quote.slippage_bps as f64 / 10_000.0;
        if (fill.avg_price - quote.price).abs() > tolerance {
            return Err(Error::SlippageExceeded {
                quoted: quote.price,
                settled: fill.avg_price,
            });
        }

        match quote.side {
            Side::Buy => curve.apply_buy(fill.tokens),
            Side::Sell => curve.apply_sell(fill.tokens),
        }

        debug!(
            side = %quote.side,
            sol = settlement.sol_volume,
            price = settlement.price,
            "curve settlement"
        );
        Ok(settlement)
    }

    async fn transfer(&self, from: &Pubkey, to: &Pubkey, amount_sol: f64) -> Result<String> {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        Ok(settlement_ref(&[
            &from.to_string(),
            &to.to_string(),
            &format!("{amount_sol}"),
            &n.to_string(),
        ]))
    }

    fn flat_fee_sol(&self) -> f64 {
        self.fee_sol
    }

    fn kind(&self) -> BackendKind {
        BackendKind::CurveSim
    }
}
