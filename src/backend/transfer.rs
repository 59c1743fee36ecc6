//! Peer-to-peer transfer settlement
//!
//! Models volume generated by direct transfers between pool wallets: value
//! round-trips inside the pool, so a trade has zero price impact and its
//! only real cost is the settlement fee. Capital therefore bleeds at
//! exactly `fee * trades`, which makes this backend the reference case for
//! the loss-threshold stop condition.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::BackendKind;
use crate::error::{Error, Result};
use crate::pricing::{PriceQuote, Side};

use super::{settlement_ref, Settlement, SettlementBackend};

pub struct TransferBackend {
    /// Fixed reference price, SOL per token
    reference_price: f64,
    fee_sol: f64,
    nonce: AtomicU64,
}

impl TransferBackend {
    pub fn new(reference_price: f64, fee_sol: f64) -> Result<Self> {
        if reference_price <= 0.0 {
            return Err(Error::Config("reference_price must be positive".into()));
        }
        Ok(Self {
            reference_price,
            fee_sol,
            nonce: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl SettlementBackend for TransferBackend {
    async fn quote(&self, side: Side, amount: f64, slippage_bps: u32) -> Result<PriceQuote> {
        if amount <= 0.0 {
            return Err(Error::SettlementFailed("zero-amount trade".into()));
        }
        let (sol_amount, token_amount) = match side {
            Side::Buy => (amount, amount / self.reference_price),
            Side::Sell => (amount * self.reference_price, amount),
        };
        Ok(PriceQuote {
            side,
            sol_amount,
            token_amount,
            price: self.reference_price,
            price_impact_pct: 0.0,
            slippage_bps,
        })
    }

    async fn swap(&self, wallet: &Pubkey, quote: &PriceQuote) -> Result<Settlement> {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        let reference =
            settlement_ref(&[&wallet.to_string(), quote.side.as_str(), &n.to_string()]);

        // SOL leaves on one leg and returns on the other, so the wallet's
        // SOL balance is unchanged by the trade itself; only tokens move.
        let token_delta = match quote.side {
            Side::Buy => quote.token_amount,
            Side::Sell => -quote.token_amount,
        };

        Ok(Settlement {
            reference,
            sol_delta: 0.0,
            token_delta,
            sol_volume: quote.sol_amount,
            price: self.reference_price,
            price_impact_pct: 0.0,
        })
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
        BackendKind::Transfer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::{Keypair, Signer};

    #[tokio::test]
    async fn test_zero_price_impact() {
        let b = TransferBackend::new(0.0001, 0.000005).unwrap();
        let wallet = Keypair::new().pubkey();

        let quote = b.quote(Side::Buy, 0.01, 250).await.unwrap();
        assert_eq!(quote.price_impact_pct, 0.0);
        assert!((quote.token_amount - 100.0).abs() < 1e-9);

        let s = b.swap(&wallet, &quote).await.unwrap();
        assert_eq!(s.sol_delta, 0.0);
        assert!((s.token_delta - 100.0).abs() < 1e-9);
        assert!((s.sol_volume - 0.01).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_sell_quote_prices_tokens() {
        let b = TransferBackend::new(0.0001, 0.000005).unwrap();
        let quote = b.quote(Side::Sell, 500.0, 250).await.unwrap();
        assert!((quote.sol_amount - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_reference_price() {
        assert!(TransferBackend::new(0.0, 0.000005).is_err());
    }
}
