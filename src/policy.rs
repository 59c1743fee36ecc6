//! Buy-vs-sell decisioning
//!
//! A state-free function of the pool snapshot: forced sides when only one
//! side is possible, strong bias at the 0.7/0.3 asset-holder thresholds,
//! otherwise a weighted coin flip. All randomness comes from the injected
//! [`TradeRng`].

use crate::pricing::Side;
use crate::rng::TradeRng;
use crate::wallet::WalletSnapshot;

/// Asset-holder fraction above which the policy forces sells
const SELL_BIAS_THRESHOLD: f64 = 0.7;
/// Asset-holder fraction below which the policy forces buys
const BUY_BIAS_THRESHOLD: f64 = 0.3;

/// Sell sizes are drawn from this fraction range of the asset balance
const SELL_FRACTION_LO: f64 = 0.2;
const SELL_FRACTION_HI: f64 = 0.8;

/// One resolved trade attempt
#[derive(Debug, Clone)]
pub struct TradeDecision {
    pub side: Side,
    pub wallet_index: usize,
    /// SOL for buys, tokens for sells
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    pub buy_ratio: f64,
    pub min_trade_size: f64,
    pub max_trade_size: f64,
}

impl DecisionPolicy {
    pub fn new(buy_ratio: f64, min_trade_size: f64, max_trade_size: f64) -> Self {
        Self {
            buy_ratio,
            min_trade_size,
            max_trade_size,
        }
    }

    /// Decide the next trade from a pool snapshot. Returns `None` when no
    /// wallet can trade on either side.
    pub fn decide(&self, pool: &[WalletSnapshot], rng: &mut TradeRng) -> Option<TradeDecision> {
        let buyers: Vec<&WalletSnapshot> = pool
            .iter()
            .filter(|w| w.can_buy(self.min_trade_size))
            .collect();
        let sellers: Vec<&WalletSnapshot> = pool.iter().filter(|w| w.can_sell()).collect();

        if buyers.is_empty() && sellers.is_empty() {
            return None;
        }

        let side = if buyers.is_empty() {
            Side::Sell
        } else if sellers.is_empty() {
            Side::Buy
        } else {
            let funded = pool.iter().filter(|w| w.funded).count();
            let holding = pool.iter().filter(|w| w.funded && w.holds_asset()).count();
            let holding_fraction = if funded == 0 {
                0.0
            } else {
                holding as f64 / funded as f64
            };

            if holding_fraction > SELL_BIAS_THRESHOLD {
                Side::Sell
            } else if holding_fraction < BUY_BIAS_THRESHOLD {
                Side::Buy
            } else if rng.chance(self.buy_ratio) {
                Side::Buy
            } else {
                Side::Sell
            }
        };

        let eligible = match side {
            Side::Buy => &buyers,
            Side::Sell => &sellers,
        };
        let wallet = eligible[rng.pick_index(eligible.len())];

        let amount = match side {
            Side::Buy => {
                let hi = (wallet.sol_balance * 0.9).min(self.max_trade_size);
                rng.range_f64(self.min_trade_size.min(hi), hi)
            }
            Side::Sell => {
                let fraction = rng.range_f64(SELL_FRACTION_LO, SELL_FRACTION_HI);
                wallet.asset_balance * fraction
            }
        };

        Some(TradeDecision {
            side,
            wallet_index: wallet.index,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::{Keypair, Signer};

    fn snapshot(index: usize, sol: f64, asset: f64, funded: bool) -> WalletSnapshot {
        WalletSnapshot {
            index,
            pubkey: Keypair::new().pubkey(),
            sol_balance: sol,
            asset_balance: asset,
            funded,
        }
    }

    fn policy() -> DecisionPolicy {
        DecisionPolicy::new(0.6, 0.005, 0.05)
    }

    #[test]
    fn test_forced_sell_when_no_buyer() {
        let pool = vec![
            snapshot(0, 0.0001, 500.0, true),
            snapshot(1, 0.0, 200.0, true),
        ];
        let mut rng = TradeRng::new(Some(1));
        for _ in 0..50 {
            let d = policy().decide(&pool, &mut rng).unwrap();
            assert_eq!(d.side, Side::Sell);
        }
    }

    #[test]
    fn test_forced_buy_when_no_seller() {
        let pool = vec![snapshot(0, 0.1, 0.0, true), snapshot(1, 0.2, 0.0, true)];
        let mut rng = TradeRng::new(Some(2));
        for _ in 0..50 {
            let d = policy().decide(&pool, &mut rng).unwrap();
            assert_eq!(d.side, Side::Buy);
        }
    }

    #[test]
    fn test_sell_bias_above_threshold() {
        // 80% of wallets hold asset; everyone could also buy, so neither
        // forced rule applies and the 0.7 boundary must fire.
        let pool = vec![
            snapshot(0, 0.1, 100.0, true),
            snapshot(1, 0.1, 100.0, true),
            snapshot(2, 0.1, 100.0, true),
            snapshot(3, 0.1, 100.0, true),
            snapshot(4, 0.1, 0.0, true),
        ];
        let mut rng = TradeRng::new(Some(3));
        for _ in 0..100 {
            let d = policy().decide(&pool, &mut rng).unwrap();
            assert_eq!(d.side, Side::Sell);
        }
    }

    #[test]
    fn test_buy_bias_below_threshold() {
        let pool = vec![
            snapshot(0, 0.1, 100.0, true),
            snapshot(1, 0.1, 0.0, true),
            snapshot(2, 0.1, 0.0, true),
            snapshot(3, 0.1, 0.0, true),
            snapshot(4, 0.1, 0.0, true),
        ];
        let mut rng = TradeRng::new(Some(4));
        for _ in 0..100 {
            let d = policy().decide(&pool, &mut rng).unwrap();
            assert_eq!(d.side, Side::Buy);
        }
    }

    #[test]
    fn test_buy_ratio_in_neutral_band() {
        // Half the wallets hold asset: the weighted coin decides.
        let pool = vec![
            snapshot(0, 0.1, 100.0, true),
            snapshot(1, 0.1, 100.0, true),
            snapshot(2, 0.1, 0.0, true),
            snapshot(3, 0.1, 0.0, true),
        ];
        let p = DecisionPolicy::new(0.6, 0.005, 0.05);
        let mut rng = TradeRng::new(Some(5));
        let buys = (0..2000)
            .filter(|_| p.decide(&pool, &mut rng).unwrap().side == Side::Buy)
            .count();
        let ratio = buys as f64 / 2000.0;
        assert!(ratio > 0.52 && ratio < 0.68, "ratio was {ratio}");
    }

    #[test]
    fn test_buy_size_bounds() {
        let pool = vec![snapshot(0, 0.02, 0.0, true)];
        let p = policy();
        let mut rng = TradeRng::new(Some(6));
        for _ in 0..200 {
            let d = p.decide(&pool, &mut rng).unwrap();
            assert!(d.amount >= p.min_trade_size || d.amount <= 0.02 * 0.9);
            assert!(d.amount <= (0.02f64 * 0.9).min(p.max_trade_size) + 1e-12);
        }
    }

    #[test]
    fn test_sell_size_fraction() {
        let pool = vec![snapshot(0, 0.0, 1000.0, true)];
        let mut rng = TradeRng::new(Some(7));
        for _ in 0..200 {
            let d = policy().decide(&pool, &mut rng).unwrap();
            assert_eq!(d.side, Side::Sell);
            assert!(d.amount >= 200.0 - 1e-9);
            assert!(d.amount <= 800.0 + 1e-9);
        }
    }

    #[test]
    fn test_exhausted_pool_returns_none() {
        let pool = vec![snapshot(0, 0.0, 0.0, true), snapshot(1, 0.5, 500.0, false)];
        let mut rng = TradeRng::new(Some(8));
        assert!(policy().decide(&pool, &mut rng).is_none());
    }

    #[test]
    fn test_unfunded_wallets_never_selected() {
        let pool = vec![
            snapshot(0, 0.1, 0.0, true),
            snapshot(1, 10.0, 10_000.0, false),
        ];
        let mut rng = TradeRng::new(Some(9));
        for _ in 0..100 {
            let d = policy().decide(&pool, &mut rng).unwrap();
            assert_eq!(d.wallet_index, 0);
        }
    }
}
