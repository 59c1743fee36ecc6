//! Price quoting for trades
//!
//! Two interchangeable strategies: an external quote delegated to the
//! settlement backend, or the local linear bonding curve in [`curve`].

pub mod curve;

use serde::{Deserialize, Serialize};

pub use curve::LinearCurve;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quote for a single trade, before settlement.
///
/// For buys `sol_amount` is the input and `token_amount` the expected
/// output; for sells the reverse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub side: Side,
    pub sol_amount: f64,
    pub token_amount: f64,
    /// Average fill price in SOL per token
    pub price: f64,
    /// Deviation from spot in percent, signed away from the taker
    pub price_impact_pct: f64,
    /// Slippage tolerance the quote was requested with
    pub slippage_bps: u32,
}

/// Calculate percentage change between two prices
pub fn percent_change(old_price: f64, new_price: f64) -> f64 {
    if old_price == 0.0 {
        return 0.0;
    }
    ((new_price - old_price) / old_price) * 100.0
}

/// Minimum acceptable output after applying slippage tolerance
pub fn min_out_with_slippage(expected: f64, slippage_bps: u32) -> f64 {
    expected * (10_000u32.saturating_sub(slippage_bps) as f64 / 10_000.0)
}

/// Maximum acceptable input after applying slippage tolerance
pub fn max_in_with_slippage(expected: f64, slippage_bps: u32) -> f64 {
    expected * ((10_000 + slippage_bps) as f64 / 10_000.0)
}
