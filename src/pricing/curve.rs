//! Linear bonding curve simulation
//!
//! Price interpolates linearly between `base_price` and `max_price` as the
//! sold fraction of `total_supply` grows. A trade of `dt` tokens is charged
//! the average of the start and end spot price (trapezoid rule), so large
//! trades pay a convex premium and a buy/sell round trip never profits.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pricing::{PriceQuote, Side};

/// Linear bonding curve state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearCurve {
    base_price: f64,
    max_price: f64,
    total_supply: f64,
    sold_supply: f64,
}

/// Result of pricing a trade against the curve
#[derive(Debug, Clone)]
pub struct CurveFill {
    pub tokens: f64,
    pub sol: f64,
    pub avg_price: f64,
    pub start_price: f64,
    pub end_price: f64,
    pub price_impact_pct: f64,
}

impl LinearCurve {
    pub fn new(base_price: f64, max_price: f64, total_supply: f64) -> Result<Self> {
        if base_price <= 0.0 || total_supply <= 0.0 {
            return Err(Error::Config(
                "curve base_price and total_supply must be positive".into(),
            ));
        }
        if max_price < base_price {
            return Err(Error::Config(format!(
                "curve max_price {} below base_price {}",
                max_price, base_price
            )));
        }
        Ok(Self {
            base_price,
            max_price,
            total_supply,
            sold_supply: 0.0,
        })
    }

    /// Fraction of supply sold, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        (self.sold_supply / self.total_supply).clamp(0.0, 1.0)
    }

    pub fn sold_supply(&self) -> f64 {
        self.sold_supply
    }

    /// Spot price at a given progress
    pub fn price_at(&self, progress: f64) -> f64 {
        self.base_price + progress.clamp(0.0, 1.0) * (self.max_price - self.base_price)
    }

    /// Current spot price
    pub fn spot_price(&self) -> f64 {
        self.price_at(self.progress())
    }

    /// SOL per token of supply, the slope of the curve
    fn slope(&self) -> f64 {
        (self.max_price - self.base_price) / self.total_supply
    }

    /// Price a buy of `tokens` tokens at the current state.
    pub fn fill_buy_tokens(&self, tokens: f64) -> Result<CurveFill> {
        if tokens <= 0.0 {
            return Err(Error::SettlementFailed("buy of zero tokens".into()));
        }
        let start_price = self.spot_price();
        let end_progress = (self.sold_supply + tokens) / self.total_supply;
        let end_price = self.price_at(end_progress);
        let avg_price = (start_price + end_price) / 2.0;
        let sol = avg_price * tokens;
        Ok(CurveFill {
            tokens,
            sol,
            avg_price,
            start_price,
            end_price,
            price_impact_pct: ((avg_price - start_price) / start_price) * 100.0,
        })
    }

    /// Price a buy specified in SOL, inverting the trapezoid cost exactly.
    ///
    /// cost(dt) = p0*dt + slope*dt^2/2, so dt solves a quadratic in the
    /// SOL amount; a flat curve degenerates to dt = sol/p0.
    pub fn fill_buy_sol(&self, sol: f64) -> Result<CurveFill> {
        if sol <= 0.0 {
            return Err(Error::SettlementFailed("buy of zero SOL".into()));
        }
        let p0 = self.spot_price();
        let slope = self.slope();
        let tokens = if slope <= f64::EPSILON {
            sol / p0
        } else {
            ((p0 * p0 + 2.0 * slope * sol).sqrt() - p0) / slope
        };
        self.fill_buy_tokens(tokens)
    }

    /// Price a sell of `tokens` tokens. The sold amount is clamped so
    /// progress cannot go below zero.
    pub fn fill_sell_tokens(&self, tokens: f64) -> Result<CurveFill> {
        if tokens <= 0.0 {
            return Err(Error::SettlementFailed("sell of zero tokens".into()));
        }
        let tokens = tokens.min(self.sold_supply);
        if tokens <= 0.0 {
            return Err(Error::SettlementFailed(
                "curve has no sold supply to absorb a sell".into(),
            ));
        }
        let start_price = self.spot_price();
        let end_progress = (self.sold_supply - tokens) / self.total_supply;
        let end_price = self.price_at(end_progress);
        let avg_price = (start_price + end_price) / 2.0;
        let sol = avg_price * tokens;
        Ok(CurveFill {
            tokens,
            sol,
            avg_price,
            start_price,
            end_price,
            price_impact_pct: ((start_price - avg_price) / start_price) * 100.0,
        })
    }

    /// Apply a settled buy to the curve state
    pub fn apply_buy(&mut self, tokens: f64) {
        self.sold_supply = (self.sold_supply + tokens).min(self.total_supply);
    }

    /// Apply a settled sell to the curve state
    pub fn apply_sell(&mut self, tokens: f64) {
        self.sold_supply = (self.sold_supply - tokens).max(0.0);
    }

    /// Build a [`PriceQuote`] from a fill
    pub fn quote_from_fill(fill: &CurveFill, side: Side, slippage_bps: u32) -> PriceQuote {
        PriceQuote {
            side,
            sol_amount: fill.sol,
            token_amount: fill.tokens,
            price: fill.avg_price,
            price_impact_pct: fill.price_impact_pct,
            slippage_bps,
        }
    }
}
