//! Session metrics accumulation
//!
//! Pure accumulator invoked after each settled trade. Running mean slippage
//! uses the standard incremental formula; capital-derived figures are
//! recomputed from the snapshot the scheduler passes in.

use serde::{Deserialize, Serialize};

use crate::pricing::Side;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Notional SOL traded across both sides
    pub total_volume: f64,
    /// total_volume / capital.starting
    pub volume_multiplier: f64,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub buy_trades: u64,
    pub sell_trades: u64,
    /// Pool-wide completed buy/sell round trips
    pub cycles: u64,
    /// Running mean of observed price deviation, percent
    pub avg_slippage: f64,
    pub start_price: f64,
    pub current_price: f64,
    pub highest_price: f64,
    pub lowest_price: f64,
}

impl SessionMetrics {
    /// Initialize the price watermarks from the session's opening price
    pub fn with_start_price(price: f64) -> Self {
        Self {
            start_price: price,
            current_price: price,
            highest_price: price,
            lowest_price: price,
            ..Default::default()
        }
    }

    /// Record one settled trade
    pub fn record_success(&mut self, side: Side, sol_volume: f64, price: f64, slippage_pct: f64) {
        self.total_trades += 1;
        self.successful_trades += 1;
        match side {
            Side::Buy => self.buy_trades += 1,
            Side::Sell => self.sell_trades += 1,
        }
        self.total_volume += sol_volume;

        // Incremental running mean.
        let n = self.successful_trades as f64;
        self.avg_slippage += (slippage_pct - self.avg_slippage) / n;

        self.current_price = price;
        if price > self.highest_price {
            self.highest_price = price;
        }
        if price < self.lowest_price || self.lowest_price == 0.0 {
            self.lowest_price = price;
        }
    }

    /// Record one failed trade attempt. Balances and prices are untouched.
    pub fn record_failure(&mut self) {
        self.total_trades += 1;
        self.failed_trades += 1;
    }

    /// Recompute capital-derived figures from the current snapshot
    pub fn update_from_capital(&mut self, starting_capital: f64) {
        if starting_capital > 0.0 {
            self.volume_multiplier = self.total_volume / starting_capital;
        }
    }

    pub fn set_cycles(&mut self, cycles: u64) {
        self.cycles = cycles;
    }
}
