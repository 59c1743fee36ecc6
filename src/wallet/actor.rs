//! Wallet actor and funding account types

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Token balance below this is treated as empty
pub const ASSET_DUST: f64 = 1e-9;

/// An ephemeral trading identity with local balance tracking.
///
/// Created at session setup, owned by the session's [`super::WalletPool`],
/// and mutated only under the session's single-writer lock. Never shared
/// across sessions.
#[derive(Debug)]
pub struct WalletActor {
    keypair: Arc<Keypair>,
    pub sol_balance: f64,
    pub asset_balance: f64,
    pub total_buys: u64,
    pub total_sells: u64,
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Set once funding is confirmed; unfunded actors never trade
    pub funded: bool,
}

impl WalletActor {
    pub fn new() -> Self {
        Self {
            keypair: Arc::new(Keypair::new()),
            sol_balance: 0.0,
            asset_balance: 0.0,
            total_buys: 0,
            total_sells: 0,
            last_trade_time: None,
            funded: false,
        }
    }

    pub fn keypair(&self) -> Arc<Keypair> {
        self.keypair.clone()
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    /// Completed buy/sell round trips for this actor
    pub fn cycles(&self) -> u64 {
        self.total_buys.min(self.total_sells)
    }
}

impl Default for WalletActor {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable view of one actor, used by the decision policy.
#[derive(Debug, Clone)]
pub struct WalletSnapshot {
    pub index: usize,
    pub pubkey: Pubkey,
    pub sol_balance: f64,
    pub asset_balance: f64,
    pub funded: bool,
}

impl WalletSnapshot {
    /// Eligible to buy: funded, and 90% of the SOL balance still covers
    /// the minimum trade (the 10% reserve pays fees).
    pub fn can_buy(&self, min_trade_size: f64) -> bool {
        self.funded && self.sol_balance * 0.9 >= min_trade_size
    }

    /// Eligible to sell: funded with a non-dust token balance
    pub fn can_sell(&self) -> bool {
        self.funded && self.asset_balance > ASSET_DUST
    }

    pub fn holds_asset(&self) -> bool {
        self.asset_balance > ASSET_DUST
    }
}

/// The shared funding account wallets are provisioned from.
///
/// Not session-owned; its balance is tracked locally and assumed
/// externally checked before session start.
pub struct FundingAccount {
    keypair: Arc<Keypair>,
    pub balance_sol: f64,
}

impl FundingAccount {
    pub fn new(balance_sol: f64) -> Self {
        Self {
            keypair: Arc::new(Keypair::new()),
            balance_sol,
        }
    }

    /// Load the funding keypair from a JSON byte-array file
    pub fn from_file(path: &str, balance_sol: f64) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidKeypair(format!("failed to read {path}: {e}")))?;
        let bytes: Vec<u8> = serde_json::from_str(&data)
            .map_err(|e| Error::InvalidKeypair(format!("failed to parse {path}: {e}")))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| Error::InvalidKeypair(format!("invalid keypair bytes in {path}: {e}")))?;
        Ok(Self {
            keypair: Arc::new(keypair),
            balance_sol,
        })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}
