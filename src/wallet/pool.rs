//! Wallet pool provisioning and balance tracking
//!
//! Funding and asset distribution run in bounded batches: concurrent within
//! a batch to amortize settlement latency, sequential across batches to
//! bound backend load. One actor's funding failure never aborts its batch;
//! the actor just stays out of the eligible set.

use futures::future::join_all;
use tracing::{info, warn};

use crate::backend::SettlementBackend;
use crate::error::{Error, Result};
use crate::wallet::{FundingAccount, WalletActor, WalletSnapshot};

pub struct WalletPool {
    wallets: Vec<WalletActor>,
    batch_size: usize,
}

impl WalletPool {
    /// Generate `n` fresh zero-balance actors
    pub fn create(n: usize, batch_size: usize) -> Self {
        let wallets = (0..n).map(|_| WalletActor::new()).collect();
        Self {
            wallets,
            batch_size: batch_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn funded_count(&self) -> usize {
        self.wallets.iter().filter(|w| w.funded).count()
    }

    pub fn get(&self, index: usize) -> Option<&WalletActor> {
        self.wallets.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut WalletActor> {
        self.wallets.get_mut(index)
    }

    /// Sum of all actor SOL balances. The session capital invariant
    /// requires this to equal `capital.current` after every settled trade.
    pub fn total_sol(&self) -> f64 {
        self.wallets.iter().map(|w| w.sol_balance).sum()
    }

    pub fn total_asset(&self) -> f64 {
        self.wallets.iter().map(|w| w.asset_balance).sum()
    }

    /// Pool-wide completed round trips: sum over actors of
    /// `min(total_buys, total_sells)`.
    pub fn cycles(&self) -> u64 {
        self.wallets.iter().map(|w| w.cycles()).sum()
    }

    /// Immutable view for the decision policy
    pub fn snapshot(&self) -> Vec<WalletSnapshot> {
        self.wallets
            .iter()
            .enumerate()
            .map(|(index, w)| WalletSnapshot {
                index,
                pubkey: w.pubkey(),
                sol_balance: w.sol_balance,
                asset_balance: w.asset_balance,
                funded: w.funded,
            })
            .collect()
    }

    /// Fund every actor with `amount_each` SOL from the funding account.
    ///
    /// Fails fast if the funding balance cannot cover the pool; individual
    /// transfer failures are recorded and skipped. Returns the number of
    /// actors confirmed funded.
    pub async fn fund_all(
        &mut self,
        backend: &dyn SettlementBackend,
        funding: &mut FundingAccount,
        amount_each: f64,
    ) -> Result<usize> {
        let required = amount_each * self.wallets.len() as f64;
        if funding.balance_sol < required {
            return Err(Error::InsufficientFunding {
                available: funding.balance_sol,
                required,
            });
        }

        let indices: Vec<usize> = (0..self.wallets.len()).collect();
        for batch in indices.chunks(self.batch_size) {
            let transfers = batch.iter().map(|&i| {
                let to = self.wallets[i].pubkey();
                let from = funding.pubkey();
                async move { (i, backend.transfer(&from, &to, amount_each).await) }
            });

            for (i, result) in join_all(transfers).await {
                match result {
                    Ok(reference) => {
                        let wallet = &mut self.wallets[i];
                        wallet.sol_balance = amount_each;
                        wallet.funded = true;
                        funding.balance_sol -= amount_each;
                        info!(
                            wallet = %wallet.address(),
                            amount = amount_each,
                            reference = %reference,
                            "wallet funded"
                        );
                    }
                    Err(e) => {
                        warn!(
                            wallet = %self.wallets[i].address(),
                            "funding failed, excluding from trading: {e}"
                        );
                    }
                }
            }
        }

        Ok(self.funded_count())
    }

    /// Seed each funded actor with `amount_each` tokens so early sells are
    /// possible. Runs in the same bounded batches as funding.
    pub async fn distribute_asset(
        &mut self,
        backend: &dyn SettlementBackend,
        funding: &FundingAccount,
        amount_each: f64,
    ) -> Result<()> {
        if amount_each <= 0.0 {
            return Ok(());
        }

        let targets: Vec<usize> = (0..self.wallets.len())
            .filter(|&i| self.wallets[i].funded)
            .collect();

        for batch in targets.chunks(self.batch_size) {
            let transfers = batch.iter().map(|&i| {
                let to = self.wallets[i].pubkey();
                let from = funding.pubkey();
                async move { (i, backend.transfer(&from, &to, 0.0).await) }
            });

            for (i, result) in join_all(transfers).await {
                match result {
                    Ok(_) => self.wallets[i].asset_balance += amount_each,
                    Err(e) => warn!(
                        wallet = %self.wallets[i].address(),
                        "asset distribution failed: {e}"
                    ),
                }
            }
        }

        Ok(())
    }

    /// Return residual SOL from every actor to the funding account at
    /// session teardown. Returns the total swept.
    pub async fn sweep(
        &mut self,
        backend: &dyn SettlementBackend,
        funding: &mut FundingAccount,
    ) -> f64 {
        let mut swept = 0.0;
        let indices: Vec<usize> = (0..self.wallets.len())
            .filter(|&i| self.wallets[i].sol_balance > 0.0)
            .collect();

        for batch in indices.chunks(self.batch_size) {
            let transfers = batch.iter().map(|&i| {
                let from = self.wallets[i].pubkey();
                let to = funding.pubkey();
                let amount = self.wallets[i].sol_balance;
                async move { (i, amount, backend.transfer(&from, &to, amount).await) }
            });

            for (i, amount, result) in join_all(transfers).await {
                match result {
                    Ok(_) => {
                        self.wallets[i].sol_balance = 0.0;
                        funding.balance_sol += amount;
                        swept += amount;
                    }
                    Err(e) => warn!(
                        wallet = %self.wallets[i].address(),
                        "sweep failed, leaving balance in place: {e}"
                    ),
                }
            }
        }

        if swept > 0.0 {
            info!(swept, "returned residual SOL to funding account");
        }
        swept
    }
}
