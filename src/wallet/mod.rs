//! Ephemeral wallet actors and the session wallet pool

pub mod actor;
pub mod pool;

pub use actor::{FundingAccount, WalletActor, WalletSnapshot};
pub use pool::WalletPool;
