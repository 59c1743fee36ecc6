//! Volume Session Engine
//!
//! Runs bounded synthetic-volume sessions against a pluggable settlement
//! backend: provisions a pool of ephemeral wallets, drives randomized
//! buy/sell cycles through them, and stops on volume target, duration,
//! loss threshold, or capital exhaustion.

pub mod backend;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod policy;
pub mod pricing;
pub mod rng;
pub mod session;
pub mod store;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use engine::VolumeEngine;
pub use error::{Error, Result};
