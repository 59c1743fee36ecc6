//! Error types for the volume engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the volume engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    // Provisioning errors
    #[error("Insufficient funding: {available}SOL available, {required}SOL required")]
    InsufficientFunding { available: f64, required: f64 },

    // Trading errors
    #[error("Settlement failed: {0}")]
    SettlementFailed(String),

    #[error("Slippage exceeded: quoted {quoted}, settled {settled}")]
    SlippageExceeded { quoted: f64, settled: f64 },

    // Session lifecycle errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid session state: {0}")]
    SessionState(String),

    // Persistence errors
    #[error("Persistence failed: {0}")]
    Persistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Fatal errors abort session creation; everything else is absorbed
    /// by the scheduler or surfaced to the caller without killing a session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::InvalidKeypair(_) | Error::InsufficientFunding { .. }
        )
    }

    /// Per-trade errors are counted in failed_trades and never change
    /// session status.
    pub fn is_trade_error(&self) -> bool {
        matches!(
            self,
            Error::SettlementFailed(_) | Error::SlippageExceeded { .. }
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::SettlementFailed(e.to_string())
    }
}
