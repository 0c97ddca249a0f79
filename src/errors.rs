//! Engine error taxonomy

use crate::oracle::OracleError;
use crate::wallet::KeyringError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller asked for something the current state does not allow
    #[error("{0}")]
    Precondition(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Ledger error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Key error: {0}")]
    KeyDerivation(#[from] KeyringError),

    #[error("Wallet {address}: {reason}")]
    PerWallet { address: String, reason: String },

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn precondition(message: impl Into<String>) -> Self {
        EngineError::Precondition(message.into())
    }

    /// Whether the next tick may succeed without intervention
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Oracle(err) if err.is_transient())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
