//! Ledger error differentiation
//!
//! Classifies raw ledger/RPC failure messages into structured types so the
//! engine can tell transient hiccups from per-wallet rejections.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Network/RPC error (timeout, connection reset, blockhash expiry)
    Network(String),
    /// Rate limited by the RPC endpoint
    RateLimited,
    /// Transaction was already processed
    AlreadyProcessed,
    /// Round no longer accepts bets
    RoundClosed,
    /// Wallet cannot cover stake plus fees
    InsufficientFunds,
    /// Reward already withdrawn
    AlreadyClaimed,
    /// No rewards available for the round
    NothingToClaim,
    /// Any other rejection
    Rejected(String),
}

impl OracleError {
    /// Classify a raw ledger error message
    pub fn from_message(message: &str) -> Self {
        let msg_lower = message.to_lowercase();

        if msg_lower.contains("already been processed") || msg_lower.contains("already processed") {
            return OracleError::AlreadyProcessed;
        }

        if msg_lower.contains("429") || msg_lower.contains("rate limit") || msg_lower.contains("too many requests") {
            return OracleError::RateLimited;
        }

        if msg_lower.contains("already claimed") {
            return OracleError::AlreadyClaimed;
        }

        if msg_lower.contains("no rewards") || msg_lower.contains("nothing to claim") || msg_lower.contains("not eligible") {
            return OracleError::NothingToClaim;
        }

        if msg_lower.contains("insufficient") || msg_lower.contains("not enough") {
            return OracleError::InsufficientFunds;
        }

        if msg_lower.contains("round") && (msg_lower.contains("closed") || msg_lower.contains("locked") || msg_lower.contains("not bettable")) {
            return OracleError::RoundClosed;
        }

        if msg_lower.contains("timeout")
            || msg_lower.contains("timed out")
            || msg_lower.contains("connection")
            || msg_lower.contains("blockhash not found")
            || msg_lower.contains("network")
        {
            return OracleError::Network(message.to_string());
        }

        OracleError::Rejected(message.to_string())
    }

    /// Whether retrying later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Network(_) | OracleError::RateLimited)
    }

    /// A duplicate submission is treated as success
    pub fn is_duplicate(&self) -> bool {
        matches!(self, OracleError::AlreadyProcessed)
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Network(msg) => write!(f, "Network error: {}", msg),
            OracleError::RateLimited => write!(f, "Rate limited"),
            OracleError::AlreadyProcessed => write!(f, "Transaction already processed"),
            OracleError::RoundClosed => write!(f, "Round is not accepting bets"),
            OracleError::InsufficientFunds => write!(f, "Insufficient funds"),
            OracleError::AlreadyClaimed => write!(f, "Reward already claimed"),
            OracleError::NothingToClaim => write!(f, "No rewards available"),
            OracleError::Rejected(msg) => write!(f, "Rejected: {}", msg),
        }
    }
}

impl std::error::Error for OracleError {}
