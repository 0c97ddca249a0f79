//! Round oracle: the engine's view of the external prediction-market ledger
//!
//! The engine only needs round state plus the ability to submit signed bet,
//! claim and transfer operations. [`PaperOracle`] implements it in memory for
//! dry runs and tests.

mod errors;
mod paper;
mod retry;

pub use errors::OracleError;
pub use paper::{PaperOracle, PaperSettings};
pub use retry::{with_retry, RetryConfig};

use crate::types::{ClaimReport, ClaimableRound, Direction, RoundInfo};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Ledger transaction identifier
pub type TxId = String;

#[async_trait]
pub trait RoundOracle: Send + Sync {
    /// Current round, or `None` when the market has no round yet
    async fn current_round(&self) -> Result<Option<RoundInfo>, OracleError>;

    /// Submit a bet. Duplicate submissions surface as [`OracleError::AlreadyProcessed`].
    async fn place_bet(
        &self,
        signer: &PrivateKeySigner,
        round_number: u64,
        direction: Direction,
        amount: Decimal,
    ) -> Result<TxId, OracleError>;

    /// Finalized winning rounds the signer has not claimed yet
    async fn claimable_rounds(
        &self,
        signer: &PrivateKeySigner,
    ) -> Result<Vec<ClaimableRound>, OracleError>;

    /// Claim every claimable round, one at a time
    async fn claim_all_available(
        &self,
        signer: &PrivateKeySigner,
    ) -> Result<ClaimReport, OracleError>;

    /// Authoritative balance for an address
    async fn balance(&self, address: &str) -> Result<Decimal, OracleError>;

    /// Move funds from the signer to another address
    async fn transfer(
        &self,
        signer: &PrivateKeySigner,
        to_address: &str,
        amount: Decimal,
    ) -> Result<TxId, OracleError>;
}
