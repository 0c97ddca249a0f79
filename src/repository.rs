//! Storage seams used by the engine
//!
//! [`crate::db::Database`] is the SQLite implementation. The engine holds an
//! `Arc<dyn Store>` so any backend covering all three repositories fits.

use crate::types::{
    BetQuery, BetRecord, BotConfig, BotStatus, NewBetRecord, Wallet,
};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Filter for wallet listings
#[derive(Debug, Clone, Default)]
pub struct WalletFilter {
    pub active: Option<bool>,
    pub min_balance: Option<Decimal>,
}

impl WalletFilter {
    pub fn active() -> Self {
        Self {
            active: Some(true),
            min_balance: None,
        }
    }
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn insert_wallet(&self, address: &str, encrypted_private_key: &[u8]) -> Result<Wallet>;

    async fn get_wallet(&self, id: i64) -> Result<Option<Wallet>>;

    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>>;

    async fn list_wallets(&self, filter: &WalletFilter) -> Result<Vec<Wallet>>;

    async fn update_wallet_balance(&self, id: i64, balance: Decimal) -> Result<()>;

    async fn set_wallet_active(&self, id: i64, active: bool) -> Result<()>;
}

#[async_trait]
pub trait BetRecordRepository: Send + Sync {
    /// Append a pending bet record
    async fn insert_bet(&self, bet: &NewBetRecord) -> Result<BetRecord>;

    async fn mark_bet_submitted(&self, id: i64, tx_id: &str) -> Result<()>;

    async fn mark_bet_lost(&self, id: i64, reason: &str) -> Result<()>;

    /// Settle one pending record of a wallet in a round as won, preferring a
    /// submitted one. Returns rows updated.
    async fn mark_round_won(
        &self,
        wallet_address: &str,
        round_number: u64,
        payout: Decimal,
    ) -> Result<u64>;

    /// Newest first
    async fn query_bets(&self, query: &BetQuery) -> Result<Vec<BetRecord>>;
}

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Active config row, created with defaults when none exists
    async fn get_config(&self) -> Result<BotConfig>;

    async fn save_config(&self, config: &BotConfig) -> Result<BotConfig>;

    async fn set_status(&self, status: BotStatus) -> Result<()>;
}

pub trait Store: WalletRepository + BetRecordRepository + ConfigRepository {}

impl<T> Store for T where T: WalletRepository + BetRecordRepository + ConfigRepository {}
