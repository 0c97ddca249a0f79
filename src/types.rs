//! Core types for the prediction bot

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Betting direction for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => anyhow::bail!("Unknown direction: {}", other),
        }
    }
}

/// Run state of the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Stopped,
    Running,
    Paused,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Stopped => "stopped",
            BotStatus::Running => "running",
            BotStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BotStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stopped" => Ok(BotStatus::Stopped),
            "running" => Ok(BotStatus::Running),
            "paused" => Ok(BotStatus::Paused),
            other => anyhow::bail!("Unknown bot status: {}", other),
        }
    }
}

/// Lifecycle of a bet record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BetStatus::Pending),
            "won" => Ok(BetStatus::Won),
            "lost" => Ok(BetStatus::Lost),
            other => anyhow::bail!("Unknown bet status: {}", other),
        }
    }
}

/// A bot-managed wallet
#[derive(Clone, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub address: String,
    /// Last known balance (9 dp)
    pub balance: Decimal,
    pub is_active: bool,
    /// AES-256-GCM blob (nonce || ciphertext)
    #[serde(skip)]
    pub encrypted_private_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("balance", &self.balance)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Shortened address for log lines
    pub fn short_address(&self) -> &str {
        short_address(&self.address)
    }
}

pub fn short_address(address: &str) -> &str {
    address.get(..8).unwrap_or(address)
}

/// Singleton operational configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    /// Offset into the round, in seconds
    pub bet_time_from: u64,
    pub bet_time_to: u64,
    /// Target pool-balance weights
    pub balance_from: f64,
    pub balance_to: f64,
    pub wallet_count_from: u32,
    pub wallet_count_to: u32,
    /// Optional eligible round window
    pub epoch_from: Option<u64>,
    pub epoch_to: Option<u64>,
    pub status: BotStatus,
    pub is_active: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            min_bet: Decimal::new(1, 3),
            max_bet: Decimal::new(1, 2),
            bet_time_from: 0,
            bet_time_to: 180,
            balance_from: 1.0,
            balance_to: 2.0,
            wallet_count_from: 1,
            wallet_count_to: 10,
            epoch_from: None,
            epoch_to: None,
            status: BotStatus::Stopped,
            is_active: true,
        }
    }
}

impl BotConfig {
    /// Check every range has min <= max and a positive stake floor
    pub fn validate(&self) -> Result<(), String> {
        if self.min_bet <= Decimal::ZERO {
            return Err("min_bet must be greater than zero".to_string());
        }
        if self.min_bet > self.max_bet {
            return Err(format!(
                "min_bet ({}) exceeds max_bet ({})",
                self.min_bet, self.max_bet
            ));
        }
        if self.bet_time_from > self.bet_time_to {
            return Err(format!(
                "bet_time_from ({}) exceeds bet_time_to ({})",
                self.bet_time_from, self.bet_time_to
            ));
        }
        if !(self.balance_from.is_finite() && self.balance_to.is_finite())
            || self.balance_from < 0.0
            || self.balance_from > self.balance_to
        {
            return Err(format!(
                "invalid balance range {}..{}",
                self.balance_from, self.balance_to
            ));
        }
        if self.wallet_count_from > self.wallet_count_to {
            return Err(format!(
                "wallet_count_from ({}) exceeds wallet_count_to ({})",
                self.wallet_count_from, self.wallet_count_to
            ));
        }
        if let (Some(from), Some(to)) = (self.epoch_from, self.epoch_to) {
            if from > to {
                return Err(format!("epoch_from ({}) exceeds epoch_to ({})", from, to));
            }
        }
        Ok(())
    }

    /// Whether a round number falls inside the configured window.
    ///
    /// The window only applies when both bounds are set.
    pub fn round_in_window(&self, round_number: u64) -> bool {
        match (self.epoch_from, self.epoch_to) {
            (Some(from), Some(to)) => round_number >= from && round_number <= to,
            _ => true,
        }
    }

    /// Apply a partial update, returning the merged config
    pub fn merged(&self, update: &BotConfigUpdate) -> BotConfig {
        let mut next = self.clone();
        if let Some(v) = update.min_bet {
            next.min_bet = v;
        }
        if let Some(v) = update.max_bet {
            next.max_bet = v;
        }
        if let Some(v) = update.bet_time_from {
            next.bet_time_from = v;
        }
        if let Some(v) = update.bet_time_to {
            next.bet_time_to = v;
        }
        if let Some(v) = update.balance_from {
            next.balance_from = v;
        }
        if let Some(v) = update.balance_to {
            next.balance_to = v;
        }
        if let Some(v) = update.wallet_count_from {
            next.wallet_count_from = v;
        }
        if let Some(v) = update.wallet_count_to {
            next.wallet_count_to = v;
        }
        if let Some(v) = update.epoch_from {
            next.epoch_from = v;
        }
        if let Some(v) = update.epoch_to {
            next.epoch_to = v;
        }
        next
    }
}

/// Partial config update. `epoch_*` use a nested option so a window bound can be cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfigUpdate {
    pub min_bet: Option<Decimal>,
    pub max_bet: Option<Decimal>,
    pub bet_time_from: Option<u64>,
    pub bet_time_to: Option<u64>,
    pub balance_from: Option<f64>,
    pub balance_to: Option<f64>,
    pub wallet_count_from: Option<u32>,
    pub wallet_count_to: Option<u32>,
    pub epoch_from: Option<Option<u64>>,
    pub epoch_to: Option<Option<u64>>,
}

/// Persisted bet history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub id: i64,
    pub wallet_address: String,
    pub round_number: u64,
    pub direction: Direction,
    pub amount: Decimal,
    pub payout: Option<Decimal>,
    pub status: BetStatus,
    /// Seconds between round start and submission
    pub bet_offset_seconds: i64,
    pub tx_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when appending a bet record
#[derive(Debug, Clone)]
pub struct NewBetRecord {
    pub wallet_address: String,
    pub round_number: u64,
    pub direction: Direction,
    pub amount: Decimal,
    pub bet_offset_seconds: i64,
}

/// Filter for bet history queries
#[derive(Debug, Clone, Default)]
pub struct BetQuery {
    pub wallet_address: Option<String>,
    pub round_number: Option<u64>,
    pub status: Option<BetStatus>,
    pub limit: Option<u32>,
}

/// Snapshot of a round as reported by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub round_number: u64,
    pub start_time: DateTime<Utc>,
    pub lock_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub is_active: bool,
    pub total_up_amount: Decimal,
    pub total_down_amount: Decimal,
    pub lock_price: Option<Decimal>,
    pub end_price: Option<Decimal>,
}

impl RoundInfo {
    pub fn total_pool(&self) -> Decimal {
        self.total_up_amount + self.total_down_amount
    }

    /// Whether bets can still be accepted at `now`
    pub fn accepts_bets_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.lock_time
    }
}

/// A finalized, winning, unclaimed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimableRound {
    pub round_number: u64,
    pub direction: Direction,
    pub bet_amount: Decimal,
    pub estimated_reward: Decimal,
}

/// Outcome of one round within a claim batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundClaim {
    pub round_number: u64,
    pub amount: Decimal,
    pub success: bool,
    pub tx_id: Option<String>,
    pub error: Option<String>,
}

/// Result of claiming every available round for a wallet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimReport {
    pub total_claimed: Decimal,
    pub succeeded: u32,
    pub failed: u32,
    pub per_round: Vec<RoundClaim>,
}

/// Result of a claim pass for one wallet, returned to control-plane callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSummary {
    pub success: bool,
    pub message: String,
    pub wallet_address: Option<String>,
    pub rounds_claimed: u32,
    pub rounds_failed: u32,
    pub total_claimed: Decimal,
}

/// Claimable rounds for one wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletClaimable {
    pub wallet_address: String,
    pub rounds: Vec<ClaimableRound>,
    pub estimated_reward: Decimal,
    pub error: Option<String>,
}

/// Point-in-time report of the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatusReport {
    pub is_running: bool,
    pub status: BotStatus,
    pub current_round: Option<u64>,
    pub round_start_time: Option<DateTime<Utc>>,
    pub active_wallets: usize,
    pub total_wallet_balance: Decimal,
    pub recent_bets: Vec<BetRecord>,
    pub config: BotConfig,
}

/// Aggregated bet statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    pub round_number: Option<u64>,
    pub total_bets: u64,
    pub total_amount: Decimal,
    pub total_payout: Decimal,
    pub up_bets: u64,
    pub down_bets: u64,
    pub pending_bets: u64,
    pub won_bets: u64,
    pub lost_bets: u64,
    pub average_bet_amount: Decimal,
    pub up_percentage: f64,
    pub down_percentage: f64,
}

impl RoundStats {
    /// Aggregate a set of bet records
    pub fn from_records(round_number: Option<u64>, records: &[BetRecord]) -> Self {
        let mut stats = RoundStats {
            round_number,
            ..Default::default()
        };

        for record in records {
            stats.total_bets += 1;
            stats.total_amount += record.amount;
            stats.total_payout += record.payout.unwrap_or_default();
            match record.direction {
                Direction::Up => stats.up_bets += 1,
                Direction::Down => stats.down_bets += 1,
            }
            match record.status {
                BetStatus::Pending => stats.pending_bets += 1,
                BetStatus::Won => stats.won_bets += 1,
                BetStatus::Lost => stats.lost_bets += 1,
            }
        }

        if stats.total_bets > 0 {
            stats.average_bet_amount =
                (stats.total_amount / Decimal::from(stats.total_bets)).round_dp(9);
            stats.up_percentage = stats.up_bets as f64 / stats.total_bets as f64 * 100.0;
            stats.down_percentage = stats.down_bets as f64 / stats.total_bets as f64 * 100.0;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(direction: Direction, status: BetStatus, amount: Decimal) -> BetRecord {
        BetRecord {
            id: 0,
            wallet_address: "0xabc".to_string(),
            round_number: 7,
            direction,
            amount,
            payout: None,
            status,
            bet_offset_seconds: 0,
            tx_id: None,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(BotConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_ranges() {
        let mut config = BotConfig::default();
        config.min_bet = dec!(0.5);
        config.max_bet = dec!(0.1);
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.bet_time_from = 200;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.wallet_count_from = 11;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.balance_from = 3.0;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.epoch_from = Some(10);
        config.epoch_to = Some(5);
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.min_bet = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_window_needs_both_bounds() {
        let mut config = BotConfig::default();
        config.epoch_from = Some(100);
        assert!(config.round_in_window(5));

        config.epoch_to = Some(110);
        assert!(!config.round_in_window(5));
        assert!(config.round_in_window(100));
        assert!(config.round_in_window(110));
        assert!(!config.round_in_window(111));
    }

    #[test]
    fn test_merged_can_clear_epoch_bound() {
        let mut config = BotConfig::default();
        config.epoch_from = Some(3);
        let update = BotConfigUpdate {
            epoch_from: Some(None),
            max_bet: Some(dec!(0.05)),
            ..Default::default()
        };
        let next = config.merged(&update);
        assert_eq!(next.epoch_from, None);
        assert_eq!(next.max_bet, dec!(0.05));
        assert_eq!(next.min_bet, config.min_bet);
    }

    #[test]
    fn test_round_stats_from_records() {
        let records = vec![
            record(Direction::Up, BetStatus::Pending, dec!(0.01)),
            record(Direction::Up, BetStatus::Won, dec!(0.02)),
            record(Direction::Down, BetStatus::Lost, dec!(0.03)),
            record(Direction::Up, BetStatus::Lost, dec!(0.02)),
        ];
        let stats = RoundStats::from_records(Some(7), &records);

        assert_eq!(stats.total_bets, 4);
        assert_eq!(stats.total_amount, dec!(0.08));
        assert_eq!(stats.up_bets, 3);
        assert_eq!(stats.down_bets, 1);
        assert_eq!(stats.pending_bets, 1);
        assert_eq!(stats.won_bets, 1);
        assert_eq!(stats.lost_bets, 2);
        assert_eq!(stats.average_bet_amount, dec!(0.02));
        assert!((stats.up_percentage - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_round_stats_empty() {
        let stats = RoundStats::from_records(None, &[]);
        assert_eq!(stats.total_bets, 0);
        assert_eq!(stats.average_bet_amount, Decimal::ZERO);
        assert_eq!(stats.up_percentage, 0.0);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("UP".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("down".parse::<Direction>().unwrap(), Direction::Down);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
