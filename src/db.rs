//! SQLite database for wallets, bet history and the bot config

use crate::repository::{BetRecordRepository, ConfigRepository, WalletFilter, WalletRepository};
use crate::types::{
    BetQuery, BetRecord, BetStatus, BotConfig, BotStatus, Direction, NewBetRecord, Wallet,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    /// Private in-memory database. Pinned to one connection so the schema survives.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL UNIQUE,
                balance TEXT NOT NULL DEFAULT '0',
                is_active INTEGER NOT NULL DEFAULT 1,
                encrypted_private_key BLOB NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_config (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                min_bet TEXT NOT NULL,
                max_bet TEXT NOT NULL,
                bet_time_from INTEGER NOT NULL,
                bet_time_to INTEGER NOT NULL,
                balance_from REAL NOT NULL,
                balance_to REAL NOT NULL,
                wallet_count_from INTEGER NOT NULL,
                wallet_count_to INTEGER NOT NULL,
                epoch_from INTEGER,
                epoch_to INTEGER,
                status TEXT NOT NULL DEFAULT 'stopped',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bet_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_address TEXT NOT NULL,
                round_number INTEGER NOT NULL,
                direction TEXT NOT NULL,
                amount TEXT NOT NULL,
                payout TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                bet_offset_seconds INTEGER NOT NULL,
                tx_id TEXT,
                failure_reason TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bet_history_wallet ON bet_history(wallet_address)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bet_history_round ON bet_history(round_number)")
            .execute(&self.pool)
            .await?;

        info!("Database initialized");
        Ok(())
    }

    fn row_to_wallet(row: &SqliteRow) -> Result<Wallet> {
        let balance: String = row.try_get("balance")?;
        Ok(Wallet {
            id: row.try_get("id")?,
            address: row.try_get("address")?,
            balance: Decimal::from_str(&balance).context("Invalid wallet balance")?,
            is_active: row.try_get("is_active")?,
            encrypted_private_key: row.try_get("encrypted_private_key")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
        })
    }

    fn row_to_bet(row: &SqliteRow) -> Result<BetRecord> {
        let direction: String = row.try_get("direction")?;
        let status: String = row.try_get("status")?;
        let amount: String = row.try_get("amount")?;
        let payout: Option<String> = row.try_get("payout")?;
        let round_number: i64 = row.try_get("round_number")?;

        Ok(BetRecord {
            id: row.try_get("id")?,
            wallet_address: row.try_get("wallet_address")?,
            round_number: round_number as u64,
            direction: Direction::from_str(&direction)?,
            amount: Decimal::from_str(&amount).context("Invalid bet amount")?,
            payout: payout
                .map(|p| Decimal::from_str(&p))
                .transpose()
                .context("Invalid bet payout")?,
            status: BetStatus::from_str(&status)?,
            bet_offset_seconds: row.try_get("bet_offset_seconds")?,
            tx_id: row.try_get("tx_id")?,
            failure_reason: row.try_get("failure_reason")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        })
    }

    fn row_to_config(row: &SqliteRow) -> Result<BotConfig> {
        let min_bet: String = row.try_get("min_bet")?;
        let max_bet: String = row.try_get("max_bet")?;
        let status: String = row.try_get("status")?;
        let bet_time_from: i64 = row.try_get("bet_time_from")?;
        let bet_time_to: i64 = row.try_get("bet_time_to")?;
        let wallet_count_from: i64 = row.try_get("wallet_count_from")?;
        let wallet_count_to: i64 = row.try_get("wallet_count_to")?;
        let epoch_from: Option<i64> = row.try_get("epoch_from")?;
        let epoch_to: Option<i64> = row.try_get("epoch_to")?;

        Ok(BotConfig {
            min_bet: Decimal::from_str(&min_bet).context("Invalid min_bet")?,
            max_bet: Decimal::from_str(&max_bet).context("Invalid max_bet")?,
            bet_time_from: bet_time_from.max(0) as u64,
            bet_time_to: bet_time_to.max(0) as u64,
            balance_from: row.try_get("balance_from")?,
            balance_to: row.try_get("balance_to")?,
            wallet_count_from: wallet_count_from.max(0) as u32,
            wallet_count_to: wallet_count_to.max(0) as u32,
            epoch_from: epoch_from.map(|v| v.max(0) as u64),
            epoch_to: epoch_to.map(|v| v.max(0) as u64),
            status: BotStatus::from_str(&status)?,
            is_active: row.try_get("is_active")?,
        })
    }

    async fn insert_default_config(&self) -> Result<BotConfig> {
        let config = BotConfig::default();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO bot_config (min_bet, max_bet, bet_time_from, bet_time_to, balance_from, balance_to,
                wallet_count_from, wallet_count_to, epoch_from, epoch_to, status, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(config.min_bet.to_string())
        .bind(config.max_bet.to_string())
        .bind(config.bet_time_from as i64)
        .bind(config.bet_time_to as i64)
        .bind(config.balance_from)
        .bind(config.balance_to)
        .bind(config.wallet_count_from as i64)
        .bind(config.wallet_count_to as i64)
        .bind(config.epoch_from.map(|v| v as i64))
        .bind(config.epoch_to.map(|v| v as i64))
        .bind(config.status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!("Created default bot config");
        Ok(config)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}

#[async_trait]
impl WalletRepository for Database {
    async fn insert_wallet(&self, address: &str, encrypted_private_key: &[u8]) -> Result<Wallet> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO wallets (address, balance, is_active, encrypted_private_key, created_at, updated_at)
            VALUES (?, '0', 1, ?, ?, ?)
            "#,
        )
        .bind(address)
        .bind(encrypted_private_key)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert wallet {}", address))?;

        Ok(Wallet {
            id: result.last_insert_rowid(),
            address: address.to_string(),
            balance: Decimal::ZERO,
            is_active: true,
            encrypted_private_key: encrypted_private_key.to_vec(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_wallet(&self, id: i64) -> Result<Option<Wallet>> {
        let row = sqlx::query("SELECT * FROM wallets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>> {
        let row = sqlx::query("SELECT * FROM wallets WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    async fn list_wallets(&self, filter: &WalletFilter) -> Result<Vec<Wallet>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM wallets");
        if let Some(active) = filter.active {
            qb.push(" WHERE is_active = ").push_bind(active);
        }
        qb.push(" ORDER BY id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut wallets = Vec::with_capacity(rows.len());
        for row in &rows {
            let wallet = Self::row_to_wallet(row)?;
            if filter.min_balance.map_or(true, |min| wallet.balance >= min) {
                wallets.push(wallet);
            }
        }
        Ok(wallets)
    }

    async fn update_wallet_balance(&self, id: i64, balance: Decimal) -> Result<()> {
        sqlx::query("UPDATE wallets SET balance = ?, updated_at = ? WHERE id = ?")
            .bind(balance.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_wallet_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE wallets SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BetRecordRepository for Database {
    async fn insert_bet(&self, bet: &NewBetRecord) -> Result<BetRecord> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO bet_history (wallet_address, round_number, direction, amount, status, bet_offset_seconds, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&bet.wallet_address)
        .bind(bet.round_number as i64)
        .bind(bet.direction.as_str())
        .bind(bet.amount.to_string())
        .bind(bet.bet_offset_seconds)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(BetRecord {
            id: result.last_insert_rowid(),
            wallet_address: bet.wallet_address.clone(),
            round_number: bet.round_number,
            direction: bet.direction,
            amount: bet.amount,
            payout: None,
            status: BetStatus::Pending,
            bet_offset_seconds: bet.bet_offset_seconds,
            tx_id: None,
            failure_reason: None,
            created_at: now,
        })
    }

    async fn mark_bet_submitted(&self, id: i64, tx_id: &str) -> Result<()> {
        sqlx::query("UPDATE bet_history SET tx_id = ? WHERE id = ?")
            .bind(tx_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_bet_lost(&self, id: i64, reason: &str) -> Result<()> {
        sqlx::query("UPDATE bet_history SET status = 'lost', failure_reason = ? WHERE id = ?")
            .bind(reason)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_round_won(
        &self,
        wallet_address: &str,
        round_number: u64,
        payout: Decimal,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bet_history SET status = 'won', payout = ?
            WHERE id = (
                SELECT id FROM bet_history
                WHERE wallet_address = ? AND round_number = ? AND status = 'pending'
                ORDER BY tx_id IS NULL, id
                LIMIT 1
            )
            "#,
        )
        .bind(payout.to_string())
        .bind(wallet_address)
        .bind(round_number as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn query_bets(&self, query: &BetQuery) -> Result<Vec<BetRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM bet_history WHERE 1 = 1");
        if let Some(address) = &query.wallet_address {
            qb.push(" AND wallet_address = ").push_bind(address.clone());
        }
        if let Some(round_number) = query.round_number {
            qb.push(" AND round_number = ").push_bind(round_number as i64);
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY id DESC");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_bet).collect()
    }
}

#[async_trait]
impl ConfigRepository for Database {
    async fn get_config(&self) -> Result<BotConfig> {
        let row = sqlx::query("SELECT * FROM bot_config WHERE is_active = 1 ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Self::row_to_config(&r),
            None => self.insert_default_config().await,
        }
    }

    async fn save_config(&self, config: &BotConfig) -> Result<BotConfig> {
        // Make sure the active row exists
        self.get_config().await?;

        sqlx::query(
            r#"
            UPDATE bot_config SET min_bet = ?, max_bet = ?, bet_time_from = ?, bet_time_to = ?,
                balance_from = ?, balance_to = ?, wallet_count_from = ?, wallet_count_to = ?,
                epoch_from = ?, epoch_to = ?, status = ?, updated_at = ?
            WHERE is_active = 1
            "#,
        )
        .bind(config.min_bet.to_string())
        .bind(config.max_bet.to_string())
        .bind(config.bet_time_from as i64)
        .bind(config.bet_time_to as i64)
        .bind(config.balance_from)
        .bind(config.balance_to)
        .bind(config.wallet_count_from as i64)
        .bind(config.wallet_count_to as i64)
        .bind(config.epoch_from.map(|v| v as i64))
        .bind(config.epoch_to.map(|v| v as i64))
        .bind(config.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_config().await
    }

    async fn set_status(&self, status: BotStatus) -> Result<()> {
        self.get_config().await?;

        sqlx::query("UPDATE bot_config SET status = ?, updated_at = ? WHERE is_active = 1")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
