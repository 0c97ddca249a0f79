//! Process configuration loaded from the environment

use anyhow::Result;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Process-level settings. Operational betting parameters live in [`crate::types::BotConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database
    pub database_path: String,

    /// Secret used to derive the wallet encryption key
    pub encryption_key: Option<String>,

    /// Funding wallet used for distribution and collection
    pub main_wallet_private_key: Option<String>,

    /// Whether running against the simulated ledger
    pub paper_trading: bool,

    /// Round length for the simulated ledger, in seconds
    pub paper_round_seconds: u64,

    /// Fixed seed for reproducible runs
    pub rng_seed: Option<u64>,

    /// Engine timings and limits
    pub engine: EngineSettings,
}

/// Timings and limits shared by the engine components
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Round monitor poll cadence
    pub round_poll_interval: Duration,
    /// Auto-claim sweep cadence
    pub claim_interval: Duration,
    /// Pause between wallets during an auto-claim sweep
    pub claim_wallet_delay: Duration,
    /// Reserved per transaction for network fees
    pub fee_buffer: Decimal,
    /// Jitter between wallet dispatches
    pub bet_jitter_min: Duration,
    pub bet_jitter_max: Duration,
    /// Max in-flight bet submissions per round
    pub max_concurrent_bets: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            round_poll_interval: Duration::from_millis(5000),
            claim_interval: Duration::from_secs(10),
            claim_wallet_delay: Duration::from_millis(1000),
            fee_buffer: Decimal::new(2, 3),
            bet_jitter_min: Duration::from_millis(1000),
            bet_jitter_max: Duration::from_millis(5000),
            max_concurrent_bets: 8,
        }
    }
}

impl EngineSettings {
    /// Reject timings the engine loops cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.round_poll_interval.is_zero() {
            return Err("ROUND_POLL_INTERVAL_MS must be greater than zero".to_string());
        }
        if self.claim_interval.is_zero() {
            return Err("CLAIM_INTERVAL_SECONDS must be greater than zero".to_string());
        }
        if self.bet_jitter_min > self.bet_jitter_max {
            return Err("BET_JITTER_MIN_MS must not exceed BET_JITTER_MAX_MS".to_string());
        }
        if self.fee_buffer < Decimal::ZERO {
            return Err("FEE_BUFFER must not be negative".to_string());
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let database_path = env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "predictor.db".to_string());

        let encryption_key = env::var("ENCRYPTION_KEY").ok().filter(|s| !s.is_empty());

        let main_wallet_private_key = env::var("MAIN_WALLET_PRIVATE_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let paper_trading = env::var("PAPER_TRADING")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true); // Default to paper trading for safety

        let paper_round_seconds = parse_var("PAPER_ROUND_SECONDS").unwrap_or(300);

        let rng_seed = parse_var("RNG_SEED");

        let defaults = EngineSettings::default();
        let engine = EngineSettings {
            round_poll_interval: parse_var("ROUND_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.round_poll_interval),
            claim_interval: parse_var("CLAIM_INTERVAL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_wallet_delay: parse_var("CLAIM_WALLET_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.claim_wallet_delay),
            fee_buffer: env::var("FEE_BUFFER")
                .ok()
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or(defaults.fee_buffer),
            bet_jitter_min: parse_var("BET_JITTER_MIN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.bet_jitter_min),
            bet_jitter_max: parse_var("BET_JITTER_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.bet_jitter_max),
            max_concurrent_bets: parse_var::<usize>("MAX_CONCURRENT_BETS")
                .unwrap_or(defaults.max_concurrent_bets)
                .max(1),
        };

        // Validate configuration
        if let Err(e) = engine.validate() {
            anyhow::bail!("Invalid engine settings: {}", e);
        }
        if !paper_trading {
            anyhow::bail!("Live mode requires a ledger client; set PAPER_TRADING=true");
        }

        Ok(Self {
            database_path,
            encryption_key,
            main_wallet_private_key,
            paper_trading,
            paper_round_seconds,
            rng_seed,
            engine,
        })
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
