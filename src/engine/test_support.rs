//! Shared fixture for engine tests: in-memory store, paper ledger, fast timings

use super::executor::place_wallet_bet;
use super::{AutoClaimer, BetExecutor, BetScheduler, EngineContext, RoundMonitor};
use crate::config::EngineSettings;
use crate::db::Database;
use crate::dice::Dice;
use crate::oracle::{PaperOracle, PaperSettings, RoundOracle};
use crate::repository::{BetRecordRepository, ConfigRepository, WalletRepository};
use crate::types::{BetQuery, BetRecord, BotConfig, BotStatus, Direction, RoundInfo, Wallet};
use crate::wallet::{generate_wallet, Keyring};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub ctx: Arc<EngineContext>,
    pub db: Arc<Database>,
    pub oracle: Arc<PaperOracle>,
    pub executor: Arc<BetExecutor>,
    pub scheduler: Arc<BetScheduler>,
    pub monitor: Arc<RoundMonitor>,
    pub claimer: Arc<AutoClaimer>,
}

pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        round_poll_interval: Duration::from_millis(20),
        claim_interval: Duration::from_millis(50),
        claim_wallet_delay: Duration::ZERO,
        fee_buffer: dec!(0.002),
        bet_jitter_min: Duration::ZERO,
        bet_jitter_max: Duration::ZERO,
        max_concurrent_bets: 4,
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(fast_settings()).await
    }

    pub async fn with_settings(settings: EngineSettings) -> Self {
        let dice = Arc::new(Dice::seeded(42));
        let db = Arc::new(Database::in_memory().await.unwrap());
        let oracle = Arc::new(PaperOracle::new(PaperSettings::default(), dice.clone()));
        let keyring = Keyring::from_secret(Some("test-secret")).unwrap();

        let ctx = Arc::new(EngineContext::new(
            oracle.clone(),
            db.clone(),
            keyring,
            dice,
            settings,
        ));

        let executor = Arc::new(BetExecutor::new(ctx.clone()));
        let scheduler = Arc::new(BetScheduler::new(ctx.clone(), executor.clone()));
        let monitor = Arc::new(RoundMonitor::new(ctx.clone(), scheduler.clone()));
        let claimer = Arc::new(AutoClaimer::new(ctx.clone()));

        Self {
            ctx,
            db,
            oracle,
            executor,
            scheduler,
            monitor,
            claimer,
        }
    }

    pub async fn set_status(&self, status: BotStatus) {
        self.db.set_status(status).await.unwrap();
        self.ctx.state.set_status(status);
    }

    pub async fn set_running(&self) {
        self.set_status(BotStatus::Running).await;
    }

    pub async fn config(&self) -> BotConfig {
        self.db.get_config().await.unwrap()
    }

    async fn update_config(&self, f: impl FnOnce(&mut BotConfig)) {
        let mut config = self.config().await;
        f(&mut config);
        self.db.save_config(&config).await.unwrap();
    }

    pub async fn set_bet_time(&self, from: u64, to: u64) {
        self.update_config(|c| {
            c.bet_time_from = from;
            c.bet_time_to = to;
        })
        .await;
    }

    pub async fn set_wallet_count(&self, from: u32, to: u32) {
        self.update_config(|c| {
            c.wallet_count_from = from;
            c.wallet_count_to = to;
        })
        .await;
    }

    pub async fn set_bet_range(&self, min: Decimal, max: Decimal) {
        self.update_config(|c| {
            c.min_bet = min;
            c.max_bet = max;
        })
        .await;
    }

    /// Active wallet with `amount` both in the store and on the paper ledger
    pub async fn funded_wallet(&self, amount: Decimal) -> Wallet {
        let generated = generate_wallet();
        let blob = self
            .ctx
            .keyring
            .encrypt(generated.private_key.expose())
            .unwrap();
        let wallet = self.db.insert_wallet(&generated.address, &blob).await.unwrap();
        self.db.update_wallet_balance(wallet.id, amount).await.unwrap();
        self.oracle.fund(&generated.address, amount).await;
        self.db.get_wallet(wallet.id).await.unwrap().unwrap()
    }

    /// Current ledger snapshot of round `n`
    pub async fn round_info(&self, n: u64) -> RoundInfo {
        let info = self.oracle.current_round().await.unwrap().unwrap();
        assert_eq!(info.round_number, n, "round {} is not current", n);
        info
    }

    /// Open a round on the ledger and record it as the engine's current round
    pub async fn observe_new_round(&self) -> u64 {
        let n = self.oracle.open_next_round().await;
        let info = self.round_info(n).await;
        self.ctx.state.observe_round(&info);
        n
    }

    /// Place one bet with a forced direction
    pub async fn bet(&self, wallet: &Wallet, round: &RoundInfo, direction: Direction, config: &BotConfig) {
        let up_probability = match direction {
            Direction::Up => 1.0,
            Direction::Down => 0.0,
        };
        place_wallet_bet(&self.ctx, wallet.clone(), round, up_probability, config).await;
    }

    /// Poll the store until at least `n` bet records exist
    pub async fn wait_for_bets(&self, n: usize) -> Vec<BetRecord> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let bets = self.db.query_bets(&BetQuery::default()).await.unwrap();
            if bets.len() >= n || tokio::time::Instant::now() >= deadline {
                return bets;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
