//! Bot Controller - run-state machine and control-plane entry points

use super::claimer::AutoClaimer;
use super::executor::BetExecutor;
use super::monitor::RoundMonitor;
use super::scheduler::BetScheduler;
use super::EngineContext;
use crate::errors::{EngineError, EngineResult};
use crate::repository::WalletFilter;
use crate::types::{
    BetQuery, BetRecord, BotConfig, BotConfigUpdate, BotStatus, BotStatusReport, ClaimSummary,
    RoundStats, WalletClaimable,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const RECENT_BETS: u32 = 10;

/// Structured outcome of a control-plane call
#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ControlResponse<T> {
    pub fn from_result(result: EngineResult<T>, ok_message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                message: ok_message.into(),
                data: Some(data),
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
                data: None,
            },
        }
    }
}

struct RunningLoops {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

pub struct BotController {
    ctx: Arc<EngineContext>,
    scheduler: Arc<BetScheduler>,
    monitor: Arc<RoundMonitor>,
    claimer: Arc<AutoClaimer>,
    loops: Mutex<Option<RunningLoops>>,
}

impl BotController {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let executor = Arc::new(BetExecutor::new(Arc::clone(&ctx)));
        let scheduler = Arc::new(BetScheduler::new(Arc::clone(&ctx), Arc::clone(&executor)));
        let monitor = Arc::new(RoundMonitor::new(Arc::clone(&ctx), Arc::clone(&scheduler)));
        let claimer = Arc::new(AutoClaimer::new(Arc::clone(&ctx)));

        Self {
            ctx,
            scheduler,
            monitor,
            claimer,
            loops: Mutex::new(None),
        }
    }

    pub fn scheduler(&self) -> &Arc<BetScheduler> {
        &self.scheduler
    }

    /// Start betting. From paused this resumes the loops already running.
    pub async fn start(&self) -> EngineResult<()> {
        let mut loops = self.loops.lock().await;

        if self.ctx.state.is_running() {
            return Err(EngineError::precondition("Bot is already running"));
        }

        let active = self.ctx.store.list_wallets(&WalletFilter::active()).await?;
        if active.is_empty() {
            return Err(EngineError::precondition(
                "No active wallets found. Please generate wallets first.",
            ));
        }

        let config = self.ctx.store.get_config().await?;
        config.validate().map_err(EngineError::InvalidConfig)?;
        self.ctx.settings.validate().map_err(EngineError::InvalidConfig)?;

        self.ctx.store.set_status(BotStatus::Running).await?;
        let previous = self.ctx.state.status();
        self.ctx.state.set_status(BotStatus::Running);

        self.scheduler.ensure_driver();

        if loops.is_none() {
            let (shutdown, rx) = watch::channel(false);
            let monitor = tokio::spawn(Arc::clone(&self.monitor).run(rx.clone()));
            let claimer = tokio::spawn(Arc::clone(&self.claimer).run(rx));
            *loops = Some(RunningLoops {
                shutdown,
                handles: vec![monitor, claimer],
            });
        }

        if previous == BotStatus::Paused {
            info!("[Controller] Bot resumed with {} active wallets", active.len());
        } else {
            info!("[Controller] Bot started with {} active wallets", active.len());
        }
        Ok(())
    }

    /// Keep the loops alive but stop acting on rounds
    pub async fn pause(&self) -> EngineResult<()> {
        let _loops = self.loops.lock().await;
        if !self.ctx.state.is_running() {
            return Err(EngineError::precondition("Bot is not running"));
        }

        self.ctx.store.set_status(BotStatus::Paused).await?;
        self.ctx.state.set_status(BotStatus::Paused);
        info!("[Controller] Bot paused");
        Ok(())
    }

    pub async fn resume(&self) -> EngineResult<()> {
        if self.ctx.state.status() != BotStatus::Paused {
            return Err(EngineError::precondition("Bot is not paused"));
        }
        self.start().await
    }

    /// Stop the loops and wait for them. Armed bets see the status at fire time.
    pub async fn stop(&self) -> EngineResult<()> {
        let mut loops = self.loops.lock().await;

        self.ctx.state.set_status(BotStatus::Stopped);
        let persisted = self.ctx.store.set_status(BotStatus::Stopped).await;

        if let Some(running) = loops.take() {
            let _ = running.shutdown.send(true);
            for handle in running.handles {
                if let Err(e) = handle.await {
                    warn!("[Controller] Loop ended abnormally: {}", e);
                }
            }
        }

        persisted?;
        info!("[Controller] Bot stopped");
        Ok(())
    }

    pub async fn status(&self) -> EngineResult<BotStatusReport> {
        let wallets = self.ctx.store.list_wallets(&WalletFilter::active()).await?;
        let recent_bets = self
            .ctx
            .store
            .query_bets(&BetQuery {
                limit: Some(RECENT_BETS),
                ..Default::default()
            })
            .await?;
        let config = self.ctx.store.get_config().await?;
        let status = self.ctx.state.status();

        Ok(BotStatusReport {
            is_running: status == BotStatus::Running,
            status,
            current_round: self.ctx.state.current_round(),
            round_start_time: self.ctx.state.round_start_time(),
            active_wallets: wallets.len(),
            total_wallet_balance: wallets.iter().map(|w| w.balance).sum::<Decimal>(),
            recent_bets,
            config,
        })
    }

    pub async fn get_betting_history(&self, limit: u32) -> EngineResult<Vec<BetRecord>> {
        Ok(self
            .ctx
            .store
            .query_bets(&BetQuery {
                limit: Some(limit),
                ..Default::default()
            })
            .await?)
    }

    /// Stats for one round, or across all history
    pub async fn get_round_stats(&self, round_number: Option<u64>) -> EngineResult<RoundStats> {
        let records = self
            .ctx
            .store
            .query_bets(&BetQuery {
                round_number,
                ..Default::default()
            })
            .await?;
        Ok(RoundStats::from_records(round_number, &records))
    }

    pub async fn manual_claim(&self, wallet_id: i64) -> ClaimSummary {
        self.claimer.manual_claim(wallet_id).await
    }

    pub async fn claimable_summary(&self) -> EngineResult<Vec<WalletClaimable>> {
        self.claimer.claimable_summary().await
    }

    pub async fn get_config(&self) -> EngineResult<BotConfig> {
        Ok(self.ctx.store.get_config().await?)
    }

    /// Merge, validate and persist a partial update. Run status is left untouched.
    pub async fn update_config(&self, update: &BotConfigUpdate) -> EngineResult<BotConfig> {
        let current = self.ctx.store.get_config().await?;
        let next = current.merged(update);
        next.validate().map_err(EngineError::InvalidConfig)?;

        let saved = self.ctx.store.save_config(&next).await?;
        info!(
            "[Controller] Config updated: bet {}-{} | delay {}-{}s | wallets {}-{}",
            saved.min_bet,
            saved.max_bet,
            saved.bet_time_from,
            saved.bet_time_to,
            saved.wallet_count_from,
            saved.wallet_count_to
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::engine::test_support::{fast_settings, Harness};
    use crate::repository::ConfigRepository;
    use crate::types::{BetStatus, Direction};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn controller(h: &Harness) -> BotController {
        BotController::new(Arc::clone(&h.ctx))
    }

    #[tokio::test]
    async fn test_start_requires_wallets() {
        let h = Harness::new().await;
        let bot = controller(&h);

        let err = bot.start().await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
        assert!(err.to_string().contains("No active wallets"));
        assert_eq!(h.ctx.state.status(), BotStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let h = Harness::new().await;
        h.funded_wallet(dec!(1)).await;
        let bot = controller(&h);

        bot.start().await.unwrap();
        let err = bot.start().await.unwrap_err();
        assert_eq!(err.to_string(), "Bot is already running");

        bot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_persists_status() {
        let h = Harness::new().await;
        h.funded_wallet(dec!(1)).await;
        let bot = controller(&h);

        bot.start().await.unwrap();
        assert_eq!(h.db.get_config().await.unwrap().status, BotStatus::Running);

        bot.pause().await.unwrap();
        assert_eq!(h.ctx.state.status(), BotStatus::Paused);
        assert_eq!(h.db.get_config().await.unwrap().status, BotStatus::Paused);

        bot.start().await.unwrap();
        assert!(h.ctx.state.is_running());

        bot.stop().await.unwrap();
        assert_eq!(h.ctx.state.status(), BotStatus::Stopped);
        assert_eq!(h.db.get_config().await.unwrap().status, BotStatus::Stopped);

        // Restart after stop spawns fresh loops
        bot.start().await.unwrap();
        bot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_and_resume_preconditions() {
        let h = Harness::new().await;
        h.funded_wallet(dec!(1)).await;
        let bot = controller(&h);

        assert!(bot.pause().await.is_err());
        assert!(bot.resume().await.is_err());

        bot.start().await.unwrap();
        bot.pause().await.unwrap();
        bot.resume().await.unwrap();
        assert!(h.ctx.state.is_running());
        bot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_running_bot_bets_on_new_round() {
        let h = Harness::new().await;
        h.funded_wallet(dec!(1)).await;
        h.set_bet_time(0, 0).await;
        h.set_wallet_count(1, 1).await;
        let bot = controller(&h);

        h.oracle.open_next_round().await;
        bot.start().await.unwrap();

        let bets = h.wait_for_bets(1).await;
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].status, BetStatus::Pending);

        bot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_drops_armed_bets() {
        let h = Harness::new().await;
        h.funded_wallet(dec!(1)).await;
        h.set_bet_time(1, 1).await;
        let bot = controller(&h);

        h.oracle.open_next_round().await;
        bot.start().await.unwrap();
        tokio::time::sleep(fast_settings().round_poll_interval * 5).await;
        assert_eq!(bot.scheduler().pending(), 1);

        bot.stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1300)).await;

        assert_eq!(bot.scheduler().pending(), 0);
        assert!(h.wait_for_bets(0).await.is_empty());
    }

    #[tokio::test]
    async fn test_start_rejects_zero_poll_interval() {
        let h = Harness::with_settings(EngineSettings {
            round_poll_interval: Duration::ZERO,
            ..fast_settings()
        })
        .await;
        h.funded_wallet(dec!(1)).await;
        let bot = controller(&h);

        let err = bot.start().await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
        assert!(!h.ctx.state.is_running());
        assert_ne!(h.config().await.status, BotStatus::Running);
    }

    #[tokio::test]
    async fn test_update_config_validates() {
        let h = Harness::new().await;
        let bot = controller(&h);

        let err = bot
            .update_config(&BotConfigUpdate {
                min_bet: Some(dec!(0.5)),
                max_bet: Some(dec!(0.1)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));

        let saved = bot
            .update_config(&BotConfigUpdate {
                wallet_count_from: Some(2),
                wallet_count_to: Some(4),
                epoch_from: Some(Some(10)),
                epoch_to: Some(Some(20)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(saved.wallet_count_from, 2);
        assert_eq!(saved.epoch_to, Some(20));
        assert_eq!(bot.get_config().await.unwrap().epoch_from, Some(10));
    }

    #[tokio::test]
    async fn test_status_and_stats() {
        let h = Harness::new().await;
        h.set_running().await;
        let a = h.funded_wallet(dec!(1)).await;
        let b = h.funded_wallet(dec!(2)).await;
        let round = h.observe_new_round().await;
        let info = h.round_info(round).await;
        let config = h.config().await;
        h.bet(&a, &info, Direction::Up, &config).await;
        h.bet(&b, &info, Direction::Down, &config).await;

        let bot = controller(&h);
        let report = bot.status().await.unwrap();
        assert!(report.is_running);
        assert_eq!(report.current_round, Some(round));
        assert_eq!(report.round_start_time, Some(info.start_time));
        assert_eq!(report.active_wallets, 2);
        assert_eq!(report.recent_bets.len(), 2);
        assert!(report.total_wallet_balance < dec!(3));

        let stats = bot.get_round_stats(Some(round)).await.unwrap();
        assert_eq!(stats.total_bets, 2);
        assert_eq!(stats.up_bets, 1);
        assert_eq!(stats.down_bets, 1);
        assert_eq!(stats.up_percentage, 50.0);

        let empty = bot.get_round_stats(Some(round + 1)).await.unwrap();
        assert_eq!(empty.total_bets, 0);

        assert_eq!(bot.get_betting_history(1).await.unwrap().len(), 1);
    }

    #[test]
    fn test_control_response_from_result() {
        let ok = ControlResponse::from_result(Ok(3u32), "done");
        assert!(ok.success);
        assert_eq!(ok.data, Some(3));

        let err: ControlResponse<u32> =
            ControlResponse::from_result(Err(EngineError::precondition("Bot is already running")), "done");
        assert!(!err.success);
        assert_eq!(err.message, "Bot is already running");
        assert!(err.data.is_none());
    }
}
