//! Bet Scheduler - delay queue of round-bound bet executions
//!
//! `schedule` never blocks on the delay: it pushes an [`ArmedBet`] onto a
//! min-heap and wakes the driver task, which sleeps until the earliest
//! deadline and hands due entries to the executor.

use super::executor::BetExecutor;
use super::EngineContext;
use crate::types::{BotStatus, RoundInfo};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Armed { round_number: u64, delay: Duration },
    NotRunning,
    OutsideWindow,
    /// Config could not be read
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArmedBet {
    fire_at: Instant,
    seq: u64,
    round_number: u64,
}

impl Ord for ArmedBet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ArmedBet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct BetScheduler {
    ctx: Arc<EngineContext>,
    executor: Arc<BetExecutor>,
    queue: Mutex<BinaryHeap<Reverse<ArmedBet>>>,
    wake: Notify,
    seq: AtomicU64,
    driver_started: AtomicBool,
}

impl BetScheduler {
    pub fn new(ctx: Arc<EngineContext>, executor: Arc<BetExecutor>) -> Self {
        Self {
            ctx,
            executor,
            queue: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
            seq: AtomicU64::new(0),
            driver_started: AtomicBool::new(false),
        }
    }

    fn queue(&self) -> MutexGuard<'_, BinaryHeap<Reverse<ArmedBet>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm a delayed execution for a newly observed round
    pub async fn schedule(&self, round: &RoundInfo) -> ScheduleOutcome {
        let config = match self.ctx.store.get_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!("[Scheduler] Failed to load config for round {}: {:#}", round.round_number, e);
                return ScheduleOutcome::Failed;
            }
        };

        if config.status != BotStatus::Running {
            info!("[Scheduler] Bot is {}, skipping round {}", config.status, round.round_number);
            return ScheduleOutcome::NotRunning;
        }

        if !config.round_in_window(round.round_number) {
            info!(
                "[Scheduler] Round {} is outside epoch range [{}-{}], skipping",
                round.round_number,
                config.epoch_from.unwrap_or_default(),
                config.epoch_to.unwrap_or_default()
            );
            return ScheduleOutcome::OutsideWindow;
        }

        let delay_secs = self
            .ctx
            .dice
            .uniform(config.bet_time_from as f64, config.bet_time_to as f64);
        let delay = Duration::from_secs_f64(delay_secs.max(0.0));

        self.arm(round.round_number, delay);

        info!(
            "[Scheduler] Scheduling bets for round {} in {:.1}s",
            round.round_number, delay_secs
        );
        ScheduleOutcome::Armed {
            round_number: round.round_number,
            delay,
        }
    }

    fn arm(&self, round_number: u64, delay: Duration) {
        let bet = ArmedBet {
            fire_at: Instant::now() + delay,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            round_number,
        };
        self.queue().push(Reverse(bet));
        self.wake.notify_one();
    }

    /// Armed executions not yet fired
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Spawn the driver task once per process
    pub fn ensure_driver(self: &Arc<Self>) {
        if self.driver_started.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.drive().await });
        debug!("[Scheduler] Driver started");
    }

    async fn drive(self: Arc<Self>) {
        loop {
            let next = self.queue().peek().map(|Reverse(bet)| bet.fire_at);
            match next {
                None => self.wake.notified().await,
                Some(fire_at) if fire_at <= Instant::now() => {
                    let due = self.queue().pop().map(|Reverse(bet)| bet);
                    if let Some(bet) = due {
                        self.fire(bet);
                    }
                }
                Some(fire_at) => {
                    tokio::select! {
                        _ = sleep_until(fire_at) => {}
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
    }

    fn fire(&self, bet: ArmedBet) {
        let state = &self.ctx.state;
        if !state.is_running() {
            info!("[Scheduler] Bot is {}, dropping bets for round {}", state.status(), bet.round_number);
            return;
        }
        if state.current_round() != Some(bet.round_number) {
            info!(
                "[Scheduler] Round {} is no longer current, dropping its bets",
                bet.round_number
            );
            return;
        }

        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            executor.execute_round(bet.round_number).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::Harness;
    use crate::repository::{BetRecordRepository, ConfigRepository};
    use crate::types::BetQuery;

    #[tokio::test]
    async fn test_not_running_drops_round() {
        let h = Harness::new().await;
        let round = h.oracle.open_next_round().await;
        let info = h.round_info(round).await;

        assert_eq!(h.scheduler.schedule(&info).await, ScheduleOutcome::NotRunning);
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_epoch_window() {
        let h = Harness::new().await;
        h.set_running().await;
        let mut config = h.db.get_config().await.unwrap();
        config.epoch_from = Some(5);
        config.epoch_to = Some(9);
        h.db.save_config(&config).await.unwrap();

        let round = h.oracle.open_next_round().await;
        let info = h.round_info(round).await;
        assert_eq!(h.scheduler.schedule(&info).await, ScheduleOutcome::OutsideWindow);

        config.epoch_from = Some(1);
        h.db.save_config(&config).await.unwrap();
        assert!(matches!(
            h.scheduler.schedule(&info).await,
            ScheduleOutcome::Armed { round_number: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_delay_within_configured_range() {
        let h = Harness::new().await;
        h.set_running().await;
        h.set_bet_time(30, 40).await;
        let round = h.oracle.open_next_round().await;
        let info = h.round_info(round).await;

        for _ in 0..20 {
            match h.scheduler.schedule(&info).await {
                ScheduleOutcome::Armed { delay, .. } => {
                    assert!(delay >= Duration::from_secs(30) && delay <= Duration::from_secs(40));
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_fire_skips_stale_round() {
        let h = Harness::new().await;
        h.set_running().await;
        h.set_bet_time(0, 0).await;
        let wallet = h.funded_wallet(rust_decimal_macros::dec!(1)).await;

        let first = h.oracle.open_next_round().await;
        let info = h.round_info(first).await;
        h.ctx.state.observe_round(&info);

        let second = h.oracle.open_next_round().await;
        let next_info = h.round_info(second).await;
        h.ctx.state.observe_round(&next_info);

        h.scheduler.schedule(&info).await;
        h.scheduler.ensure_driver();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(h.scheduler.pending(), 0);
        let bets = h.db.query_bets(&BetQuery::default()).await.unwrap();
        assert!(bets.is_empty(), "stale round should not bet from {}", wallet.address);
    }

    #[tokio::test]
    async fn test_driver_fires_due_round() {
        let h = Harness::new().await;
        h.set_running().await;
        h.set_bet_time(0, 0).await;
        h.set_wallet_count(1, 1).await;
        h.funded_wallet(rust_decimal_macros::dec!(1)).await;

        let round = h.oracle.open_next_round().await;
        let info = h.round_info(round).await;
        h.ctx.state.observe_round(&info);

        h.scheduler.ensure_driver();
        h.scheduler.ensure_driver();
        h.scheduler.schedule(&info).await;

        let bets = h.wait_for_bets(1).await;
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].round_number, round);
    }
}
