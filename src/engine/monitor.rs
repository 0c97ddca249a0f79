//! Round Monitor - polls the oracle and schedules each new round exactly once

use super::scheduler::BetScheduler;
use super::EngineContext;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What a single poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Bot is not running
    Idle,
    /// Another tick is still in flight
    Busy,
    /// Oracle reported no round
    NoRound,
    SameRound(u64),
    NewRound(u64),
    /// Oracle fetch failed; the next tick retries
    Failed,
}

pub struct RoundMonitor {
    ctx: Arc<EngineContext>,
    scheduler: Arc<BetScheduler>,
}

impl RoundMonitor {
    pub fn new(ctx: Arc<EngineContext>, scheduler: Arc<BetScheduler>) -> Self {
        Self { ctx, scheduler }
    }

    /// Run one poll
    pub async fn tick(&self) -> TickOutcome {
        if !self.ctx.state.is_running() {
            return TickOutcome::Idle;
        }

        let Some(_tick) = self.ctx.state.try_begin_tick() else {
            debug!("[Monitor] Previous tick still running, skipping");
            return TickOutcome::Busy;
        };

        let round = match self.ctx.oracle.current_round().await {
            Ok(Some(round)) => round,
            Ok(None) => return TickOutcome::NoRound,
            Err(e) => {
                warn!("[Monitor] Failed to fetch current round: {}", e);
                return TickOutcome::Failed;
            }
        };

        if !self.ctx.state.observe_round(&round) {
            return TickOutcome::SameRound(round.round_number);
        }

        info!(
            "[Monitor] New round detected: {} | Pools - UP: {} DOWN: {}",
            round.round_number, round.total_up_amount, round.total_down_amount
        );

        self.scheduler.schedule(&round).await;
        TickOutcome::NewRound(round.round_number)
    }

    /// Poll on a fixed cadence until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "[Monitor] Round monitor started (every {}ms)",
            self.ctx.settings.round_poll_interval.as_millis()
        );

        let mut interval = tokio::time::interval(self.ctx.settings.round_poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("[Monitor] Round monitor stopped");
    }
}
