//! Bot engine: round detection, bet scheduling, fan-out execution and auto-claim
//!
//! The [`BotController`] owns the run state and wires the pieces together:
//!
//! - [`RoundMonitor`] polls the oracle and hands each new round to the scheduler once
//! - [`BetScheduler`] arms a delayed, round-bound execution on its delay queue
//! - [`BetExecutor`] selects wallets, computes the direction bias and submits bets
//! - [`AutoClaimer`] sweeps wallets for winning rounds and claims them

mod claimer;
mod controller;
mod executor;
mod monitor;
mod scheduler;
mod selector;
mod state;
mod strategy;

#[cfg(test)]
mod test_support;

pub use claimer::{AutoClaimer, SweepSummary};
pub use controller::{BotController, ControlResponse};
pub use executor::{BetExecutor, RoundSummary, WalletBetOutcome};
pub use monitor::{RoundMonitor, TickOutcome};
pub use scheduler::{BetScheduler, ScheduleOutcome};
pub use selector::{eligibility_threshold, pick_wallets, select_wallets};
pub use state::EngineState;
pub use strategy::{calculate_strategy, BettingStrategy};

use crate::config::EngineSettings;
use crate::dice::Dice;
use crate::oracle::RoundOracle;
use crate::repository::Store;
use crate::wallet::{Keyring, WalletLocks};
use std::sync::Arc;

/// Collaborators shared by every engine component
pub struct EngineContext {
    pub oracle: Arc<dyn RoundOracle>,
    pub store: Arc<dyn Store>,
    pub keyring: Keyring,
    pub state: Arc<EngineState>,
    pub dice: Arc<Dice>,
    pub settings: EngineSettings,
    pub wallet_locks: WalletLocks,
}

impl EngineContext {
    pub fn new(
        oracle: Arc<dyn RoundOracle>,
        store: Arc<dyn Store>,
        keyring: Keyring,
        dice: Arc<Dice>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            oracle,
            store,
            keyring,
            state: Arc::new(EngineState::new()),
            dice,
            settings,
            wallet_locks: WalletLocks::new(),
        }
    }
}
