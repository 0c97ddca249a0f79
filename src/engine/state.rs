//! Shared run state of the engine

use crate::types::{BotStatus, RoundInfo};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Inner {
    status: BotStatus,
    current_round: Option<u64>,
    round_start_time: Option<DateTime<Utc>>,
}

/// Run status and last-seen round, owned by the controller and shared by every component
#[derive(Debug)]
pub struct EngineState {
    inner: Mutex<Inner>,
    tick_in_progress: AtomicBool,
}

/// Held for the duration of a monitor tick
pub struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: BotStatus::Stopped,
                current_round: None,
                round_start_time: None,
            }),
            tick_in_progress: AtomicBool::new(false),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> BotStatus {
        self.inner().status
    }

    pub fn set_status(&self, status: BotStatus) {
        self.inner().status = status;
    }

    pub fn is_running(&self) -> bool {
        self.status() == BotStatus::Running
    }

    pub fn current_round(&self) -> Option<u64> {
        self.inner().current_round
    }

    pub fn round_start_time(&self) -> Option<DateTime<Utc>> {
        self.inner().round_start_time
    }

    /// Record `round` as the last seen round. Returns `true` only when its number differs.
    pub fn observe_round(&self, round: &RoundInfo) -> bool {
        let mut inner = self.inner();
        if inner.current_round == Some(round.round_number) {
            return false;
        }
        inner.current_round = Some(round.round_number);
        inner.round_start_time = Some(round.start_time);
        true
    }

    /// Claim the monitor tick token. `None` while another tick is running.
    pub fn try_begin_tick(&self) -> Option<TickGuard<'_>> {
        self.tick_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard {
                flag: &self.tick_in_progress,
            })
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}
