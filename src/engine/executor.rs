//! Bet Executor - fan-out bet submission across the selected wallets
//!
//! Each wallet's bet runs in its own task on a bounded pool. A failure is
//! recorded against that wallet only; the rest of the round carries on.

use super::selector::select_wallets;
use super::strategy::{calculate_strategy, draw_direction, BettingStrategy};
use super::EngineContext;
use crate::errors::{EngineError, EngineResult};
use crate::types::{BetQuery, BetStatus, BotConfig, BotStatus, NewBetRecord, RoundInfo, Wallet};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Result of one wallet's bet attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletBetOutcome {
    Submitted { tx_id: String },
    /// Ledger reported the bet as already processed
    Duplicate,
    /// Balance could not cover stake plus fee buffer
    Skipped,
    Failed { reason: String },
}

/// Per-round tally, available once every dispatched bet has finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub round_number: u64,
    pub selected: usize,
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Wallets never dispatched because the round ended or the bot stopped
    pub aborted: usize,
}

pub struct BetExecutor {
    ctx: Arc<EngineContext>,
}

impl BetExecutor {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Bet on an armed round once its delay has elapsed
    pub async fn execute_round(&self, round_number: u64) -> Option<RoundSummary> {
        let config = match self.ctx.store.get_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!("[Executor] Failed to load config: {:#}", e);
                return None;
            }
        };
        if config.status != BotStatus::Running {
            info!("[Executor] Bot is {}, skipping round {}", config.status, round_number);
            return None;
        }

        let round = match self.ctx.oracle.current_round().await {
            Ok(Some(round)) => round,
            Ok(None) => {
                info!("[Executor] No current round, skipping round {}", round_number);
                return None;
            }
            Err(e) => {
                warn!("[Executor] Failed to refresh round {}: {}", round_number, e);
                return None;
            }
        };
        if round.round_number != round_number || !round.accepts_bets_at(Utc::now()) {
            info!("[Executor] Round {} is no longer open, skipping bets", round_number);
            return None;
        }

        let wallets = match select_wallets(
            self.ctx.store.as_ref(),
            &self.ctx.dice,
            &config,
            self.ctx.settings.fee_buffer,
        )
        .await
        {
            Ok(wallets) => wallets,
            Err(e) => {
                warn!("[Executor] Failed to load wallets: {:#}", e);
                return None;
            }
        };

        if wallets.is_empty() {
            warn!("[Executor] No active wallets with sufficient balance for round {}", round_number);
            return Some(RoundSummary {
                round_number,
                ..Default::default()
            });
        }

        info!("[Executor] Selected {} wallets for round {}", wallets.len(), round_number);

        let strategy = calculate_strategy(&round, &config, &self.ctx.dice);
        info!("[Executor] Betting strategy: {}", strategy);

        Some(self.execute_bets(wallets, &round, &strategy, &config).await)
    }

    /// Dispatch bets for `wallets` with jitter between dispatches, then wait for all of them
    pub async fn execute_bets(
        &self,
        mut wallets: Vec<Wallet>,
        round: &RoundInfo,
        strategy: &BettingStrategy,
        config: &BotConfig,
    ) -> RoundSummary {
        let mut summary = RoundSummary {
            round_number: round.round_number,
            selected: wallets.len(),
            ..Default::default()
        };

        self.ctx.dice.shuffle(&mut wallets);

        let permits = Arc::new(Semaphore::new(self.ctx.settings.max_concurrent_bets.max(1)));
        let mut tasks = JoinSet::new();
        let total = wallets.len();

        for (i, wallet) in wallets.into_iter().enumerate() {
            if i > 0 {
                let jitter = self
                    .ctx
                    .dice
                    .duration_between(self.ctx.settings.bet_jitter_min, self.ctx.settings.bet_jitter_max);
                tokio::time::sleep(jitter).await;
            }

            if self.should_abort(round, total - i) {
                summary.aborted = total - i;
                break;
            }

            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                summary.aborted = total - i;
                break;
            };

            // Waiting on a saturated pool can run past lock time
            if self.should_abort(round, total - i) {
                summary.aborted = total - i;
                break;
            }

            let ctx = Arc::clone(&self.ctx);
            let round = round.clone();
            let config = config.clone();
            let up_probability = strategy.up_probability;
            tasks.spawn(async move {
                let _permit = permit;
                place_wallet_bet(&ctx, wallet, &round, up_probability, &config).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(WalletBetOutcome::Submitted { .. }) | Ok(WalletBetOutcome::Duplicate) => {
                    summary.submitted += 1
                }
                Ok(WalletBetOutcome::Skipped) => summary.skipped += 1,
                Ok(WalletBetOutcome::Failed { .. }) => summary.failed += 1,
                Err(e) => {
                    error!("[Executor] Bet task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "[Executor] Round {} done: {} submitted, {} skipped, {} failed, {} aborted",
            summary.round_number, summary.submitted, summary.skipped, summary.failed, summary.aborted
        );
        summary
    }

    fn should_abort(&self, round: &RoundInfo, remaining: usize) -> bool {
        match self.abort_reason(round) {
            Some(reason) => {
                info!(
                    "[Executor] Round {}: {}, stopping {} remaining bets",
                    round.round_number, reason, remaining
                );
                true
            }
            None => false,
        }
    }

    fn abort_reason(&self, round: &RoundInfo) -> Option<&'static str> {
        let state = &self.ctx.state;
        if !state.is_running() {
            return Some("bot no longer running");
        }
        if state.current_round() != Some(round.round_number) {
            return Some("no longer current");
        }
        if Utc::now() >= round.lock_time {
            return Some("locked");
        }
        None
    }
}

/// Place one wallet's bet, containing any error to this wallet
pub(crate) async fn place_wallet_bet(
    ctx: &EngineContext,
    wallet: Wallet,
    round: &RoundInfo,
    up_probability: f64,
    config: &BotConfig,
) -> WalletBetOutcome {
    let address = wallet.address.clone();
    match try_place_wallet_bet(ctx, wallet, round, up_probability, config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let err = EngineError::PerWallet {
                address: address.clone(),
                reason: e.to_string(),
            };
            error!("[Executor] {}", err);
            WalletBetOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

async fn try_place_wallet_bet(
    ctx: &EngineContext,
    wallet: Wallet,
    round: &RoundInfo,
    up_probability: f64,
    config: &BotConfig,
) -> EngineResult<WalletBetOutcome> {
    let _guard = ctx.wallet_locks.lock(wallet.id).await;

    // Reload under the lock so a concurrent claim or bet is reflected
    let wallet = match ctx.store.get_wallet(wallet.id).await? {
        Some(w) if w.is_active => w,
        _ => return Ok(WalletBetOutcome::Skipped),
    };

    // A round executed twice must not stake or record the wallet again
    let existing = ctx
        .store
        .query_bets(&BetQuery {
            wallet_address: Some(wallet.address.clone()),
            round_number: Some(round.round_number),
            ..Default::default()
        })
        .await?;
    if existing.iter().any(|b| b.status != BetStatus::Lost) {
        debug!(
            "[Executor] Wallet {} already has a bet in round {}",
            wallet.short_address(),
            round.round_number
        );
        return Ok(WalletBetOutcome::Duplicate);
    }

    let direction = draw_direction(&ctx.dice, up_probability);
    let amount = ctx.dice.uniform_decimal(config.min_bet, config.max_bet, 6);
    let required = amount + ctx.settings.fee_buffer;

    if wallet.balance < required {
        debug!(
            "[Executor] Wallet {} insufficient balance: {} (need {})",
            wallet.short_address(),
            wallet.balance,
            required
        );
        return Ok(WalletBetOutcome::Skipped);
    }

    info!(
        "[Executor] Placing {} bet of {} for wallet {}...",
        direction,
        amount,
        wallet.short_address()
    );

    let record = ctx
        .store
        .insert_bet(&NewBetRecord {
            wallet_address: wallet.address.clone(),
            round_number: round.round_number,
            direction,
            amount,
            bet_offset_seconds: (Utc::now() - round.start_time).num_seconds(),
        })
        .await?;

    let signer = match ctx.keyring.signer_for(&wallet) {
        Ok(signer) => signer,
        Err(e) => {
            let reason = e.to_string();
            ctx.store.mark_bet_lost(record.id, &reason).await?;
            warn!("[Executor] Bet failed: {}... | Error: {}", wallet.short_address(), reason);
            return Ok(WalletBetOutcome::Failed { reason });
        }
    };

    let result = ctx
        .oracle
        .place_bet(&signer, round.round_number, direction, amount)
        .await;

    let tx_id = match result {
        Ok(tx_id) => tx_id,
        Err(e) if e.is_duplicate() => {
            // The ledger holds an earlier stake; this record never settles
            ctx.store.mark_bet_lost(record.id, &e.to_string()).await?;
            info!(
                "[Executor] Bet already processed for {}..., treating as placed",
                wallet.short_address()
            );
            return Ok(WalletBetOutcome::Duplicate);
        }
        Err(e) => {
            let reason = e.to_string();
            ctx.store.mark_bet_lost(record.id, &reason).await?;
            warn!("[Executor] Bet failed: {}... | Error: {}", wallet.short_address(), reason);
            return Ok(WalletBetOutcome::Failed { reason });
        }
    };

    let new_balance = (wallet.balance - amount).round_dp(9);
    ctx.store.update_wallet_balance(wallet.id, new_balance).await?;
    ctx.store.mark_bet_submitted(record.id, &tx_id).await?;
    info!(
        "[Executor] Bet placed: {}... | {} | {} | Tx: {}",
        wallet.short_address(),
        direction,
        amount,
        tx_id
    );
    Ok(WalletBetOutcome::Submitted { tx_id })
}
