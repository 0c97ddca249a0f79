//! Auto-Claim Monitor - sweeps wallets for finalized winning rounds and claims them

use super::EngineContext;
use crate::errors::EngineResult;
use crate::oracle::{with_retry, RetryConfig};
use crate::repository::WalletFilter;
use crate::types::{ClaimReport, ClaimSummary, Wallet, WalletClaimable};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Totals for one sweep over all active wallets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepSummary {
    pub wallets_checked: usize,
    pub wallets_claimed: usize,
    pub rounds_claimed: u32,
    pub rounds_failed: u32,
    pub total_claimed: Decimal,
}

pub struct AutoClaimer {
    ctx: Arc<EngineContext>,
    retry: RetryConfig,
}

impl AutoClaimer {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            retry: RetryConfig::default(),
        }
    }

    /// Sweep on a fixed cadence until shutdown. Sweeps only happen while running.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.ctx.settings.claim_interval;
        info!("[Auto-Claim] Monitor started (every {}s)", period.as_secs());

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.ctx.state.is_running() {
                        self.sweep().await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("[Auto-Claim] Monitor stopped");
    }

    /// Check every active wallet once, one wallet at a time
    pub async fn sweep(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let wallets = match self.ctx.store.list_wallets(&WalletFilter::active()).await {
            Ok(wallets) => wallets,
            Err(e) => {
                warn!("[Auto-Claim] Failed to load wallets: {:#}", e);
                return summary;
            }
        };

        for (i, wallet) in wallets.iter().enumerate() {
            if !self.ctx.state.is_running() {
                debug!("[Auto-Claim] Bot no longer running, ending sweep");
                break;
            }
            if i > 0 && !self.ctx.settings.claim_wallet_delay.is_zero() {
                tokio::time::sleep(self.ctx.settings.claim_wallet_delay).await;
            }

            summary.wallets_checked += 1;
            match self.claim_for_wallet(wallet).await {
                Ok(report) => {
                    if report.succeeded > 0 {
                        summary.wallets_claimed += 1;
                    }
                    summary.rounds_claimed += report.succeeded;
                    summary.rounds_failed += report.failed;
                    summary.total_claimed += report.total_claimed;
                }
                Err(e) if e.is_transient() => {
                    debug!("[Auto-Claim] Wallet {} skipped this sweep: {}", wallet.short_address(), e);
                }
                Err(e) => {
                    warn!("[Auto-Claim] Wallet {}: {}", wallet.short_address(), e);
                }
            }
        }

        if summary.rounds_claimed > 0 {
            info!(
                "[Auto-Claim] Sweep claimed {} rounds across {} wallets ({} total)",
                summary.rounds_claimed, summary.wallets_claimed, summary.total_claimed
            );
        }
        summary
    }

    /// Claim every available round for one wallet and settle its records
    pub async fn claim_for_wallet(&self, wallet: &Wallet) -> EngineResult<ClaimReport> {
        let signer = self.ctx.keyring.signer_for(wallet)?;

        let claimable = self.ctx.oracle.claimable_rounds(&signer).await?;
        if claimable.is_empty() {
            return Ok(ClaimReport::default());
        }

        info!(
            "[Auto-Claim] Wallet {} has {} claimable rounds",
            wallet.short_address(),
            claimable.len()
        );

        let _guard = self.ctx.wallet_locks.lock(wallet.id).await;
        let report = self.ctx.oracle.claim_all_available(&signer).await?;

        for failed in report.per_round.iter().filter(|r| !r.success) {
            warn!(
                "[Auto-Claim] Round {} claim failed for {}: {}",
                failed.round_number,
                wallet.short_address(),
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }

        if report.succeeded == 0 {
            return Ok(report);
        }

        match with_retry(&self.retry, "balance", || self.ctx.oracle.balance(&wallet.address)).await {
            Ok(balance) => {
                self.ctx.store.update_wallet_balance(wallet.id, balance).await?;
            }
            Err(e) => {
                warn!(
                    "[Auto-Claim] Balance refresh failed for {}, keeping stored balance: {}",
                    wallet.short_address(),
                    e
                );
            }
        }

        for claimed in report.per_round.iter().filter(|r| r.success) {
            self.ctx
                .store
                .mark_round_won(&wallet.address, claimed.round_number, claimed.amount)
                .await?;
        }

        info!(
            "[Auto-Claim] Claimed {} from {} rounds for {}",
            report.total_claimed,
            report.succeeded,
            wallet.short_address()
        );
        Ok(report)
    }

    /// Claim for one wallet on request. Failures come back in the summary.
    pub async fn manual_claim(&self, wallet_id: i64) -> ClaimSummary {
        let wallet = match self.ctx.store.get_wallet(wallet_id).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => return ClaimSummary::failure(None, format!("Wallet {} not found", wallet_id)),
            Err(e) => return ClaimSummary::failure(None, format!("Failed to load wallet: {:#}", e)),
        };

        match self.claim_for_wallet(&wallet).await {
            Ok(report) if report.succeeded == 0 && report.failed == 0 => ClaimSummary {
                success: true,
                message: "No claimable rounds".to_string(),
                wallet_address: Some(wallet.address),
                rounds_claimed: 0,
                rounds_failed: 0,
                total_claimed: Decimal::ZERO,
            },
            Ok(report) => ClaimSummary {
                success: report.succeeded > 0,
                message: format!(
                    "Claimed {} from {} rounds ({} failed)",
                    report.total_claimed, report.succeeded, report.failed
                ),
                wallet_address: Some(wallet.address),
                rounds_claimed: report.succeeded,
                rounds_failed: report.failed,
                total_claimed: report.total_claimed,
            },
            Err(e) => ClaimSummary::failure(Some(wallet.address), e.to_string()),
        }
    }

    /// Claimable rounds across all active wallets. Per-wallet errors are reported inline.
    pub async fn claimable_summary(&self) -> EngineResult<Vec<WalletClaimable>> {
        let wallets = self.ctx.store.list_wallets(&WalletFilter::active()).await?;
        let mut summary = Vec::with_capacity(wallets.len());

        for wallet in wallets {
            let lookup = match self.ctx.keyring.signer_for(&wallet) {
                Ok(signer) => self
                    .ctx
                    .oracle
                    .claimable_rounds(&signer)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            summary.push(match lookup {
                Ok(rounds) => WalletClaimable {
                    estimated_reward: rounds.iter().map(|r| r.estimated_reward).sum(),
                    wallet_address: wallet.address,
                    rounds,
                    error: None,
                },
                Err(error) => WalletClaimable {
                    wallet_address: wallet.address,
                    rounds: Vec::new(),
                    estimated_reward: Decimal::ZERO,
                    error: Some(error),
                },
            });
        }

        Ok(summary)
    }
}

impl ClaimSummary {
    fn failure(wallet_address: Option<String>, message: String) -> Self {
        Self {
            success: false,
            message,
            wallet_address,
            rounds_claimed: 0,
            rounds_failed: 0,
            total_claimed: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::Harness;
    use crate::oracle::RoundOracle;
    use crate::repository::{BetRecordRepository, WalletRepository};
    use crate::types::{BetQuery, BetStatus, Direction};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_claim_settles_records_and_refreshes_balance() {
        let h = Harness::new().await;
        h.set_running().await;
        let winner = h.funded_wallet(dec!(1)).await;
        let loser = h.funded_wallet(dec!(1)).await;
        let round = h.observe_new_round().await;
        let info = h.round_info(round).await;
        let config = h.config().await;

        h.bet(&winner, &info, Direction::Up, &config).await;
        h.bet(&loser, &info, Direction::Down, &config).await;
        h.oracle.settle_round(round, Some(Direction::Up)).await;

        let summary = h.claimer.sweep().await;
        assert_eq!(summary.wallets_checked, 2);
        assert_eq!(summary.rounds_claimed, 1);
        assert!(summary.total_claimed > Decimal::ZERO);

        let won = h
            .db
            .query_bets(&BetQuery {
                status: Some(BetStatus::Won),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(won.len(), 1);
        assert_eq!(won[0].wallet_address, winner.address);
        assert_eq!(won[0].payout, Some(summary.total_claimed));

        let stored = h.db.get_wallet(winner.id).await.unwrap().unwrap();
        let ledger = h.oracle.balance(&winner.address).await.unwrap();
        assert_eq!(stored.balance, ledger);
    }

    #[tokio::test]
    async fn test_repeated_bet_settles_once() {
        let h = Harness::new().await;
        h.set_running().await;
        h.set_bet_range(dec!(0.1), dec!(0.1)).await;
        let wallet = h.funded_wallet(dec!(1)).await;
        let round = h.observe_new_round().await;
        let info = h.round_info(round).await;
        let config = h.config().await;

        h.bet(&wallet, &info, Direction::Up, &config).await;
        h.bet(&wallet, &info, Direction::Up, &config).await;
        let stored = h.db.get_wallet(wallet.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(0.9));

        h.oracle.settle_round(round, Some(Direction::Up)).await;
        let report = h.claimer.claim_for_wallet(&wallet).await.unwrap();
        assert_eq!(report.succeeded, 1);

        let bets = h
            .db
            .query_bets(&BetQuery {
                wallet_address: Some(wallet.address.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        let payouts: Decimal = bets.iter().filter_map(|b| b.payout).sum();
        assert_eq!(payouts, report.total_claimed);
    }

    #[tokio::test]
    async fn test_second_sweep_claims_nothing() {
        let h = Harness::new().await;
        h.set_running().await;
        let wallet = h.funded_wallet(dec!(1)).await;
        let round = h.observe_new_round().await;
        let info = h.round_info(round).await;
        let config = h.config().await;

        h.bet(&wallet, &info, Direction::Down, &config).await;
        h.oracle.settle_round(round, Some(Direction::Down)).await;

        assert_eq!(h.claimer.sweep().await.rounds_claimed, 1);
        let again = h.claimer.sweep().await;
        assert_eq!(again.rounds_claimed, 0);
        assert_eq!(again.total_claimed, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_sweep_skipped_when_not_running() {
        let h = Harness::new().await;
        h.funded_wallet(dec!(1)).await;
        let summary = h.claimer.sweep().await;
        assert_eq!(summary.wallets_checked, 0);
    }

    #[tokio::test]
    async fn test_manual_claim_never_errors() {
        let h = Harness::new().await;

        let missing = h.claimer.manual_claim(999).await;
        assert!(!missing.success);
        assert!(missing.message.contains("not found"));

        let wallet = h.funded_wallet(dec!(1)).await;
        let nothing = h.claimer.manual_claim(wallet.id).await;
        assert!(nothing.success);
        assert_eq!(nothing.rounds_claimed, 0);

        h.db.insert_wallet("0xbroken", &[1u8; 4]).await.unwrap();
        let broken = h.db.get_wallet_by_address("0xbroken").await.unwrap().unwrap();
        let failed = h.claimer.manual_claim(broken.id).await;
        assert!(!failed.success);
    }

    #[tokio::test]
    async fn test_manual_claim_works_while_stopped() {
        let h = Harness::new().await;
        h.set_running().await;
        let wallet = h.funded_wallet(dec!(1)).await;
        let round = h.observe_new_round().await;
        let info = h.round_info(round).await;
        let config = h.config().await;
        h.bet(&wallet, &info, Direction::Up, &config).await;
        h.oracle.settle_round(round, Some(Direction::Up)).await;
        h.set_status(crate::types::BotStatus::Stopped).await;

        let summary = h.claimer.manual_claim(wallet.id).await;
        assert!(summary.success);
        assert_eq!(summary.rounds_claimed, 1);
    }

    #[tokio::test]
    async fn test_claimable_summary_lists_rewards() {
        let h = Harness::new().await;
        h.set_running().await;
        let wallet = h.funded_wallet(dec!(1)).await;
        h.funded_wallet(dec!(1)).await;
        let round = h.observe_new_round().await;
        let info = h.round_info(round).await;
        let config = h.config().await;
        h.bet(&wallet, &info, Direction::Up, &config).await;
        h.oracle.settle_round(round, Some(Direction::Up)).await;

        let summary = h.claimer.claimable_summary().await.unwrap();
        assert_eq!(summary.len(), 2);
        let entry = summary
            .iter()
            .find(|e| e.wallet_address == wallet.address)
            .unwrap();
        assert_eq!(entry.rounds.len(), 1);
        assert_eq!(entry.rounds[0].round_number, round);
        assert!(entry.estimated_reward > Decimal::ZERO);
    }
}
