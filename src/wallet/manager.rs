//! Wallet pool management: generation, balance sync, funding and collection

use super::encryption::Keyring;
use super::generator::{generate_wallet, signer_address};
use super::locks::WalletLocks;
use crate::dice::Dice;
use crate::errors::{EngineError, EngineResult};
use crate::oracle::{with_retry, RetryConfig, RoundOracle};
use crate::repository::{Store, WalletFilter};
use crate::types::Wallet;
use alloy::signers::local::PrivateKeySigner;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Wallets at or below this balance are not worth collecting
const COLLECT_DUST: Decimal = Decimal::from_parts(1, 0, 0, false, 3);
/// Left behind to pay the collection transfer fee
const COLLECT_FEE_RESERVE: Decimal = Decimal::from_parts(5, 0, 0, false, 6);

/// Outcome of one transfer during distribution or collection
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub wallet_address: String,
    pub amount: Decimal,
    pub tx_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferReport {
    pub transfers: Vec<TransferOutcome>,
    pub total_moved: Decimal,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TransferReport {
    fn record(&mut self, outcome: TransferOutcome) {
        if outcome.error.is_none() {
            self.succeeded += 1;
            self.total_moved += outcome.amount;
        } else {
            self.failed += 1;
        }
        self.transfers.push(outcome);
    }
}

pub struct WalletManager {
    store: Arc<dyn Store>,
    oracle: Arc<dyn RoundOracle>,
    keyring: Keyring,
    dice: Arc<Dice>,
    locks: WalletLocks,
    main_signer: Option<PrivateKeySigner>,
}

impl WalletManager {
    pub fn new(
        store: Arc<dyn Store>,
        oracle: Arc<dyn RoundOracle>,
        keyring: Keyring,
        dice: Arc<Dice>,
        locks: WalletLocks,
        main_signer: Option<PrivateKeySigner>,
    ) -> Self {
        Self {
            store,
            oracle,
            keyring,
            dice,
            locks,
            main_signer,
        }
    }

    fn main_signer(&self) -> EngineResult<&PrivateKeySigner> {
        self.main_signer
            .as_ref()
            .ok_or_else(|| EngineError::precondition("MAIN_WALLET_PRIVATE_KEY is not configured"))
    }

    /// Generate `count` new wallets and store their encrypted keys
    pub async fn generate_wallets(&self, count: usize) -> EngineResult<Vec<Wallet>> {
        if count == 0 {
            return Err(EngineError::precondition("Wallet count must be at least 1"));
        }

        let mut wallets = Vec::with_capacity(count);
        for _ in 0..count {
            let generated = generate_wallet();
            let blob = self.keyring.encrypt(generated.private_key.expose())?;
            let wallet = self.store.insert_wallet(&generated.address, &blob).await?;
            wallets.push(wallet);
        }

        info!("[Wallets] Generated {} wallets", wallets.len());
        Ok(wallets)
    }

    pub async fn list_wallets(&self, active_only: bool) -> EngineResult<Vec<Wallet>> {
        let filter = if active_only {
            WalletFilter::active()
        } else {
            WalletFilter::default()
        };
        Ok(self.store.list_wallets(&filter).await?)
    }

    /// Sync every active wallet's balance from the ledger. Returns the number updated.
    pub async fn refresh_balances(&self) -> EngineResult<usize> {
        let wallets = self.store.list_wallets(&WalletFilter::active()).await?;
        let retry = RetryConfig::default();
        let mut updated = 0;

        for wallet in wallets {
            let _guard = self.locks.lock(wallet.id).await;
            match with_retry(&retry, "balance", || self.oracle.balance(&wallet.address)).await {
                Ok(balance) => {
                    self.store.update_wallet_balance(wallet.id, balance).await?;
                    updated += 1;
                }
                Err(e) => {
                    warn!(
                        "[Wallets] Failed to refresh balance for {}: {}",
                        wallet.short_address(),
                        e
                    );
                }
            }
        }

        info!("[Wallets] Refreshed {} wallet balances", updated);
        Ok(updated)
    }

    /// Fund active wallets from the main wallet with randomized amounts summing to `total`
    pub async fn distribute(
        &self,
        total: Decimal,
        min: Option<Decimal>,
        max: Option<Decimal>,
    ) -> EngineResult<TransferReport> {
        let main = self.main_signer()?;
        let wallets = self.store.list_wallets(&WalletFilter::active()).await?;
        if wallets.is_empty() {
            return Err(EngineError::precondition(
                "No active wallets found. Generate wallets first.",
            ));
        }

        let amounts = calculate_distributions(&self.dice, wallets.len(), total, min, max)
            .map_err(EngineError::InvalidConfig)?;

        info!(
            "[Wallets] Distributing {} to {} wallets",
            total,
            wallets.len()
        );

        let mut report = TransferReport::default();
        for (wallet, amount) in wallets.iter().zip(amounts) {
            let _guard = self.locks.lock(wallet.id).await;

            let outcome = match self.oracle.transfer(main, &wallet.address, amount).await {
                Ok(tx_id) => {
                    let current = self
                        .store
                        .get_wallet(wallet.id)
                        .await?
                        .map(|w| w.balance)
                        .unwrap_or_default();
                    self.store
                        .update_wallet_balance(wallet.id, (current + amount).round_dp(9))
                        .await?;
                    info!("[Wallets] Transferred {} to {}", amount, wallet.short_address());
                    TransferOutcome {
                        wallet_address: wallet.address.clone(),
                        amount,
                        tx_id: Some(tx_id),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("[Wallets] Failed to transfer to {}: {}", wallet.short_address(), e);
                    TransferOutcome {
                        wallet_address: wallet.address.clone(),
                        amount,
                        tx_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.record(outcome);
        }

        Ok(report)
    }

    /// Sweep active wallet balances back to the main wallet.
    ///
    /// With `retire`, each wallet whose funds were moved is deactivated.
    pub async fn collect(&self, retire: bool) -> EngineResult<TransferReport> {
        let main_address = signer_address(self.main_signer()?);
        let wallets = self.store.list_wallets(&WalletFilter::active()).await?;

        info!("[Wallets] Collecting from {} wallets", wallets.len());

        let mut report = TransferReport::default();
        for wallet in wallets {
            let _guard = self.locks.lock(wallet.id).await;

            let balance = match self.oracle.balance(&wallet.address).await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!("[Wallets] Balance check failed for {}: {}", wallet.short_address(), e);
                    report.record(TransferOutcome {
                        wallet_address: wallet.address.clone(),
                        amount: Decimal::ZERO,
                        tx_id: None,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let amount = balance - COLLECT_FEE_RESERVE;
            if balance <= COLLECT_DUST || amount <= Decimal::ZERO {
                report.skipped += 1;
                continue;
            }

            let result = match self.keyring.signer_for(&wallet) {
                Ok(signer) => self
                    .oracle
                    .transfer(&signer, &main_address, amount)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(tx_id) => {
                    self.store.update_wallet_balance(wallet.id, Decimal::ZERO).await?;
                    if retire {
                        self.store.set_wallet_active(wallet.id, false).await?;
                    }
                    info!("[Wallets] Collected {} from {}", amount, wallet.short_address());
                    report.record(TransferOutcome {
                        wallet_address: wallet.address.clone(),
                        amount,
                        tx_id: Some(tx_id),
                        error: None,
                    });
                }
                Err(reason) => {
                    warn!("[Wallets] Failed to collect from {}: {}", wallet.short_address(), reason);
                    report.record(TransferOutcome {
                        wallet_address: wallet.address.clone(),
                        amount,
                        tx_id: None,
                        error: Some(reason),
                    });
                }
            }
        }

        Ok(report)
    }
}

/// Split `total` into `count` random amounts.
///
/// Bounds default to 50% and 150% of an even share. Every wallet but the last
/// draws within `[min, max]` while leaving at least `min` for each remaining
/// wallet. The last wallet takes the remainder, so the amounts always sum to
/// `total`.
pub fn calculate_distributions(
    dice: &Dice,
    count: usize,
    total: Decimal,
    min: Option<Decimal>,
    max: Option<Decimal>,
) -> Result<Vec<Decimal>, String> {
    if count == 0 {
        return Err("no wallets to distribute to".to_string());
    }
    if total <= Decimal::ZERO {
        return Err("total amount must be positive".to_string());
    }

    let n = Decimal::from(count as u64);
    let share = total / n;
    let min = min.unwrap_or(share * Decimal::new(5, 1)).round_dp(9);
    let max = max.unwrap_or(share * Decimal::new(15, 1)).round_dp(9);

    if min <= Decimal::ZERO || min > max {
        return Err(format!("invalid distribution range {}..{}", min, max));
    }
    if min * n > total {
        return Err(format!(
            "total {} cannot give {} wallets at least {} each",
            total, count, min
        ));
    }

    let mut amounts = Vec::with_capacity(count);
    let mut remaining = total;
    for i in 0..count - 1 {
        let still_owed = Decimal::from((count - i - 1) as u64) * min;
        let max_possible = max.min(remaining - still_owed);
        let amount = dice.uniform_decimal(min, max_possible, 9);
        amounts.push(amount);
        remaining -= amount;
    }
    amounts.push(remaining);

    Ok(amounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::oracle::{PaperOracle, PaperSettings};
    use crate::repository::WalletRepository;
    use rust_decimal_macros::dec;

    async fn manager(main: Option<PrivateKeySigner>) -> (WalletManager, Arc<Database>, Arc<PaperOracle>) {
        let dice = Arc::new(Dice::seeded(11));
        let db = Arc::new(Database::in_memory().await.unwrap());
        let oracle = Arc::new(PaperOracle::new(
            PaperSettings {
                tx_fee: dec!(0.000005),
                ..Default::default()
            },
            dice.clone(),
        ));
        let keyring = Keyring::from_secret(Some("test-secret")).unwrap();
        let manager = WalletManager::new(
            db.clone(),
            oracle.clone(),
            keyring,
            dice,
            WalletLocks::new(),
            main,
        );
        (manager, db, oracle)
    }

    #[test]
    fn test_distributions_sum_to_total() {
        let dice = Dice::seeded(3);
        for count in 1..12 {
            let amounts = calculate_distributions(&dice, count, dec!(10), None, None).unwrap();
            assert_eq!(amounts.len(), count);
            assert_eq!(amounts.iter().copied().sum::<Decimal>(), dec!(10));

            let min = (dec!(10) / Decimal::from(count as u64) * dec!(0.5)).round_dp(9);
            assert!(amounts.iter().all(|a| *a >= min));
        }
    }

    #[test]
    fn test_distributions_with_explicit_bounds() {
        let dice = Dice::seeded(4);
        let amounts =
            calculate_distributions(&dice, 4, dec!(2), Some(dec!(0.4)), Some(dec!(0.6))).unwrap();
        assert_eq!(amounts.iter().copied().sum::<Decimal>(), dec!(2));
        for amount in &amounts[..3] {
            assert!(*amount >= dec!(0.4) && *amount <= dec!(0.6));
        }
        assert!(amounts[3] >= dec!(0.4));
    }

    #[test]
    fn test_distributions_reject_impossible_minimum() {
        let dice = Dice::seeded(5);
        assert!(calculate_distributions(&dice, 5, dec!(1), Some(dec!(0.3)), Some(dec!(0.5))).is_err());
        assert!(calculate_distributions(&dice, 0, dec!(1), None, None).is_err());
        assert!(calculate_distributions(&dice, 2, dec!(1), Some(dec!(0.5)), Some(dec!(0.1))).is_err());
    }

    #[tokio::test]
    async fn test_generate_wallets_encrypts_keys() {
        let (manager, db, _) = manager(None).await;
        let keyring = Keyring::from_secret(Some("test-secret")).unwrap();

        let wallets = manager.generate_wallets(3).await.unwrap();
        assert_eq!(wallets.len(), 3);

        let stored = db.list_wallets(&WalletFilter::active()).await.unwrap();
        assert_eq!(stored.len(), 3);
        for wallet in &stored {
            let signer = keyring.signer_for(wallet).unwrap();
            assert_eq!(signer_address(&signer), wallet.address);
        }
    }

    #[tokio::test]
    async fn test_distribute_requires_main_wallet() {
        let (manager, _, _) = manager(None).await;
        manager.generate_wallets(1).await.unwrap();
        let err = manager.distribute(dec!(1), None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_distribute_then_collect_and_retire() {
        let main = PrivateKeySigner::random();
        let main_address = signer_address(&main);
        let (manager, db, oracle) = manager(Some(main)).await;
        oracle.fund(&main_address, dec!(5)).await;

        manager.generate_wallets(3).await.unwrap();
        let report = manager.distribute(dec!(3), None, None).await.unwrap();
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.total_moved, dec!(3));

        let wallets = db.list_wallets(&WalletFilter::active()).await.unwrap();
        let stored_total: Decimal = wallets.iter().map(|w| w.balance).sum();
        assert_eq!(stored_total, dec!(3));

        assert_eq!(manager.refresh_balances().await.unwrap(), 3);

        let collected = manager.collect(true).await.unwrap();
        assert_eq!(collected.succeeded, 3);
        assert!(db.list_wallets(&WalletFilter::active()).await.unwrap().is_empty());

        for wallet in db.list_wallets(&WalletFilter::default()).await.unwrap() {
            assert_eq!(wallet.balance, Decimal::ZERO);
            assert_eq!(oracle.balance(&wallet.address).await.unwrap(), Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn test_collect_skips_dust() {
        let main = PrivateKeySigner::random();
        let (manager, db, oracle) = manager(Some(main)).await;
        let wallets = manager.generate_wallets(1).await.unwrap();
        oracle.fund(&wallets[0].address, dec!(0.0005)).await;

        let report = manager.collect(true).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(db.list_wallets(&WalletFilter::active()).await.unwrap().len(), 1);
    }
}
