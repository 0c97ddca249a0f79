//! Per-wallet mutation locks
//!
//! Bet submission, claim settlement and fund movements all change a wallet's
//! balance. Holding the wallet's lock for the whole read-modify-write keeps
//! those paths from interleaving on the same wallet.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct WalletLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a wallet
    pub async fn lock(&self, wallet_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(wallet_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
