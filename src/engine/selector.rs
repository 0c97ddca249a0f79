//! Per-round wallet selection

use crate::dice::Dice;
use crate::repository::{Store, WalletFilter};
use crate::types::{BotConfig, Wallet};
use anyhow::Result;
use rust_decimal::Decimal;

/// Minimum balance for a wallet to take part in a round
pub fn eligibility_threshold(config: &BotConfig, fee_buffer: Decimal) -> Decimal {
    config.min_bet + fee_buffer
}

/// Load eligible wallets and pick a random subset for the round
pub async fn select_wallets(
    store: &dyn Store,
    dice: &Dice,
    config: &BotConfig,
    fee_buffer: Decimal,
) -> Result<Vec<Wallet>> {
    let filter = WalletFilter {
        active: Some(true),
        min_balance: Some(eligibility_threshold(config, fee_buffer)),
    };
    let wallets = store.list_wallets(&filter).await?;
    Ok(pick_wallets(wallets, dice, config, fee_buffer))
}

/// Draw `floor(uniform(wallet_count_from, wallet_count_to))` eligible wallets without replacement
pub fn pick_wallets(
    wallets: Vec<Wallet>,
    dice: &Dice,
    config: &BotConfig,
    fee_buffer: Decimal,
) -> Vec<Wallet> {
    let threshold = eligibility_threshold(config, fee_buffer);
    let mut eligible: Vec<Wallet> = wallets
        .into_iter()
        .filter(|w| w.is_active && w.balance >= threshold)
        .collect();

    if eligible.is_empty() {
        return eligible;
    }

    let drawn = dice
        .uniform(config.wallet_count_from as f64, config.wallet_count_to as f64)
        .floor() as usize;
    let count = drawn.min(eligible.len());

    dice.shuffle(&mut eligible);
    eligible.truncate(count);
    eligible
}
