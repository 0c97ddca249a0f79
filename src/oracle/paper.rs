//! Paper ledger - an in-memory prediction market for dry runs and tests
//!
//! Rounds accept one bet per address until their lock time. Settlement is
//! parimutuel: the pool minus the treasury cut is split across the winning
//! side in proportion to stake. A round whose end price equals its lock price
//! has no winner and nothing is claimable.

use super::{OracleError, RoundOracle, TxId};
use crate::dice::Dice;
use crate::types::{ClaimReport, ClaimableRound, Direction, RoundClaim, RoundInfo};
use crate::wallet::signer_address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PaperSettings {
    /// Time from round start to close
    pub round_length: Duration,
    /// Time from round start to lock; bets after this are rejected
    pub lock_after: Duration,
    /// Flat fee charged per transaction
    pub tx_fee: Decimal,
    /// Share of each pool kept by the house, in basis points
    pub treasury_fee_bps: u32,
}

impl PaperSettings {
    /// Rounds of `seconds` that lock at 90% of their length
    pub fn for_round_seconds(seconds: u64) -> Self {
        let seconds = seconds.max(1);
        Self {
            round_length: Duration::from_secs(seconds),
            lock_after: Duration::from_millis(seconds * 900),
            ..Default::default()
        }
    }
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            round_length: Duration::from_secs(300),
            lock_after: Duration::from_secs(270),
            tx_fee: Decimal::new(5, 6),
            treasury_fee_bps: 300,
        }
    }
}

#[derive(Debug, Clone)]
struct PaperBet {
    direction: Direction,
    amount: Decimal,
    claimed: bool,
}

#[derive(Debug)]
struct PaperRound {
    info: RoundInfo,
    bets: HashMap<String, PaperBet>,
    settled: bool,
    winner: Option<Direction>,
    /// Amount split across winners after the treasury cut
    reward_amount: Decimal,
    /// Stake on the winning side
    reward_base: Decimal,
}

impl PaperRound {
    fn reward_for(&self, bet: &PaperBet) -> Decimal {
        if self.reward_base.is_zero() {
            return Decimal::ZERO;
        }
        (bet.amount * self.reward_amount / self.reward_base).round_dp(9)
    }

    fn claimable(&self, address: &str) -> Option<ClaimableRound> {
        let winner = self.winner?;
        let bet = self.bets.get(address)?;
        if !self.settled || bet.claimed || bet.direction != winner {
            return None;
        }
        Some(ClaimableRound {
            round_number: self.info.round_number,
            direction: bet.direction,
            bet_amount: bet.amount,
            estimated_reward: self.reward_for(bet),
        })
    }
}

#[derive(Debug, Default)]
struct Ledger {
    rounds: BTreeMap<u64, PaperRound>,
    current: Option<u64>,
    balances: HashMap<String, Decimal>,
    rejected: HashSet<String>,
    failing_round_queries: u32,
    tx_counter: u64,
    price: Decimal,
}

impl Ledger {
    fn next_tx(&mut self, kind: &str) -> TxId {
        self.tx_counter += 1;
        format!("paper-{}-{}", kind, self.tx_counter)
    }

    fn debit(&mut self, address: &str, amount: Decimal) -> Result<(), OracleError> {
        let balance = self.balances.entry(address.to_string()).or_default();
        if *balance < amount {
            return Err(OracleError::InsufficientFunds);
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&mut self, address: &str, amount: Decimal) {
        *self.balances.entry(address.to_string()).or_default() += amount;
    }
}

fn key(address: &str) -> String {
    address.to_lowercase()
}

/// Simulated ledger implementing [`RoundOracle`]
pub struct PaperOracle {
    settings: PaperSettings,
    dice: Arc<Dice>,
    ledger: Mutex<Ledger>,
}

impl PaperOracle {
    pub fn new(settings: PaperSettings, dice: Arc<Dice>) -> Self {
        Self {
            settings,
            dice,
            ledger: Mutex::new(Ledger {
                price: Decimal::from(100),
                ..Default::default()
            }),
        }
    }

    pub fn settings(&self) -> &PaperSettings {
        &self.settings
    }

    /// Open a new round starting now and make it current
    pub async fn open_next_round(&self) -> u64 {
        self.open_round_at(Utc::now()).await
    }

    /// Open a new round with an explicit start time and make it current
    pub async fn open_round_at(&self, start_time: DateTime<Utc>) -> u64 {
        let mut ledger = self.ledger.lock().await;
        let round_number = ledger.rounds.keys().next_back().map(|n| n + 1).unwrap_or(1);

        let lock_time = start_time + to_chrono(self.settings.lock_after);
        let close_time = start_time + to_chrono(self.settings.round_length);

        ledger.rounds.insert(
            round_number,
            PaperRound {
                info: RoundInfo {
                    round_number,
                    start_time,
                    lock_time,
                    close_time,
                    is_active: true,
                    total_up_amount: Decimal::ZERO,
                    total_down_amount: Decimal::ZERO,
                    lock_price: None,
                    end_price: None,
                },
                bets: HashMap::new(),
                settled: false,
                winner: None,
                reward_amount: Decimal::ZERO,
                reward_base: Decimal::ZERO,
            },
        );
        ledger.current = Some(round_number);

        debug!("[Paper] Opened round {}", round_number);
        round_number
    }

    /// Settle a round with a chosen outcome. `None` settles as a tie.
    pub async fn settle_round(&self, round_number: u64, winner: Option<Direction>) -> bool {
        let mut ledger = self.ledger.lock().await;
        let lock_price = ledger.price;
        let end_price = match winner {
            Some(Direction::Up) => lock_price + Decimal::ONE,
            Some(Direction::Down) => lock_price - Decimal::ONE,
            None => lock_price,
        };
        ledger.price = end_price;
        self.settle_locked(&mut ledger, round_number, lock_price, end_price)
    }

    fn settle_locked(
        &self,
        ledger: &mut Ledger,
        round_number: u64,
        lock_price: Decimal,
        end_price: Decimal,
    ) -> bool {
        let Some(round) = ledger.rounds.get_mut(&round_number) else {
            return false;
        };
        if round.settled {
            return false;
        }

        let winner = if end_price > lock_price {
            Some(Direction::Up)
        } else if end_price < lock_price {
            Some(Direction::Down)
        } else {
            None
        };

        let total = round.info.total_pool();
        let treasury = total * Decimal::from(self.settings.treasury_fee_bps) / Decimal::from(10_000);

        round.settled = true;
        round.winner = winner;
        round.info.is_active = false;
        round.info.lock_price = Some(lock_price);
        round.info.end_price = Some(end_price);
        round.reward_amount = total - treasury;
        round.reward_base = match winner {
            Some(Direction::Up) => round.info.total_up_amount,
            Some(Direction::Down) => round.info.total_down_amount,
            None => Decimal::ZERO,
        };

        info!(
            "[Paper] Round {} settled: {} (pool {})",
            round_number,
            winner.map(|d| d.to_string()).unwrap_or_else(|| "TIE".to_string()),
            total
        );
        true
    }

    /// Credit an address directly
    pub async fn fund(&self, address: &str, amount: Decimal) {
        self.ledger.lock().await.credit(&key(address), amount);
    }

    /// Make every future bet from this address fail
    pub async fn reject_bets_from(&self, address: &str) {
        self.ledger.lock().await.rejected.insert(key(address));
    }

    /// Make the next `count` round queries fail with a network error
    pub async fn fail_next_round_queries(&self, count: u32) {
        self.ledger.lock().await.failing_round_queries = count;
    }

    /// All bets placed in a round, as (address, direction, amount)
    pub async fn bets_in_round(&self, round_number: u64) -> Vec<(String, Direction, Decimal)> {
        let ledger = self.ledger.lock().await;
        ledger
            .rounds
            .get(&round_number)
            .map(|round| {
                round
                    .bets
                    .iter()
                    .map(|(addr, bet)| (addr.clone(), bet.direction, bet.amount))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Advance rounds on wall-clock time until shutdown.
    ///
    /// At each close the current round settles against a random-walk price and
    /// the next round opens.
    pub fn spawn_clock(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "[Paper] Round clock started ({}s rounds)",
                self.settings.round_length.as_secs()
            );
            self.open_next_round().await;

            let mut interval = tokio::time::interval(self.settings.round_length);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.advance().await;
                    }
                    _ = shutdown.changed() => {
                        info!("[Paper] Round clock stopped");
                        break;
                    }
                }
            }
        })
    }

    async fn advance(&self) {
        let move_pct = self.dice.uniform(-0.01, 0.01);
        {
            let mut ledger = self.ledger.lock().await;
            if let Some(current) = ledger.current {
                let lock_price = ledger.price;
                let factor = Decimal::ONE + Decimal::from_f64(move_pct).unwrap_or_default();
                let end_price = (lock_price * factor).round_dp(4);
                ledger.price = end_price;
                self.settle_locked(&mut ledger, current, lock_price, end_price);
            }
        }
        self.open_next_round().await;
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

#[async_trait]
impl RoundOracle for PaperOracle {
    async fn current_round(&self) -> Result<Option<RoundInfo>, OracleError> {
        let mut ledger = self.ledger.lock().await;
        if ledger.failing_round_queries > 0 {
            ledger.failing_round_queries -= 1;
            return Err(OracleError::Network("simulated RPC timeout".to_string()));
        }
        Ok(ledger
            .current
            .and_then(|n| ledger.rounds.get(&n))
            .map(|round| round.info.clone()))
    }

    async fn place_bet(
        &self,
        signer: &PrivateKeySigner,
        round_number: u64,
        direction: Direction,
        amount: Decimal,
    ) -> Result<TxId, OracleError> {
        let address = key(&signer_address(signer));
        let fee = self.settings.tx_fee;
        let mut ledger = self.ledger.lock().await;

        if ledger.rejected.contains(&address) {
            return Err(OracleError::from_message("custom program error: simulated rejection"));
        }
        if amount <= Decimal::ZERO {
            return Err(OracleError::Rejected("bet amount must be positive".to_string()));
        }

        let now = Utc::now();
        let round = ledger.rounds.get(&round_number).ok_or(OracleError::RoundClosed)?;
        if round.settled || !round.info.accepts_bets_at(now) {
            return Err(OracleError::RoundClosed);
        }
        if round.bets.contains_key(&address) {
            return Err(OracleError::AlreadyProcessed);
        }

        ledger.debit(&address, amount + fee)?;

        if let Some(round) = ledger.rounds.get_mut(&round_number) {
            match direction {
                Direction::Up => round.info.total_up_amount += amount,
                Direction::Down => round.info.total_down_amount += amount,
            }
            round.bets.insert(
                address,
                PaperBet {
                    direction,
                    amount,
                    claimed: false,
                },
            );
        }

        Ok(ledger.next_tx("bet"))
    }

    async fn claimable_rounds(
        &self,
        signer: &PrivateKeySigner,
    ) -> Result<Vec<ClaimableRound>, OracleError> {
        let address = key(&signer_address(signer));
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .rounds
            .values()
            .filter_map(|round| round.claimable(&address))
            .collect())
    }

    async fn claim_all_available(
        &self,
        signer: &PrivateKeySigner,
    ) -> Result<ClaimReport, OracleError> {
        let address = key(&signer_address(signer));
        let fee = self.settings.tx_fee;
        let mut ledger = self.ledger.lock().await;

        let claimable: Vec<ClaimableRound> = ledger
            .rounds
            .values()
            .filter_map(|round| round.claimable(&address))
            .collect();

        let mut report = ClaimReport::default();
        for entry in claimable {
            if let Err(err) = ledger.debit(&address, fee) {
                report.failed += 1;
                report.per_round.push(RoundClaim {
                    round_number: entry.round_number,
                    amount: Decimal::ZERO,
                    success: false,
                    tx_id: None,
                    error: Some(err.to_string()),
                });
                continue;
            }

            let reward = entry.estimated_reward;
            if let Some(bet) = ledger
                .rounds
                .get_mut(&entry.round_number)
                .and_then(|round| round.bets.get_mut(&address))
            {
                bet.claimed = true;
            }
            ledger.credit(&address, reward);
            let tx_id = ledger.next_tx("claim");

            report.succeeded += 1;
            report.total_claimed += reward;
            report.per_round.push(RoundClaim {
                round_number: entry.round_number,
                amount: reward,
                success: true,
                tx_id: Some(tx_id),
                error: None,
            });
        }

        Ok(report)
    }

    async fn balance(&self, address: &str) -> Result<Decimal, OracleError> {
        let ledger = self.ledger.lock().await;
        Ok(ledger.balances.get(&key(address)).copied().unwrap_or_default())
    }

    async fn transfer(
        &self,
        signer: &PrivateKeySigner,
        to_address: &str,
        amount: Decimal,
    ) -> Result<TxId, OracleError> {
        if amount <= Decimal::ZERO {
            return Err(OracleError::Rejected("transfer amount must be positive".to_string()));
        }
        let from = key(&signer_address(signer));
        let fee = self.settings.tx_fee;
        let mut ledger = self.ledger.lock().await;

        ledger.debit(&from, amount + fee)?;
        ledger.credit(&key(to_address), amount);
        Ok(ledger.next_tx("transfer"))
    }
}
