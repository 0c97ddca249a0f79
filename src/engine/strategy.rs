//! Direction bias from pool imbalance

use crate::dice::Dice;
use crate::types::{BotConfig, Direction, RoundInfo};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

const FAVORED_PROBABILITY: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BettingStrategy {
    pub favor_up: bool,
    pub up_probability: f64,
    pub current_up_ratio: f64,
    pub target_up_ratio: f64,
    pub total_pool: Decimal,
}

/// UP with probability `up_probability`, otherwise DOWN
pub fn draw_direction(dice: &Dice, up_probability: f64) -> Direction {
    if dice.bernoulli(up_probability) {
        Direction::Up
    } else {
        Direction::Down
    }
}

impl fmt::Display for BettingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Current: UP {:.1}% | DOWN {:.1}% | Target: UP {:.1}% | DOWN {:.1}% | Favoring: {}",
            self.current_up_ratio * 100.0,
            (1.0 - self.current_up_ratio) * 100.0,
            self.target_up_ratio * 100.0,
            (1.0 - self.target_up_ratio) * 100.0,
            if self.favor_up { "UP" } else { "DOWN" }
        )
    }
}

/// Compute the round's direction bias.
///
/// Both sides draw the same target weight from `balance_from..balance_to`, so
/// the target split is always 50/50 and the bot leans toward whichever side
/// is currently under half the pool. A tied pool favors DOWN.
pub fn calculate_strategy(round: &RoundInfo, config: &BotConfig, dice: &Dice) -> BettingStrategy {
    let total_pool = round.total_pool();
    let current_up_ratio = if total_pool > Decimal::ZERO {
        (round.total_up_amount / total_pool).to_f64().unwrap_or(0.5)
    } else {
        0.5
    };
    let current_down_ratio = 1.0 - current_up_ratio;

    let weight = dice.uniform(config.balance_from, config.balance_to);
    let target_up_weight = weight;
    let target_down_weight = weight;
    let total_weight = target_up_weight + target_down_weight;
    let target_up_ratio = if total_weight > 0.0 {
        target_up_weight / total_weight
    } else {
        0.5
    };
    let target_down_ratio = 1.0 - target_up_ratio;

    let up_deficit = target_up_ratio - current_up_ratio;
    let down_deficit = target_down_ratio - current_down_ratio;
    let favor_up = up_deficit > down_deficit;

    BettingStrategy {
        favor_up,
        up_probability: if favor_up {
            FAVORED_PROBABILITY
        } else {
            1.0 - FAVORED_PROBABILITY
        },
        current_up_ratio,
        target_up_ratio,
        total_pool,
    }
}
