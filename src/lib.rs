//! Predictor Bot Library
//!
//! Automated multi-wallet betting on recurring up/down prediction rounds:
//!
//! 1. **Round detection**: poll the ledger and schedule each new round once,
//!    after a randomized delay inside the configured window.
//!
//! 2. **Fan-out betting**: pick a random subset of funded wallets and bet from
//!    each, biasing direction toward the lighter side of the pool.
//!
//! 3. **Auto-claim**: sweep wallets for finalized winning rounds and claim them.

pub mod config;
pub mod db;
pub mod dice;
pub mod engine;
pub mod errors;
pub mod oracle;
pub mod repository;
pub mod types;
pub mod wallet;

pub use config::{Config, EngineSettings};
pub use db::Database;
pub use dice::Dice;
pub use engine::{BotController, ControlResponse, EngineContext};
pub use errors::{EngineError, EngineResult};
pub use oracle::{OracleError, PaperOracle, PaperSettings, RoundOracle};
pub use types::{BetRecord, BotConfig, BotConfigUpdate, BotStatus, Direction, RoundInfo, Wallet};
pub use wallet::{Keyring, WalletManager};
