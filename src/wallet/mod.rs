//! Wallet pool: key generation, encrypted storage and fund movements

mod encryption;
mod generator;
mod locks;
mod manager;

pub use encryption::{Keyring, KeyringError, SecretKey};
pub use generator::{generate_wallet, signer_address, signer_from_private_key, GeneratedWallet};
pub use locks::WalletLocks;
pub use manager::{calculate_distributions, TransferOutcome, TransferReport, WalletManager};
