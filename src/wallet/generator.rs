//! Wallet generation using alloy

use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};

use super::encryption::SecretKey;

/// A freshly generated keypair. The key is encrypted before it is stored.
#[derive(Debug)]
pub struct GeneratedWallet {
    /// 0x-prefixed address
    pub address: String,
    pub private_key: SecretKey,
}

/// Generate a new random wallet
pub fn generate_wallet() -> GeneratedWallet {
    let signer = PrivateKeySigner::random();

    let address = signer_address(&signer);
    let private_key = SecretKey::new(format!("0x{}", hex::encode(signer.to_bytes())));

    GeneratedWallet {
        address,
        private_key,
    }
}

/// Address string for a signer, as stored in the wallets table
pub fn signer_address(signer: &PrivateKeySigner) -> String {
    format!("{:?}", signer.address())
}

/// Parse a private key into a signer
pub fn signer_from_private_key(private_key: &str) -> Result<PrivateKeySigner> {
    private_key
        .trim()
        .parse()
        .context("Failed to parse private key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_wallet() {
        let wallet = generate_wallet();

        // Address should start with 0x and be 42 chars
        assert!(wallet.address.starts_with("0x"));
        assert_eq!(wallet.address.len(), 42);

        // 0x + 64 hex chars
        assert!(wallet.private_key.expose().starts_with(b"0x"));
        assert_eq!(wallet.private_key.expose().len(), 66);
    }

    #[test]
    fn test_signer_round_trips_address() {
        let wallet = generate_wallet();
        let signer = signer_from_private_key(wallet.private_key.as_str().unwrap()).unwrap();

        assert_eq!(signer_address(&signer), wallet.address);
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(signer_from_private_key("not-a-key").is_err());
    }
}
