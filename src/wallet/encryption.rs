//! Private key encryption using AES-256-GCM with Argon2id key derivation
//!
//! The 32-byte key is derived once from the process secret (`ENCRYPTION_KEY`).
//! A 64-character hex secret is taken as the raw key. Anything else goes
//! through Argon2id with a fixed domain salt. Each ciphertext carries its own
//! random nonce: `nonce (12 bytes) || ciphertext`.

use crate::types::Wallet;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use alloy::signers::local::PrivateKeySigner;
use argon2::Argon2;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const DOMAIN_SALT: &[u8] = b"predictor-bot/wallet-keyring/v1";

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("ENCRYPTION_KEY is not configured")]
    MissingSecret,
    #[error("Failed to derive key: {0}")]
    Derivation(String),
    #[error("Encryption failed")]
    Encryption,
    #[error("Encrypted key is malformed")]
    Malformed,
    #[error("Decryption failed - wrong ENCRYPTION_KEY or corrupted data")]
    Decryption,
    #[error("Invalid private key: {0}")]
    InvalidKey(String),
}

/// Decrypted private key material. Never printed.
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// The key as text, for hex-encoded signer keys
    pub fn as_str(&self) -> Result<&str, KeyringError> {
        std::str::from_utf8(&self.0).map_err(|_| KeyringError::Malformed)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Encrypts and decrypts wallet keys with a process-wide secret
#[derive(Clone)]
pub struct Keyring {
    key: Option<[u8; 32]>,
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("configured", &self.key.is_some())
            .finish()
    }
}

impl Keyring {
    /// Build from the process secret. A missing secret is only an error once a key is needed.
    pub fn from_secret(secret: Option<&str>) -> Result<Self, KeyringError> {
        let key = match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => Some(derive_key(secret)?),
            None => None,
        };
        Ok(Self { key })
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    fn cipher(&self) -> Result<Aes256Gcm, KeyringError> {
        let key_bytes = self.key.as_ref().ok_or(KeyringError::MissingSecret)?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes)))
    }

    /// Encrypt secret bytes, returning `nonce || ciphertext`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| KeyringError::Encryption)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`Keyring::encrypt`]
    pub fn decrypt(&self, blob: &[u8]) -> Result<SecretKey, KeyringError> {
        let cipher = self.cipher()?;

        if blob.len() <= NONCE_LEN {
            return Err(KeyringError::Malformed);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| KeyringError::Decryption)?;

        Ok(SecretKey::new(plaintext))
    }

    /// Decrypt a wallet's key and build a signer for it
    pub fn signer_for(&self, wallet: &Wallet) -> Result<PrivateKeySigner, KeyringError> {
        let secret = self.decrypt(&wallet.encrypted_private_key)?;
        secret
            .as_str()?
            .parse::<PrivateKeySigner>()
            .map_err(|e| KeyringError::InvalidKey(e.to_string()))
    }
}

fn derive_key(secret: &str) -> Result<[u8; 32], KeyringError> {
    let mut key_bytes = [0u8; 32];

    let hex_part = secret.strip_prefix("0x").unwrap_or(secret);
    if hex_part.len() == 64 {
        if let Ok(raw) = hex::decode(hex_part) {
            key_bytes.copy_from_slice(&raw);
            return Ok(key_bytes);
        }
    }

    Argon2::default()
        .hash_password_into(secret.as_bytes(), DOMAIN_SALT, &mut key_bytes)
        .map_err(|e| KeyringError::Derivation(e.to_string()))?;
    Ok(key_bytes)
}
