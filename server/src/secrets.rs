//! Token Sealing and Handshake Secrets
//!
//! Provides AES-256-GCM sealing for provider access tokens stored in the
//! database, plus generation and hashing of the opaque state tokens used
//! during the authorization handshake. Access tokens are never stored in
//! plaintext, and state tokens are only stored as SHA-256 hashes.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Sealing errors.
#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Invalid encryption key length (expected 32 bytes, got {0})")]
    InvalidKeyLength(usize),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid sealed data format")]
    InvalidFormat,

    #[error("Hex decoding failed: {0}")]
    HexError(#[from] hex::FromHexError),
}

pub type SecretsResult<T> = Result<T, SecretsError>;

/// Seal a provider access token using AES-256-GCM.
///
/// # Arguments
/// * `token` - The plaintext access token
/// * `key` - 32-byte encryption key
///
/// # Returns
/// Hex-encoded string containing: nonce(12 bytes) || ciphertext || tag(16 bytes)
pub fn seal_token(token: &str, key: &[u8]) -> SecretsResult<String> {
    if key.len() != 32 {
        return Err(SecretsError::InvalidKeyLength(key.len()));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecretsError::EncryptionFailed(e.to_string()))?;

    // Random nonce (12 bytes for GCM)
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, token.as_bytes())
        .map_err(|e| SecretsError::EncryptionFailed(e.to_string()))?;

    // Combine: nonce || ciphertext (which includes the auth tag)
    let mut combined = nonce.to_vec();
    combined.extend_from_slice(&ciphertext);

    Ok(hex::encode(combined))
}

/// Unseal a provider access token sealed with [`seal_token`].
///
/// # Arguments
/// * `sealed` - Hex-encoded string containing: nonce(12 bytes) || ciphertext || tag(16 bytes)
/// * `key` - 32-byte encryption key (same as used for sealing)
pub fn unseal_token(sealed: &str, key: &[u8]) -> SecretsResult<String> {
    if key.len() != 32 {
        return Err(SecretsError::InvalidKeyLength(key.len()));
    }

    let combined = hex::decode(sealed)?;

    // Nonce is the first 12 bytes
    if combined.len() < 12 {
        return Err(SecretsError::InvalidFormat);
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecretsError::DecryptionFailed(e.to_string()))?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| SecretsError::DecryptionFailed(e.to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|e| SecretsError::DecryptionFailed(format!("Invalid UTF-8: {e}")))
}

/// Generate an opaque handshake state token (32 random bytes, hex-encoded).
#[must_use]
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a handshake nonce (32 random bytes, hex-encoded).
#[must_use]
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hash of a state token, hex-encoded. This is what gets persisted;
/// the callback hashes the presented token and compares.
#[must_use]
pub fn hash_state_token(state: &str) -> String {
    hex::encode(Sha256::digest(state.as_bytes()))
}
