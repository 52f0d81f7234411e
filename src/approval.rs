//! Settlement approval decryption.
//!
//! Approvals are encrypted to the user's ed25519 identity. The service
//! generates an ephemeral X25519 keypair, derives the shared secret against
//! the X25519 form of the user's key and seals the approval with AES-256-GCM
//! under `SHA-256(shared_secret)`.
//!
//! Payload layout:
//!
//! ```text
//! | ephemeral public key (32) | nonce (12) | ciphertext (n) | tag (16) |
//! ```

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    Error, Result,
    types::{SettlementApproval, SettlementApprovalMessage},
};

const EPHEMERAL_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = EPHEMERAL_KEY_LEN + NONCE_LEN;

/// Converts an ed25519 signing key into the equivalent X25519 secret.
///
/// This is the clamped lower half of `SHA-512(seed)`, i.e. the scalar ed25519
/// itself signs with, so the matching X25519 public key is the Montgomery form
/// of the ed25519 public key.
pub fn to_x25519_secret(key: &SigningKey) -> [u8; 32] {
    let digest = Sha512::digest(key.to_bytes());

    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&digest[..32]);
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
    scalar
}

/// Decrypts an approval payload addressed to `key`.
///
/// Fails with [`Error::DecryptionFailure`] when the payload is truncated or
/// its authentication tag does not verify.
pub fn decrypt(encrypted: &[u8], key: &SigningKey) -> Result<Vec<u8>> {
    if encrypted.len() < HEADER_LEN {
        return Err(Error::DecryptionFailure(format!(
            "payload too short: {} bytes, header alone is {HEADER_LEN}",
            encrypted.len()
        )));
    }

    let (ephemeral, rest) = encrypted.split_at(EPHEMERAL_KEY_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    if ciphertext.len() < TAG_LEN {
        return Err(Error::DecryptionFailure(format!(
            "ciphertext is {} bytes, shorter than the {TAG_LEN} byte tag",
            ciphertext.len()
        )));
    }

    let mut ephemeral_bytes = [0u8; EPHEMERAL_KEY_LEN];
    ephemeral_bytes.copy_from_slice(ephemeral);

    let secret = StaticSecret::from(to_x25519_secret(key));
    let shared = secret.diffie_hellman(&PublicKey::from(ephemeral_bytes));
    let aes_key = Sha256::digest(shared.as_bytes());

    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&aes_key))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::DecryptionFailure("authentication tag mismatch".into()))
}

/// Decrypts and decodes a settlement approval message.
pub fn decrypt_approval(
    message: &SettlementApprovalMessage,
    key: &SigningKey,
) -> Result<SettlementApproval> {
    let plaintext = decrypt(&message.encrypted_data, key)?;
    Ok(serde_json::from_slice(&plaintext)?)
}
