//! User identity.
//!
//! A user is an ed25519 keypair. The public key identifies the user to the
//! service and every signed request carries an ed25519 signature over a
//! whitespace-free payload.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::Serialize;

use crate::{Error, Result, types::UserPublicKey};

/// An ed25519 signing identity.
#[derive(Clone)]
pub struct User {
    key: SigningKey,
}

impl User {
    /// Generates a fresh random identity.
    pub fn random() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Loads a user from a 32-byte seed.
    pub fn from_bytes(seed: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| {
            Error::invalid(format!("private key is {} bytes, expected 32", seed.len()))
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    /// Loads a user from a hex-encoded seed, with or without `0x`.
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let bytes = crate::types::codec::decode_hex(private_key)?;
        Self::from_bytes(&bytes)
    }

    /// The signing key, e.g. for decrypting settlement approvals.
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    pub fn public_key(&self) -> UserPublicKey {
        self.key.verifying_key().into()
    }

    /// Signs `payload` after removing spaces, carriage returns and newlines.
    pub fn sign(&self, payload: &str) -> Vec<u8> {
        let compact: String = payload
            .chars()
            .filter(|c| !matches!(c, ' ' | '\r' | '\n'))
            .collect();
        self.key.sign(compact.as_bytes()).to_bytes().to_vec()
    }

    /// Signs the compact JSON encoding of `value`.
    pub fn sign_json<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let payload = serde_json::to_string(value)?;
        Ok(self.sign(&payload))
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<User {}>", self.public_key())
    }
}
