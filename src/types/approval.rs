//! Settlement approval messages.

use std::fmt;

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, SeqAccess, Visitor},
};

/// Encrypted approval as it arrives on the approvals stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementApprovalMessage {
    /// Opaque reference to the settlement being approved.
    pub reference: serde_json::Value,
    #[serde(deserialize_with = "hex_or_bytes")]
    pub signature: Vec<u8>,
    /// `ephemeral_pk(32) || nonce(12) || ciphertext || tag(16)`.
    #[serde(with = "const_hex")]
    pub encrypted_data: Vec<u8>,
}

/// Decrypted approval authorizing a settler to execute a settlement on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementApproval {
    pub inner: InnerSettlementApproval,
    pub expiry: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerSettlementApproval {
    pub nonce: u64,
    #[serde(deserialize_with = "hex_or_bytes")]
    pub signature: Vec<u8>,
}

impl SettlementApproval {
    #[inline(always)]
    pub fn nonce(&self) -> u64 {
        self.inner.nonce
    }

    #[inline(always)]
    pub fn signature(&self) -> &[u8] {
        &self.inner.signature
    }

    /// Returns true once `now` (same unit as `expiry`) has passed the expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiry
    }
}

/// Accepts bytes as a hex string or as a JSON byte list.
fn hex_or_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("hex string or byte list")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<u8>, E> {
            const_hex::decode(v).map_err(E::custom)
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(64));
            while let Some(b) = seq.next_element::<u8>()? {
                bytes.push(b);
            }
            Ok(bytes)
        }
    }

    deserializer.deserialize_any(BytesVisitor)
}
