//! Fixed-width value codecs.
//!
//! The service speaks several encodings for the same value: plain integers,
//! hex strings (with or without `0x`), raw bytes and JSON byte lists. The types
//! here accept all of them and always serialize to one canonical form.

use std::{fmt, str::FromStr};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, SeqAccess, Visitor},
};

use crate::{Error, Result};

/// Decodes a hex string, tolerating an optional `0x` prefix.
pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    const_hex::decode(s).map_err(|err| Error::invalid(format!("{s:?}: {err}")))
}

/// Left-pads `bytes` with zeros to `N` bytes.
pub(crate) fn pad_left<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    if bytes.len() > N {
        return Err(Error::Overflow(format!(
            "{what} is {} bytes, at most {N} allowed",
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out[N - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

/// A 64-bit chain identifier.
///
/// Accepted as an integer, a decimal string, a hex string or a big-endian byte
/// sequence of at most 8 bytes. Serialized as a plain integer.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    /// Ethereum mainnet.
    pub const ETHEREUM: ChainId = ChainId(1);
    /// Arbitrum One.
    pub const ARBITRUM: ChainId = ChainId(42_161);
    /// Sepolia testnet.
    pub const SEPOLIA: ChainId = ChainId(11_155_111);

    #[inline(always)]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Big-endian bytes.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decodes a big-endian byte sequence of up to 8 bytes.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self> {
        let padded = pad_left::<8>(bytes, "chain id")?;
        Ok(Self(u64::from_be_bytes(padded)))
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl FromStr for ChainId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s == "0x" {
            return Err(Error::invalid(format!("empty chain id {s:?}")));
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u64>()
                .map(Self)
                .map_err(|_| Error::Overflow(format!("chain id {s} exceeds 64 bits")));
        }

        let bytes = decode_hex(s).or_else(|_| {
            // odd-length hex such as "0xaA36A7" is still a valid integer
            let digits = s.strip_prefix("0x").unwrap_or(s);
            decode_hex(&format!("0{digits}"))
        })?;
        Self::from_be_slice(strip_leading_zeros(&bytes))
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChainIdVisitor;

        impl<'de> Visitor<'de> for ChainIdVisitor {
            type Value = ChainId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer, a hex string or a big-endian byte sequence")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ChainId, E> {
                Ok(ChainId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ChainId, E> {
                u64::try_from(v)
                    .map(ChainId)
                    .map_err(|_| E::custom(format!("negative chain id {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ChainId, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<ChainId, E> {
                ChainId::from_be_slice(v).map_err(E::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ChainId, A::Error> {
                let mut bytes = Vec::with_capacity(8);
                while let Some(b) = seq.next_element::<u8>()? {
                    bytes.push(b);
                }
                ChainId::from_be_slice(&bytes).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(ChainIdVisitor)
    }
}

/// A user's 32-byte ed25519 public key.
///
/// Accepted as a hex string (with or without `0x`), raw bytes or a byte list.
/// Shorter inputs are left-padded. Serialized as lower-case hex without prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserPublicKey([u8; 32]);

impl UserPublicKey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        pad_left::<32>(bytes, "public key").map(Self)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex without prefix.
    pub fn to_hex(&self) -> String {
        const_hex::encode(self.0)
    }
}

impl From<[u8; 32]> for UserPublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<ed25519_dalek::VerifyingKey> for UserPublicKey {
    fn from(key: ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl FromStr for UserPublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_slice(&decode_hex(s)?)
    }
}

impl fmt::Display for UserPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for UserPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserPublicKey({})", self.to_hex())
    }
}

impl Serialize for UserPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for UserPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = UserPublicKey;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 32-byte public key as hex or bytes")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<UserPublicKey, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<UserPublicKey, E> {
                UserPublicKey::from_slice(v).map_err(E::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<UserPublicKey, A::Error> {
                let mut bytes = Vec::with_capacity(32);
                while let Some(b) = seq.next_element::<u8>()? {
                    bytes.push(b);
                }
                UserPublicKey::from_slice(&bytes).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

/// Serde adapter for `u128` amounts as `0x`-prefixed hex.
///
/// Deserializes from an integer or a hex string with or without prefix.
pub mod hex_amount {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{amount:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(super::AmountVisitor)
    }
}

/// Like [`hex_amount`] but serializes without the `0x` prefix.
pub mod bare_hex_amount {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{amount:x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(super::AmountVisitor)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an unsigned integer or a hex string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
        Ok(u128::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
        Ok(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
        let digits = v.strip_prefix("0x").unwrap_or(v);
        if digits.is_empty() {
            return Err(E::custom("empty amount"));
        }
        u128::from_str_radix(digits, 16)
            .map_err(|err| E::custom(format!("amount {v:?}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use serde_json::json;

    use super::*;

    const SEPOLIA: u64 = 11155111;

    #[test]
    fn test_chain_id_inputs() {
        let inputs = [
            json!(SEPOLIA),
            json!("11155111"),
            json!("0xaA36A7"),
            json!(SEPOLIA.to_be_bytes()),
            json!([0, 0, 0, 0, 0, 170, 54, 167]),
            json!([170, 54, 167]),
        ];
        for input in inputs {
            let chain: ChainId = serde_json::from_value(input.clone()).unwrap();
            assert_eq!(chain, ChainId::SEPOLIA, "{input}");
            assert_eq!(serde_json::to_string(&chain).unwrap(), "11155111");
        }
    }

    #[test]
    fn test_chain_id_overflow() {
        let err = ChainId::from_be_slice(&[1; 9]).unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));

        let err = "0x010000000000000000".parse::<ChainId>().unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));

        let err = "99999999999999999999".parse::<ChainId>().unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));

        // leading zero bytes don't count against the width
        let chain: ChainId = "0x00000000000000000001".parse().unwrap();
        assert_eq!(chain.get(), 1);
    }

    #[test]
    fn test_chain_id_rejects_garbage() {
        assert!(matches!(
            "arbitrum".parse::<ChainId>(),
            Err(Error::InvalidIdentifier(_))
        ));
        for input in ["", "0x"] {
            assert!(
                matches!(input.parse::<ChainId>(), Err(Error::InvalidIdentifier(_))),
                "{input:?}"
            );
        }
        assert!(serde_json::from_value::<ChainId>(json!("0x")).is_err());
        assert!(serde_json::from_value::<ChainId>(json!(-1)).is_err());
    }

    #[test]
    fn test_hex_amounts() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Amounts {
            #[serde(with = "hex_amount")]
            prefixed: u128,
            #[serde(with = "bare_hex_amount")]
            bare: u128,
        }

        let amounts = Amounts {
            prefixed: 100,
            bare: 100,
        };
        let value = serde_json::to_value(&amounts).unwrap();
        assert_eq!(value, json!({ "prefixed": "0x64", "bare": "64" }));

        let parsed: Amounts =
            serde_json::from_value(json!({ "prefixed": 100, "bare": "0x64" })).unwrap();
        assert_eq!(parsed, amounts);

        for bad in [json!("0x"), json!("zz"), json!(-1)] {
            assert!(
                serde_json::from_value::<Amounts>(json!({ "prefixed": bad, "bare": 1 })).is_err(),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_user_public_key_inputs() {
        let expected = hex!("eb886a56f9f0efa64432678cebf1270e9314a758e6eb697a606202a451e3e82e");
        let inputs = [
            json!("0xeb886a56f9f0efa64432678cebf1270e9314a758e6eb697a606202a451e3e82e"),
            json!("eb886a56f9f0efa64432678cebf1270e9314a758e6eb697a606202a451e3e82e"),
            json!("EB886A56F9F0EFA64432678CEBF1270E9314A758E6EB697A606202A451E3E82E"),
            json!(expected.to_vec()),
        ];
        for input in inputs {
            let key: UserPublicKey = serde_json::from_value(input.clone()).unwrap();
            assert_eq!(key.as_bytes(), &expected, "{input}");
            assert_eq!(
                serde_json::to_value(key).unwrap(),
                json!("eb886a56f9f0efa64432678cebf1270e9314a758e6eb697a606202a451e3e82e")
            );
        }
    }

    #[test]
    fn test_user_public_key_padding_and_overflow() {
        let key: UserPublicKey = "0x01".parse().unwrap();
        let mut expected = [0u8; 32];
        expected[31] = 1;
        assert_eq!(key.as_bytes(), &expected);

        let err = UserPublicKey::from_slice(&[0xff; 33]).unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));

        assert!(matches!(
            "not-a-key".parse::<UserPublicKey>(),
            Err(Error::InvalidIdentifier(_))
        ));
    }
}
