//! Chain-qualified addresses.
//!
//! A [`ChainAddress`] pins a 32-byte address to a 9-byte chain identifier made
//! of a 1-byte routing id and an 8-byte VM id. Its canonical string form is
//! `hex(address)@hex(chain)`, lower-case and fully padded:
//!
//! ```text
//! 62622e77d1349face943c6e7d5c01c61465fe1dc000000000000000000000000@000000000000aa36a7
//! ```

use std::{fmt, str::FromStr};

use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

use super::codec::{ChainId, decode_hex, pad_left};
use crate::{Error, Result};

/// Width of the address part in bytes.
pub const ADDRESS_LEN: usize = 32;
/// Width of the chain part in bytes.
pub const CHAIN_LEN: usize = 9;
/// Width of an EVM address.
pub const EVM_ADDRESS_LEN: usize = 20;

/// Routing id used for EVM chains.
pub const EVM_ROUTING_ID: u8 = 0;

/// The 9-byte chain part: routing id followed by the big-endian VM id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutedChainId {
    pub routing_id: u8,
    pub vm_id: ChainId,
}

impl RoutedChainId {
    pub const fn new(routing_id: u8, vm_id: ChainId) -> Self {
        Self { routing_id, vm_id }
    }

    /// A chain on the EVM routing family.
    pub const fn evm(vm_id: ChainId) -> Self {
        Self::new(EVM_ROUTING_ID, vm_id)
    }

    pub fn from_bytes(bytes: [u8; CHAIN_LEN]) -> Self {
        let mut vm = [0u8; 8];
        vm.copy_from_slice(&bytes[1..]);
        Self {
            routing_id: bytes[0],
            vm_id: ChainId::new(u64::from_be_bytes(vm)),
        }
    }

    /// Decodes up to 9 bytes, left-padding shorter inputs.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let padded = pad_left::<CHAIN_LEN>(bytes, "chain")
            .map_err(|err| Error::invalid(err.to_string()))?;
        Ok(Self::from_bytes(padded))
    }

    pub fn to_bytes(self) -> [u8; CHAIN_LEN] {
        let mut out = [0u8; CHAIN_LEN];
        out[0] = self.routing_id;
        out[1..].copy_from_slice(&self.vm_id.to_be_bytes());
        out
    }
}

impl From<ChainId> for RoutedChainId {
    fn from(vm_id: ChainId) -> Self {
        Self::evm(vm_id)
    }
}

impl FromStr for RoutedChainId {
    type Err = Error;

    /// Parses the chain part of a chain address: exactly 18 hex characters.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != CHAIN_LEN * 2 {
            return Err(Error::invalid(format!(
                "chain {s:?} must contain 1 byte routing id and 8 bytes VM id ({} hex chars)",
                CHAIN_LEN * 2
            )));
        }
        Self::from_slice(&decode_hex(digits)?)
    }
}

impl fmt::Display for RoutedChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&const_hex::encode(self.to_bytes()))
    }
}

/// An address on a specific chain (assets, vaults).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainAddress {
    address: [u8; ADDRESS_LEN],
    chain: RoutedChainId,
}

impl ChainAddress {
    pub const fn new(address: [u8; ADDRESS_LEN], chain: RoutedChainId) -> Self {
        Self { address, chain }
    }

    /// Builds a chain address from an EVM address, right-padding it to 32 bytes.
    pub fn from_evm_address(address: Address, chain: impl Into<RoutedChainId>) -> Self {
        let mut padded = [0u8; ADDRESS_LEN];
        padded[..EVM_ADDRESS_LEN].copy_from_slice(address.as_slice());
        Self::new(padded, chain.into())
    }

    /// Builds a chain address from raw address bytes (at most 32, right-padded)
    /// and raw chain bytes (at most 9, left-padded).
    pub fn from_parts(address: &[u8], chain: &[u8]) -> Result<Self> {
        Ok(Self::new(pad_address(address)?, RoutedChainId::from_slice(chain)?))
    }

    /// The padded 32-byte address.
    pub const fn address(&self) -> &[u8; ADDRESS_LEN] {
        &self.address
    }

    /// The 9-byte chain part.
    pub const fn chain(&self) -> RoutedChainId {
        self.chain
    }

    /// The VM chain id.
    pub const fn chain_id(&self) -> ChainId {
        self.chain.vm_id
    }

    /// First 20 bytes of the address as an EVM address.
    ///
    /// Its `Display` impl is EIP-55 checksummed.
    pub fn evm_address(&self) -> Address {
        Address::from_slice(&self.address[..EVM_ADDRESS_LEN])
    }

    /// Returns true if `raw` (20 or 32 bytes) equals this address once padded.
    pub fn contains_address(&self, raw: &[u8]) -> bool {
        if raw.len() != EVM_ADDRESS_LEN && raw.len() != ADDRESS_LEN {
            return false;
        }
        pad_address(raw).is_ok_and(|padded| padded == self.address)
    }

    /// Returns true if this address lives on `chain`.
    pub fn is_on_chain(&self, chain: ChainId) -> bool {
        self.chain.vm_id == chain
    }

    /// Structured backend form: `{"address": [..], "chain": [..]}`.
    pub fn to_structured(&self) -> Value {
        json!({
            "address": self.address.to_vec(),
            "chain": self.chain.to_bytes().to_vec(),
        })
    }

    /// Parses any accepted input shape.
    ///
    /// Arms are tried in order:
    /// 1. a `address@chain` string,
    /// 2. `{"Address": <string or structured>}`,
    /// 3. a structured `{"address": [..], "chain": [..]}` object.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => s.parse(),
            Value::Object(map) if map.contains_key("Address") => match &map["Address"] {
                Value::String(s) => s.parse(),
                inner @ Value::Object(_) => Self::from_structured(inner),
                other => Err(Error::invalid(format!("invalid Address field: {other}"))),
            },
            Value::Object(map) if map.contains_key("address") && map.contains_key("chain") => {
                Self::from_structured(value)
            }
            other => Err(Error::invalid(format!("not a chain address: {other}"))),
        }
    }

    fn from_structured(value: &Value) -> Result<Self> {
        let address = byte_list(&value["address"], "address")?;
        let chain = byte_list(&value["chain"], "chain")?;
        Self::from_parts(&address, &chain)
    }
}

fn pad_address(raw: &[u8]) -> Result<[u8; ADDRESS_LEN]> {
    if raw.len() > ADDRESS_LEN {
        return Err(Error::invalid(format!(
            "address is {} bytes, at most {ADDRESS_LEN} allowed",
            raw.len()
        )));
    }
    let mut out = [0u8; ADDRESS_LEN];
    out[..raw.len()].copy_from_slice(raw);
    Ok(out)
}

/// Reads a JSON list of bytes.
pub(crate) fn byte_list(value: &Value, field: &str) -> Result<Vec<u8>> {
    let Some(items) = value.as_array() else {
        return Err(Error::invalid(format!("{field} must be a byte list")));
    };
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| Error::invalid(format!("{field} contains non-byte {item}")))
        })
        .collect()
}

impl FromStr for ChainAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((address, chain)) = s.split_once('@') else {
            return Err(Error::invalid(format!(
                "{s:?} has no chain part, expected <address>@<chain>"
            )));
        };

        let address = address.strip_prefix("0x").unwrap_or(address);
        if address.is_empty() {
            return Err(Error::invalid(format!("{s:?} has an empty address")));
        }

        let chain: RoutedChainId = chain.parse()?;
        Ok(Self::new(pad_address(&decode_hex(address)?)?, chain))
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", const_hex::encode(self.address), self.chain)
    }
}

impl fmt::Debug for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainAddress({self})")
    }
}

impl Serialize for ChainAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}
