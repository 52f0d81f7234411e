use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

use super::chain_address::ChainAddress;
use crate::{Error, Result};

/// Identifies an asset either by registry index or by its chain address.
///
/// The shape of the input decides the variant: pure numbers are indices,
/// anything carrying an `@` or structured address fields is an address.
/// Both variants serialize to their canonical string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::IsVariant)]
pub enum AssetIdentifier {
    Index(u64),
    Address(ChainAddress),
}

impl AssetIdentifier {
    /// Parses any accepted input shape.
    ///
    /// Arms are mutually exclusive and tried in order:
    /// 1. a JSON integer is an index,
    /// 2. a string goes through [`FromStr`],
    /// 3. `{"Index": n}` is an index,
    /// 4. `{"Address": ..}` is a chain address,
    /// 5. anything else is rejected.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(Self::Index)
                .ok_or_else(|| Error::invalid(format!("index must be a non-negative integer: {n}"))),
            Value::String(s) => s.parse(),
            Value::Object(map) if map.contains_key("Index") => match &map["Index"] {
                Value::Number(_) | Value::String(_) => match Self::from_value(&map["Index"])? {
                    index @ Self::Index(_) => Ok(index),
                    Self::Address(_) => Err(Error::invalid("Index holds an address")),
                },
                other => Err(Error::invalid(format!("invalid Index field: {other}"))),
            },
            Value::Object(map) if map.contains_key("Address") => {
                ChainAddress::from_value(value).map(Self::Address)
            }
            other => Err(Error::invalid(format!(
                "asset identifier must have an Index or an Address: {other}"
            ))),
        }
    }

    pub fn index(&self) -> Option<u64> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Address(_) => None,
        }
    }

    pub fn chain_address(&self) -> Option<&ChainAddress> {
        match self {
            Self::Index(_) => None,
            Self::Address(addr) => Some(addr),
        }
    }

    /// Structured backend form: `{"Index": n}` or `{"Address": {..}}`.
    pub fn to_structured(&self) -> Value {
        match self {
            Self::Index(index) => json!({ "Index": index }),
            Self::Address(addr) => json!({ "Address": addr.to_structured() }),
        }
    }
}

impl From<u64> for AssetIdentifier {
    fn from(index: u64) -> Self {
        Self::Index(index)
    }
}

impl From<ChainAddress> for AssetIdentifier {
    fn from(addr: ChainAddress) -> Self {
        Self::Address(addr)
    }
}

impl FromStr for AssetIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(Self::Index)
                .map_err(|_| Error::invalid(format!("index {s} exceeds 64 bits")));
        }

        if s.contains('@') {
            return s.parse().map(Self::Address);
        }

        let digits = s.strip_prefix("0x").unwrap_or(s);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::invalid(format!(
                "{s:?} looks like an address but has no chain part, expected <address>@<chain>"
            )));
        }

        Err(Error::invalid(format!("{s:?} is neither an index nor a chain address")))
    }
}

impl fmt::Display for AssetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Address(addr) => write!(f, "{addr}"),
        }
    }
}

impl Serialize for AssetIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str =
        "62622e77d1349face943c6e7d5c01c61465fe1dc000000000000000000000000@00000000000000a4b1";

    #[test]
    fn test_index_forms_agree() {
        let from_str: AssetIdentifier = "1".parse().unwrap();
        let from_int = AssetIdentifier::from_value(&json!(1)).unwrap();
        let from_dict = AssetIdentifier::from_value(&json!({ "Index": 1 })).unwrap();

        assert_eq!(from_str, AssetIdentifier::Index(1));
        assert_eq!(from_str, from_int);
        assert_eq!(from_str, from_dict);
        assert!(from_str.is_index());
        assert_eq!(from_str.to_string(), "1");
        assert_eq!(AssetIdentifier::from(0).to_string(), "0");
    }

    #[test]
    fn test_address_forms_agree() {
        let inputs = [
            CANONICAL,
            "62622E77D1349Face943C6e7D5c01C61465FE1dc@00000000000000a4b1",
            "0x62622e77d1349face943c6e7d5c01c61465fe1dc@0x00000000000000a4b1",
        ];
        for input in inputs {
            let asset: AssetIdentifier = input.parse().unwrap();
            assert!(asset.is_address(), "{input}");
            assert_eq!(asset.to_string(), CANONICAL);
            assert_eq!(serde_json::to_value(asset).unwrap(), json!(CANONICAL));
        }

        let structured = AssetIdentifier::from_value(&json!({
            "Address": {
                "address": const_hex::decode("62622e77d1349face943c6e7d5c01c61465fe1dc").unwrap(),
                "chain": [0xa4, 0xb1],
            }
        }))
        .unwrap();
        assert_eq!(structured.to_string(), CANONICAL);
        assert_eq!(
            AssetIdentifier::from_value(&structured.to_structured()).unwrap(),
            structured
        );
    }

    #[test]
    fn test_rejects_address_without_chain() {
        for input in [
            "62622e77d1349face943c6e7d5c01c61465fe1dc",
            "0x62622E77D1349Face943C6e7D5c01C61465FE1dc",
        ] {
            let err = input.parse::<AssetIdentifier>().unwrap_err();
            assert!(matches!(err, Error::InvalidIdentifier(_)), "{input}");
        }
    }

    #[test]
    fn test_rejects_words_and_junk() {
        for input in ["usdc", "", "-1", "1.5"] {
            assert!(
                matches!(
                    input.parse::<AssetIdentifier>(),
                    Err(Error::InvalidIdentifier(_))
                ),
                "{input:?}"
            );
        }
        for value in [json!(-1), json!(null), json!([1, 2]), json!({ "Other": 1 })] {
            assert!(AssetIdentifier::from_value(&value).is_err(), "{value}");
        }
    }

    #[test]
    fn test_deserialize() {
        #[derive(Deserialize)]
        struct Market {
            asset_id: AssetIdentifier,
        }

        let market: Market = serde_json::from_value(json!({ "asset_id": { "Index": 7 } })).unwrap();
        assert_eq!(market.asset_id, AssetIdentifier::Index(7));

        let market: Market = serde_json::from_value(json!({ "asset_id": CANONICAL })).unwrap();
        assert_eq!(market.asset_id.to_string(), CANONICAL);
    }
}
