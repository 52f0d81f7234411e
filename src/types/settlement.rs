//! Signed clearing-engine requests: atomic settlements and withdrawals.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    Result, User,
    types::{
        AssetIdentifier, ChainId, UserPublicKey,
        codec::{bare_hex_amount, hex_amount},
    },
};

/// Swap the settler asks the clearing engine to approve.
///
/// Amounts are in inventory units, see [`crate::decimals`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerSettlementRequest {
    /// The settler.
    pub tplus_user: UserPublicKey,
    pub asset_in: AssetIdentifier,
    #[serde(with = "hex_amount")]
    pub amount_in: u128,
    pub asset_out: AssetIdentifier,
    #[serde(with = "hex_amount")]
    pub amount_out: u128,
    /// Chain the settlement executes on.
    pub chain_id: ChainId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSettlementRequest {
    pub inner: InnerSettlementRequest,
    pub signature: Vec<u8>,
}

impl TxSettlementRequest {
    pub fn new(user: &User, inner: InnerSettlementRequest) -> Result<Self> {
        let signature = user.sign_json(&inner)?;
        Ok(Self { inner, signature })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerWithdrawalRequest {
    pub tplus_user: UserPublicKey,
    pub asset: AssetIdentifier,
    #[serde(with = "bare_hex_amount")]
    pub amount: u128,
    /// Recipient, as `0x`-prefixed lower-case hex.
    pub target: String,
    pub chain_id: ChainId,
}

impl InnerWithdrawalRequest {
    pub fn new(
        tplus_user: UserPublicKey,
        asset: AssetIdentifier,
        amount: u128,
        target: Address,
        chain_id: ChainId,
    ) -> Self {
        Self {
            tplus_user,
            asset,
            amount,
            target: const_hex::encode_prefixed(target.as_slice()),
            chain_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub inner: InnerWithdrawalRequest,
    pub signature: Vec<u8>,
}

impl WithdrawalRequest {
    pub fn new(user: &User, inner: InnerWithdrawalRequest) -> Result<Self> {
        let signature = user.sign_json(&inner)?;
        Ok(Self { inner, signature })
    }
}
