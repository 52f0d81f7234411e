//! Wire types shared by the HTTP client and the streams.

mod approval;
mod asset;
mod chain_address;
pub mod codec;
mod market;
pub mod orders;
pub mod settlement;

pub use approval::{InnerSettlementApproval, SettlementApproval, SettlementApprovalMessage};
pub use asset::AssetIdentifier;
pub use chain_address::{
    ADDRESS_LEN, CHAIN_LEN, ChainAddress, EVM_ADDRESS_LEN, EVM_ROUTING_ID, RoutedChainId,
};
pub use codec::{ChainId, UserPublicKey};
pub use market::Market;
pub use orders::{
    CancelOrder, CancelOrderRequest, ControlRequest, CreateOrderRequest, MarketQuantity, Order,
    OrderDetails, OrderTrigger, ReplaceOrder, ReplaceOrderRequest, Side, TimeInForce,
    new_order_id,
};
pub use settlement::{
    InnerSettlementRequest, InnerWithdrawalRequest, TxSettlementRequest, WithdrawalRequest,
};
