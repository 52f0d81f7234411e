//! Signed order payloads.
//!
//! The signed part of each request is serialized to compact JSON and signed by
//! the [`User`]; the signature travels next to it as a list of bytes.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{
    Result, User,
    correlation::correlation_key,
    session::now_ns,
    types::{AssetIdentifier, Market, UserPublicKey},
};

/// Generates a fresh order id: the base64 encoding of a random UUID.
pub fn new_order_id() -> String {
    STANDARD.encode(uuid::Uuid::new_v4().as_bytes())
}

/// Conditional order trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTrigger {
    PriceAbove { price: u64 },
    PriceBelow { price: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(alias = "Bid")]
    Buy,
    #[serde(alias = "Ask")]
    Sell,
}

/// How long a limit order rests on the book.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till canceled.
    GTC { post_only: bool },
    /// Good till `good_until_timestamp_ns`.
    GTD {
        post_only: bool,
        good_until_timestamp_ns: i64,
    },
    /// Immediate or cancel.
    IOC,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::GTC { post_only: false }
    }
}

/// Size of a market order, in either side of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketQuantity {
    BaseAsset(u64),
    QuoteAsset(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDetails {
    Limit {
        limit_price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    },
    Market {
        quantity: MarketQuantity,
        fill_or_kill: bool,
    },
}

/// Signed part of an order creation.
///
/// Prices and quantities are book units, see [`Market`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub signer: UserPublicKey,
    pub order_id: String,
    pub base_asset: AssetIdentifier,
    pub book_price_decimals: i8,
    pub book_quantity_decimals: i8,
    pub details: OrderDetails,
    pub side: Side,
    pub trigger: Option<OrderTrigger>,
    pub creation_timestamp_ns: i64,
}

impl Order {
    fn new(signer: UserPublicKey, market: &Market, side: Side, details: OrderDetails) -> Self {
        Self {
            signer,
            order_id: new_order_id(),
            base_asset: market.asset_id,
            book_price_decimals: market.book_price_decimals,
            book_quantity_decimals: market.book_quantity_decimals,
            details,
            side,
            trigger: None,
            creation_timestamp_ns: now_ns(),
        }
    }

    /// A limit order with a fresh id.
    pub fn limit(
        signer: UserPublicKey,
        market: &Market,
        side: Side,
        limit_price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Self {
        let details = OrderDetails::Limit {
            limit_price,
            quantity,
            time_in_force,
        };
        Self::new(signer, market, side, details)
    }

    /// A market order with a fresh id.
    pub fn market(
        signer: UserPublicKey,
        market: &Market,
        side: Side,
        quantity: MarketQuantity,
        fill_or_kill: bool,
    ) -> Self {
        let details = OrderDetails::Market {
            quantity,
            fill_or_kill,
        };
        Self::new(signer, market, side, details)
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = order_id.into();
        self
    }

    pub fn with_trigger(mut self, trigger: OrderTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub order: Order,
    pub signature: Vec<u8>,
    pub post_sign_timestamp: i64,
}

impl CreateOrderRequest {
    pub fn new(user: &User, order: Order) -> Result<Self> {
        let signature = user.sign_json(&order)?;
        Ok(Self {
            order,
            signature,
            post_sign_timestamp: now_ns(),
        })
    }
}

/// Signed part of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: String,
    pub asset_id: AssetIdentifier,
    pub signer: UserPublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub cancel: CancelOrder,
    pub signature: Vec<u8>,
    pub post_sign_timestamp: i64,
}

impl CancelOrderRequest {
    /// Builds and signs a cancel for `order_id`.
    pub fn new(user: &User, order_id: impl Into<String>, asset_id: AssetIdentifier) -> Result<Self> {
        let cancel = CancelOrder {
            order_id: order_id.into(),
            asset_id,
            signer: user.public_key(),
        };
        let signature = user.sign_json(&cancel)?;
        Ok(Self {
            cancel,
            signature,
            post_sign_timestamp: now_ns(),
        })
    }
}

/// Signed part of a replace request. Absent fields keep their current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceOrder {
    pub order_id: String,
    pub timestamp_ns: i64,
    pub new_price_limit: Option<u64>,
    pub new_quantity: Option<u64>,
    pub new_trigger: Option<OrderTrigger>,
    pub book_quantity_decimals: Option<i8>,
    pub book_price_decimals: Option<i8>,
}

impl ReplaceOrder {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            timestamp_ns: now_ns(),
            new_price_limit: None,
            new_quantity: None,
            new_trigger: None,
            book_quantity_decimals: None,
            book_price_decimals: None,
        }
    }

    pub fn with_price(mut self, price: u64) -> Self {
        self.new_price_limit = Some(price);
        self
    }

    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.new_quantity = Some(quantity);
        self
    }

    pub fn with_trigger(mut self, trigger: OrderTrigger) -> Self {
        self.new_trigger = Some(trigger);
        self
    }

    /// Book precision of the market the order rests on.
    pub fn with_book_decimals(mut self, price_decimals: i8, quantity_decimals: i8) -> Self {
        self.book_price_decimals = Some(price_decimals);
        self.book_quantity_decimals = Some(quantity_decimals);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceOrderRequest {
    pub request: ReplaceOrder,
    pub signer: UserPublicKey,
    pub asset_id: AssetIdentifier,
    pub signature: Vec<u8>,
    pub post_sign_timestamp: i64,
}

impl ReplaceOrderRequest {
    pub fn new(user: &User, request: ReplaceOrder, asset_id: AssetIdentifier) -> Result<Self> {
        let signature = user.sign_json(&request)?;
        Ok(Self {
            request,
            signer: user.public_key(),
            asset_id,
            signature,
            post_sign_timestamp: now_ns(),
        })
    }
}

/// Requests accepted on the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::IsVariant)]
pub enum ControlRequest {
    CancelOrderRequest(CancelOrderRequest),
    ReplaceOrderRequest(ReplaceOrderRequest),
}

impl ControlRequest {
    pub fn order_id(&self) -> &str {
        match self {
            ControlRequest::CancelOrderRequest(req) => &req.cancel.order_id,
            ControlRequest::ReplaceOrderRequest(req) => &req.request.order_id,
        }
    }

    /// Key the matching response is correlated under.
    pub fn correlation_key(&self) -> String {
        let kind = match self {
            ControlRequest::CancelOrderRequest(_) => "CancelOrder",
            ControlRequest::ReplaceOrderRequest(_) => "ReplaceOrder",
        };
        correlation_key(kind, self.order_id())
    }
}

impl From<CancelOrderRequest> for ControlRequest {
    fn from(req: CancelOrderRequest) -> Self {
        ControlRequest::CancelOrderRequest(req)
    }
}

impl From<ReplaceOrderRequest> for ControlRequest {
    fn from(req: ReplaceOrderRequest) -> Self {
        ControlRequest::ReplaceOrderRequest(req)
    }
}
