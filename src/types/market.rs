use serde::{Deserialize, Serialize};

use crate::types::AssetIdentifier;

/// Order book definition.
///
/// Prices and quantities of orders on the book are integers scaled by the
/// book's decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub asset_id: AssetIdentifier,
    pub book_price_decimals: i8,
    pub book_quantity_decimals: i8,
}
