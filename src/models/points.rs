use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AssetId, MarketId};

/// Reserve balances of a market at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketBalancePoint {
    pub market_id: MarketId,
    pub base_balance: Decimal,
    pub quote_balance: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Spot price of a market at one instant.
///
/// `base_price` is meant to be `1 / quote_price`, but both legs are stored and
/// normalized independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPricePoint {
    pub market_id: MarketId,
    pub base_asset: AssetId,
    pub quote_asset: AssetId,
    pub base_price: Decimal,
    pub quote_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl MarketPricePoint {
    /// Cache key shared by every point of the same asset pair.
    pub fn pair_key(&self) -> String {
        format!("{}_{}", self.base_asset, self.quote_asset)
    }
}
