use std::collections::HashMap;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One entry of a crypto source's coin catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinListing {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
}

/// Every rate quoted against one base currency: `1 base = rates[code] code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiatRateTable {
    pub base: String,
    pub rates: HashMap<String, Decimal>,
}

/// Crypto-asset price source (CoinGecko-shaped).
#[async_trait::async_trait]
pub trait CryptoRateSource: Send + Sync {
    async fn coin_list(&self) -> Result<Vec<CoinListing>>;

    /// Price of one `coin_id` in `vs_currency`. Zero when the source has no quote.
    async fn simple_price(&self, coin_id: &str, vs_currency: &str) -> Result<Decimal>;

    fn name(&self) -> &str;
}

/// Fiat/forex rate source (Frankfurter-shaped).
#[async_trait::async_trait]
pub trait FiatRateSource: Send + Sync {
    /// Supported currency codes.
    async fn currencies(&self) -> Result<Vec<String>>;

    async fn latest_rates(&self, base: &str) -> Result<FiatRateTable>;

    fn name(&self) -> &str;
}
