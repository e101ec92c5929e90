//! Exchange rates: external sources, the caching client and its rate limiter.

pub mod assets;
mod client;
mod limiter;
pub mod providers;
mod sources;

use rust_decimal::Decimal;

use crate::error::RateError;

pub use assets::AssetCurrencies;
pub use client::{ExchangeRateClient, RateClientOptions};
pub use limiter::CallLimiter;
pub use sources::{CoinListing, CryptoRateSource, FiatRateSource, FiatRateTable};

/// What price normalization needs from an exchange-rate provider.
#[async_trait::async_trait]
pub trait RateService: Send + Sync {
    /// Value of one unit of `source` expressed in `target`.
    async fn convert_currency(&self, source: &str, target: &str) -> Result<Decimal, RateError>;

    fn is_fiat_symbol_supported(&self, symbol: &str) -> bool;

    /// Currency ticker configured for an asset hash.
    fn asset_currency(&self, asset: &str) -> Result<String, RateError>;
}
