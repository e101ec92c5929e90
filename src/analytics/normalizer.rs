use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RateError;
use crate::models::MarketPricePoint;
use crate::rates::RateService;

/// Both legs of a price point expressed in the reference currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferencePrices {
    pub base: Decimal,
    pub quote: Decimal,
}

impl ReferencePrices {
    fn both_known(&self) -> bool {
        !self.base.is_zero() && !self.quote.is_zero()
    }
}

/// How an asset pair is tied to the reference currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// Base ticker is fiat; rate is base ticker -> reference.
    Base(Decimal),
    /// Quote ticker is fiat; rate is quote ticker -> reference.
    Quote(Decimal),
    /// No fiat leg; each ticker converted on its own.
    Independent { base: Decimal, quote: Decimal },
}

impl Anchor {
    fn apply(&self, point: &MarketPricePoint) -> ReferencePrices {
        let (base, quote) = match *self {
            Anchor::Base(rate) => {
                let base = rate * point.base_price;
                (base, base * point.quote_price)
            }
            Anchor::Quote(rate) => {
                let quote = rate * point.quote_price;
                (quote * point.base_price, quote)
            }
            Anchor::Independent { base, quote } => (base, quote),
        };
        ReferencePrices {
            base: round_price(base),
            quote: round_price(quote),
        }
    }
}

fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Request-scoped price normalizer.
///
/// Resolved anchors are cached per `base_quote` pair for the lifetime of the
/// normalizer, so a pair recurring across buckets costs one set of lookups.
pub struct PriceNormalizer {
    rates: Arc<dyn RateService>,
    reference_currency: String,
    cache: HashMap<String, Anchor>,
}

impl PriceNormalizer {
    pub fn new(rates: Arc<dyn RateService>, reference_currency: impl Into<String>) -> Self {
        Self {
            rates,
            reference_currency: reference_currency.into().to_lowercase(),
            cache: HashMap::new(),
        }
    }

    /// Normalizes one point. Any resolution failure yields zero reference prices.
    pub async fn normalize(&mut self, point: &MarketPricePoint) -> ReferencePrices {
        let key = point.pair_key();
        if let Some(anchor) = self.cache.get(&key) {
            return anchor.apply(point);
        }

        match self.resolve_anchor(point).await {
            Ok(anchor) => {
                let prices = anchor.apply(point);
                if prices.both_known() {
                    self.cache.insert(key, anchor);
                }
                prices
            }
            Err(err) => {
                warn!(
                    market_id = %point.market_id,
                    base_asset = %point.base_asset,
                    quote_asset = %point.quote_asset,
                    reference = %self.reference_currency,
                    error = %err,
                    "price normalization failed, reporting zero reference prices"
                );
                ReferencePrices::default()
            }
        }
    }

    async fn resolve_anchor(&self, point: &MarketPricePoint) -> Result<Anchor, RateError> {
        let base_ticker = self.rates.asset_currency(point.base_asset.as_str());
        let quote_ticker = self.rates.asset_currency(point.quote_asset.as_str());

        let is_stable = |ticker: &Result<String, RateError>| {
            ticker
                .as_ref()
                .map(|t| self.rates.is_fiat_symbol_supported(t))
                .unwrap_or(false)
        };
        let base_stable = is_stable(&base_ticker);
        let quote_stable = is_stable(&quote_ticker);
        debug!(
            pair = %point.pair_key(),
            base_stable,
            quote_stable,
            "resolving reference anchor"
        );

        let reference = self.reference_currency.as_str();
        if base_stable {
            let ticker = base_ticker?;
            let rate = self.rates.convert_currency(&ticker, reference).await?;
            return Ok(Anchor::Base(rate));
        }
        if quote_stable {
            let ticker = quote_ticker?;
            let rate = self.rates.convert_currency(&ticker, reference).await?;
            return Ok(Anchor::Quote(rate));
        }

        let (base_ticker, quote_ticker) = (base_ticker?, quote_ticker?);
        let base = self.rates.convert_currency(&base_ticker, reference).await?;
        let quote = self.rates.convert_currency(&quote_ticker, reference).await?;
        Ok(Anchor::Independent { base, quote })
    }
}
