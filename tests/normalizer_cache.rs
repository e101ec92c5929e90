mod support;

use std::sync::Arc;

use chrono::Duration;
use dex_analytics::analytics::PriceNormalizer;
use dex_analytics::models::{MarketId, MarketPricePoint};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use support::{asset, t0, StubRates};

fn point(base: char, quote: char, base_price: Decimal, quote_price: Decimal) -> MarketPricePoint {
    MarketPricePoint {
        market_id: MarketId::new(1),
        base_asset: asset(base),
        quote_asset: asset(quote),
        base_price,
        quote_price,
        timestamp: t0(),
    }
}

#[tokio::test]
async fn recurring_pair_resolves_rates_once() {
    let rates = Arc::new(
        StubRates::new(&["usd", "eur"])
            .with_asset(&asset('a'), "bitcoin")
            .with_asset(&asset('b'), "usd")
            .with_rate("usd", "eur", dec!(0.9)),
    );
    let mut normalizer = PriceNormalizer::new(rates.clone(), "EUR");

    let first = normalizer
        .normalize(&point('a', 'b', dec!(0.000025), dec!(40000)))
        .await;
    assert_eq!(first.quote, dec!(36000));
    assert_eq!(first.base, dec!(0.9));
    let calls = rates.convert_calls();

    let mut later = point('a', 'b', dec!(0.00002), dec!(50000));
    later.timestamp = t0() + Duration::hours(1);
    let second = normalizer.normalize(&later).await;
    assert_eq!(second.quote, dec!(45000));
    assert_eq!(second.base, dec!(0.9));
    assert_eq!(rates.convert_calls(), calls);
}

#[tokio::test]
async fn fiat_base_anchors_the_pair() {
    let rates = Arc::new(
        StubRates::new(&["usd", "eur"])
            .with_asset(&asset('b'), "usd")
            .with_asset(&asset('a'), "bitcoin")
            .with_rate("usd", "eur", dec!(0.9)),
    );
    let mut normalizer = PriceNormalizer::new(rates, "eur");

    let prices = normalizer
        .normalize(&point('b', 'a', dec!(40000), dec!(0.000025)))
        .await;
    assert_eq!(prices.base, dec!(36000));
    assert_eq!(prices.quote, dec!(0.9));
}

#[tokio::test]
async fn failures_degrade_to_zero_and_are_retried() {
    let rates = Arc::new(
        StubRates::new(&["usd", "eur"])
            .with_asset(&asset('a'), "bitcoin")
            .with_asset(&asset('b'), "usd"),
    );
    let mut normalizer = PriceNormalizer::new(rates.clone(), "eur");

    let p = point('a', 'b', dec!(0.000025), dec!(40000));
    let first = normalizer.normalize(&p).await;
    assert_eq!(first.base, Decimal::ZERO);
    assert_eq!(first.quote, Decimal::ZERO);

    let calls = rates.convert_calls();
    normalizer.normalize(&p).await;
    assert!(rates.convert_calls() > calls);
}

#[tokio::test]
async fn pair_without_fiat_leg_converts_each_ticker() {
    let rates = Arc::new(
        StubRates::new(&["usd", "eur"])
            .with_asset(&asset('a'), "bitcoin")
            .with_asset(&asset('c'), "ethereum")
            .with_rate("bitcoin", "eur", dec!(37000))
            .with_rate("ethereum", "eur", dec!(2000)),
    );
    let mut normalizer = PriceNormalizer::new(rates, "eur");

    let prices = normalizer
        .normalize(&point('a', 'c', dec!(18.5), dec!(0.054)))
        .await;
    assert_eq!(prices.base, dec!(37000));
    assert_eq!(prices.quote, dec!(2000));
}
