use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{MarketBalancePoint, MarketId, MarketPricePoint};

/// `Σ(price × weight) / Σ(weight)`, or zero when either sum is zero.
pub fn volume_weighted_average(samples: impl IntoIterator<Item = (Decimal, Decimal)>) -> Decimal {
    let (weighted, volume) = samples
        .into_iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(weighted, volume), (price, weight)| {
            (weighted + price * weight, volume + weight)
        });

    if weighted.is_zero() || volume.is_zero() {
        return Decimal::ZERO;
    }
    (weighted / volume).round_dp(8)
}

/// Pairs each bucketed quote price with the base balance of the same market
/// and bucket. Buckets present in only one series are skipped.
pub fn join_buckets(
    prices: &HashMap<MarketId, Vec<MarketPricePoint>>,
    balances: &HashMap<MarketId, Vec<MarketBalancePoint>>,
) -> Vec<(Decimal, Decimal)> {
    let mut samples = Vec::new();
    for (market_id, series) in prices {
        let Some(balance_series) = balances.get(market_id) else {
            continue;
        };
        let by_bucket: HashMap<DateTime<Utc>, Decimal> = balance_series
            .iter()
            .map(|b| (b.timestamp, b.base_balance))
            .collect();

        samples.extend(series.iter().filter_map(|p| {
            by_bucket
                .get(&p.timestamp)
                .map(|balance| (p.quote_price, *balance))
        }));
    }
    samples
}

/// VWAP over already-bucketed price and balance series.
pub fn vwap(
    prices: &HashMap<MarketId, Vec<MarketPricePoint>>,
    balances: &HashMap<MarketId, Vec<MarketBalancePoint>>,
) -> Decimal {
    volume_weighted_average(join_buckets(prices, balances))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetId;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn price(market: u64, hour: i64, quote_price: Decimal) -> MarketPricePoint {
        MarketPricePoint {
            market_id: MarketId::new(market),
            base_asset: AssetId::from_string("a".repeat(64)),
            quote_asset: AssetId::from_string("b".repeat(64)),
            base_price: Decimal::ONE / quote_price,
            quote_price,
            timestamp: t(hour),
        }
    }

    fn balance(market: u64, hour: i64, base_balance: Decimal) -> MarketBalancePoint {
        MarketBalancePoint {
            market_id: MarketId::new(market),
            base_balance,
            quote_balance: dec!(1),
            timestamp: t(hour),
        }
    }

    #[test]
    fn two_bucket_example() {
        let prices = HashMap::from([(
            MarketId::new(1),
            vec![price(1, 0, dec!(100)), price(1, 1, dec!(200))],
        )]);
        let balances = HashMap::from([(
            MarketId::new(1),
            vec![balance(1, 0, dec!(10)), balance(1, 1, dec!(20))],
        )]);

        assert_eq!(vwap(&prices, &balances).round_dp(2), dec!(166.67));
    }

    #[test]
    fn spans_multiple_markets() {
        let prices = HashMap::from([
            (MarketId::new(1), vec![price(1, 0, dec!(100))]),
            (MarketId::new(2), vec![price(2, 0, dec!(300))]),
        ]);
        let balances = HashMap::from([
            (MarketId::new(1), vec![balance(1, 0, dec!(1))]),
            (MarketId::new(2), vec![balance(2, 0, dec!(3))]),
        ]);

        assert_eq!(vwap(&prices, &balances), dec!(250));
    }

    #[test]
    fn unmatched_buckets_are_ignored() {
        let prices = HashMap::from([(
            MarketId::new(1),
            vec![price(1, 0, dec!(100)), price(1, 5, dec!(900))],
        )]);
        let balances = HashMap::from([(MarketId::new(1), vec![balance(1, 0, dec!(2))])]);

        assert_eq!(vwap(&prices, &balances), dec!(100));
    }

    #[test]
    fn zero_volume_is_zero_not_error() {
        assert_eq!(volume_weighted_average(Vec::new()), Decimal::ZERO);
        assert_eq!(
            volume_weighted_average(vec![(dec!(100), Decimal::ZERO)]),
            Decimal::ZERO
        );
    }
}
