use std::sync::Arc;

use anyhow::Result;
use dex_analytics::rates::providers::{CoinGeckoSource, FrankfurterSource};
use dex_analytics::rates::{
    AssetCurrencies, CryptoRateSource, ExchangeRateClient, RateClientOptions, RateService,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn coingecko_lists_coins_from_mock_server() -> Result<()> {
    let server = MockServer::start().await;
    let source = CoinGeckoSource::new().with_base_url(server.uri());

    let body = r#"[
        {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin"},
        {"id": "tether", "symbol": "usdt", "name": "Tether"}
    ]"#;
    Mock::given(method("GET"))
        .and(path("/coins/list"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let coins = source.coin_list().await?;
    assert_eq!(coins.len(), 2);
    assert_eq!(coins[0].id, "bitcoin");

    Ok(())
}

#[tokio::test]
async fn coingecko_simple_price_reads_nested_quote() -> Result<()> {
    let server = MockServer::start().await;
    let source = CoinGeckoSource::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "bitcoin"))
        .and(query_param("vs_currencies", "eur"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"bitcoin": {"eur": 37740.38}}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let price = source.simple_price("Bitcoin", "EUR").await?;
    assert_eq!(price, dec!(37740.38));

    Ok(())
}

#[tokio::test]
async fn coingecko_missing_quote_is_zero() -> Result<()> {
    let server = MockServer::start().await;
    let source = CoinGeckoSource::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&server)
        .await;

    assert_eq!(source.simple_price("bitcoin", "usd").await?, Decimal::ZERO);
    Ok(())
}

#[tokio::test]
async fn coingecko_error_status_is_reported() -> Result<()> {
    let server = MockServer::start().await;
    let source = CoinGeckoSource::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/coins/list"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = source.coin_list().await.unwrap_err();
    assert!(err.to_string().contains("429"), "got {err}");
    Ok(())
}

#[tokio::test]
async fn client_converts_through_both_mocked_sources() -> Result<()> {
    let gecko = MockServer::start().await;
    let forex = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/coins/list"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"[{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin"}]"#,
            "application/json",
        ))
        .expect(1)
        .mount(&gecko)
        .await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"bitcoin": {"usd": 40000.0}}"#, "application/json"),
        )
        .expect(1)
        .mount(&gecko)
        .await;
    Mock::given(method("GET"))
        .and(path("/currencies"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"EUR": "Euro", "USD": "United States Dollar"}"#,
            "application/json",
        ))
        .mount(&forex)
        .await;

    let rates = ExchangeRateClient::connect(
        Arc::new(CoinGeckoSource::new().with_base_url(gecko.uri())),
        Arc::new(FrankfurterSource::new().with_base_url(forex.uri())),
        AssetCurrencies::default(),
        RateClientOptions::default(),
    )
    .await?;

    assert_eq!(rates.convert_currency("lbtc", "USD").await?, dec!(40000));
    assert_eq!(rates.convert_currency("btc", "usd").await?, dec!(40000));

    Ok(())
}
