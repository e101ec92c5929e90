use anyhow::Result;
use dex_analytics::rates::providers::FrankfurterSource;
use dex_analytics::rates::FiatRateSource;
use rust_decimal_macros::dec;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn frankfurter_currencies_are_sorted_codes() -> Result<()> {
    let server = MockServer::start().await;
    let source = FrankfurterSource::new().with_base_url(server.uri());

    let body = r#"{"USD": "United States Dollar", "CAD": "Canadian Dollar", "EUR": "Euro"}"#;
    Mock::given(method("GET"))
        .and(path("/currencies"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    assert_eq!(source.currencies().await?, vec!["CAD", "EUR", "USD"]);
    Ok(())
}

#[tokio::test]
async fn frankfurter_latest_requests_upper_case_base() -> Result<()> {
    let server = MockServer::start().await;
    let source = FrankfurterSource::new().with_base_url(server.uri());

    let body = r#"{
        "amount": 1.0,
        "base": "USD",
        "date": "2024-03-01",
        "rates": {"EUR": 0.93, "CAD": 1.35}
    }"#;
    Mock::given(method("GET"))
        .and(path("/latest"))
        .and(query_param("from", "USD"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let table = source.latest_rates("usd").await?;
    assert_eq!(table.base, "USD");
    assert_eq!(table.rates.get("EUR"), Some(&dec!(0.93)));
    assert_eq!(table.rates.get("CAD"), Some(&dec!(1.35)));

    Ok(())
}

#[tokio::test]
async fn frankfurter_server_error_is_reported() -> Result<()> {
    let server = MockServer::start().await;
    let source = FrankfurterSource::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(source.latest_rates("EUR").await.is_err());
    Ok(())
}
