//! CoinGecko crypto price source.
//!
//! Uses the free `/coins/list` catalogue to decide which symbols are crypto
//! assets and `/simple/price` for current quotes.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;

use super::{decimal_from_f64, USER_AGENT};
use crate::rates::{CoinListing, CryptoRateSource};

const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    client: Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: COINGECKO_API_BASE.to_string(),
        }
    }

    /// Points the source at another host, e.g. a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .with_context(|| format!("CoinGecko request to {path} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("CoinGecko API error on {path}: {status} - {body}"));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to decode CoinGecko {path} response"))
    }
}

impl Default for CoinGeckoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CryptoRateSource for CoinGeckoSource {
    async fn coin_list(&self) -> Result<Vec<CoinListing>> {
        self.get_json("/coins/list", &[]).await
    }

    async fn simple_price(&self, coin_id: &str, vs_currency: &str) -> Result<Decimal> {
        let coin_id = coin_id.to_lowercase();
        let vs_currency = vs_currency.to_lowercase();

        let data: HashMap<String, HashMap<String, f64>> = self
            .get_json(
                "/simple/price",
                &[("ids", &coin_id), ("vs_currencies", &vs_currency)],
            )
            .await?;

        match data.get(&coin_id).and_then(|prices| prices.get(&vs_currency)) {
            Some(price) => decimal_from_f64(*price),
            None => Ok(Decimal::ZERO),
        }
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_coin_list_entries() {
        let body = r#"[
            {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin"},
            {"id": "tether", "symbol": "usdt", "name": "Tether"}
        ]"#;
        let coins: Vec<CoinListing> = serde_json::from_str(body).unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id, "bitcoin");
        assert_eq!(coins[1].symbol, "usdt");
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let source = CoinGeckoSource::new().with_base_url("http://localhost:1234/");
        assert_eq!(source.base_url, "http://localhost:1234");
        assert_eq!(source.name(), "coingecko");
    }
}
