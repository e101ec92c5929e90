//! Remote market data: provider discovery, reserve balances and spot prices.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, Proxy, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FetcherConfig;
use crate::models::{AssetId, DiscoveredMarket, Market};

const USER_AGENT: &str = concat!("dex-analytics/", env!("CARGO_PKG_VERSION"));

/// A market provider as listed in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub endpoint: String,
}

/// Markets currently offered by one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMarkets {
    pub provider: String,
    pub endpoint: String,
    pub markets: Vec<DiscoveredMarket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceReading {
    pub base_balance: Decimal,
    pub quote_balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceReading {
    pub base_price: Decimal,
    pub quote_price: Decimal,
}

/// Network client for remote markets.
#[async_trait::async_trait]
pub trait MarketDataFetcher: Send + Sync {
    /// Every registered provider with the markets it reports as tradable.
    async fn fetch_providers_markets(&self) -> Result<Vec<ProviderMarkets>>;
    async fn fetch_balance(&self, market: &Market) -> Result<BalanceReading>;
    async fn fetch_price(&self, market: &Market) -> Result<PriceReading>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMarket {
    base_asset: String,
    quote_asset: String,
}

#[derive(Debug, Serialize)]
struct MarketRequest {
    market: WireMarket,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    market: WireMarket,
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    #[serde(default)]
    markets: Vec<MarketEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBalance {
    base_amount: Decimal,
    quote_amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: WireBalance,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceResponse {
    spot_price: Decimal,
}

/// Adds `https://` to scheme-less endpoints and drops trailing slashes.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn is_onion(endpoint: &str) -> Result<bool> {
    let url = Url::parse(endpoint).with_context(|| format!("Invalid endpoint {endpoint}"))?;
    Ok(url.host_str().is_some_and(|host| host.ends_with(".onion")))
}

/// JSON-over-HTTP market fetcher. `.onion` endpoints go through a SOCKS5 proxy.
#[derive(Debug, Clone)]
pub struct HttpMarketFetcher {
    registry_url: Option<String>,
    direct: Client,
    onion: Option<Client>,
}

impl HttpMarketFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let direct = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        let onion = if config.onion_proxy.trim().is_empty() {
            None
        } else {
            let proxy = Proxy::all(config.onion_proxy.trim())
                .with_context(|| format!("Invalid onion proxy {}", config.onion_proxy))?;
            Some(
                Client::builder()
                    .timeout(config.request_timeout)
                    .user_agent(USER_AGENT)
                    .proxy(proxy)
                    .build()
                    .context("Failed to build onion HTTP client")?,
            )
        };

        Ok(Self {
            registry_url: config.registry_url.clone(),
            direct,
            onion,
        })
    }

    pub fn with_registry_url(mut self, registry_url: impl Into<String>) -> Self {
        self.registry_url = Some(registry_url.into());
        self
    }

    fn client_for(&self, endpoint: &str) -> Result<&Client> {
        if !is_onion(endpoint)? {
            return Ok(&self.direct);
        }
        self.onion
            .as_ref()
            .ok_or_else(|| anyhow!("No onion proxy configured for {endpoint}"))
    }

    pub async fn fetch_providers(&self) -> Result<Vec<Provider>> {
        let registry_url = self
            .registry_url
            .as_deref()
            .context("No market registry configured")?;

        let response = self
            .direct
            .get(registry_url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Registry request to {registry_url} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Registry error: {status} - {body}");
        }

        response
            .json()
            .await
            .context("Failed to decode registry response")
    }

    async fn post_json<B, T>(&self, endpoint: &str, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let endpoint = normalize_endpoint(endpoint);
        let url = format!("{endpoint}{path}");
        let response = self
            .client_for(&endpoint)?
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Market API error on {url}: {status} - {body}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to decode response from {url}"))
    }

    async fn fetch_markets(&self, provider: &Provider) -> Result<ProviderMarkets> {
        let endpoint = normalize_endpoint(&provider.endpoint);
        let response: MarketsResponse = self
            .post_json(&endpoint, "/v1/markets", &serde_json::json!({}))
            .await?;

        let mut markets = Vec::with_capacity(response.markets.len());
        for entry in response.markets {
            let parsed = AssetId::parse(&entry.market.base_asset)
                .and_then(|base| Ok((base, AssetId::parse(&entry.market.quote_asset)?)));
            match parsed {
                Ok((base, quote)) => markets.push(DiscoveredMarket::new(
                    provider.name.clone(),
                    endpoint.clone(),
                    base,
                    quote,
                )),
                Err(err) => warn!(
                    provider = %provider.name,
                    error = %err,
                    "skipping market with malformed asset ids"
                ),
            }
        }

        debug!(provider = %provider.name, count = markets.len(), "fetched provider markets");
        Ok(ProviderMarkets {
            provider: provider.name.clone(),
            endpoint,
            markets,
        })
    }
}

fn market_request(market: &Market) -> MarketRequest {
    MarketRequest {
        market: WireMarket {
            base_asset: market.base_asset.to_string(),
            quote_asset: market.quote_asset.to_string(),
        },
    }
}

#[async_trait::async_trait]
impl MarketDataFetcher for HttpMarketFetcher {
    async fn fetch_providers_markets(&self) -> Result<Vec<ProviderMarkets>> {
        let providers = self.fetch_providers().await?;
        let listings =
            futures::future::join_all(providers.iter().map(|p| self.fetch_markets(p))).await;

        let mut out = Vec::with_capacity(providers.len());
        for (provider, listing) in providers.iter().zip(listings) {
            match listing {
                Ok(markets) => out.push(markets),
                Err(err) => warn!(
                    provider = %provider.name,
                    endpoint = %provider.endpoint,
                    error = %err,
                    "failed to list provider markets"
                ),
            }
        }
        Ok(out)
    }

    async fn fetch_balance(&self, market: &Market) -> Result<BalanceReading> {
        let response: BalanceResponse = self
            .post_json(&market.url, "/v1/market/balance", &market_request(market))
            .await?;
        Ok(BalanceReading {
            base_balance: response.balance.base_amount,
            quote_balance: response.balance.quote_amount,
        })
    }

    async fn fetch_price(&self, market: &Market) -> Result<PriceReading> {
        let response: PriceResponse = self
            .post_json(&market.url, "/v1/market/price", &market_request(market))
            .await?;
        if response.spot_price.is_zero() {
            bail!("Market {} reported a zero spot price", market.id);
        }
        Ok(PriceReading {
            base_price: (Decimal::ONE / response.spot_price).round_dp(8),
            quote_price: response.spot_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_default_to_https() {
        assert_eq!(normalize_endpoint("provider.example:9945/"), "https://provider.example:9945");
        assert_eq!(normalize_endpoint("http://127.0.0.1:9945"), "http://127.0.0.1:9945");
    }

    #[test]
    fn onion_hosts_are_detected() {
        assert!(is_onion("http://abcdefghijklmnop.onion:80").unwrap());
        assert!(!is_onion("https://provider.example").unwrap());
    }

    #[test]
    fn onion_endpoint_without_proxy_is_an_error() {
        let config = FetcherConfig {
            onion_proxy: String::new(),
            ..FetcherConfig::default()
        };
        let fetcher = HttpMarketFetcher::new(&config).unwrap();
        assert!(fetcher.client_for("http://abcdefghijklmnop.onion").is_err());
        assert!(fetcher.client_for("https://provider.example").is_ok());
    }
}
