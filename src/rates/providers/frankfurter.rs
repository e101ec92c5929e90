//! Frankfurter forex source (ECB daily reference rates).

use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use super::{decimal_from_f64, USER_AGENT};
use crate::rates::{FiatRateSource, FiatRateTable};

const FRANKFURTER_BASE_URL: &str = "https://api.frankfurter.app";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    base: String,
    rates: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct FrankfurterSource {
    client: Client,
    base_url: String,
}

impl FrankfurterSource {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: FRANKFURTER_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for FrankfurterSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FiatRateSource for FrankfurterSource {
    async fn currencies(&self) -> Result<Vec<String>> {
        let url = format!("{}/currencies", self.base_url);
        let names: HashMap<String, String> = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Failed to decode Frankfurter currencies")?;

        let mut codes: Vec<String> = names.into_keys().collect();
        codes.sort();
        Ok(codes)
    }

    async fn latest_rates(&self, base: &str) -> Result<FiatRateTable> {
        let base = base.to_uppercase();
        let url = format!("{}/latest", self.base_url);
        let response: LatestResponse = self
            .client
            .get(&url)
            .query(&[("from", base.as_str())])
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Failed to decode Frankfurter rates for {base}"))?;

        let rates = response
            .rates
            .into_iter()
            .map(|(code, rate)| Ok((code.to_uppercase(), decimal_from_f64(rate)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(FiatRateTable {
            base: response.base.to_uppercase(),
            rates,
        })
    }

    fn name(&self) -> &str {
        "frankfurter"
    }
}
