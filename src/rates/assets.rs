use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RateError;
use crate::models::AssetId;

/// L-BTC on Liquid mainnet.
pub const LBTC_ASSET: &str = "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d";
/// Tether USDt on Liquid mainnet.
pub const USDT_ASSET: &str = "ce091c998b83c78bb71a632313ba3760f1763d9cfcffae02258ffa9865a37bd2";
/// LCAD on Liquid mainnet.
pub const LCAD_ASSET: &str = "0e99c1a6da379d1f4151fb9df90449d40d0608f6cb33a5bcbfc8c265f42bab0a";

/// Static mapping from asset hash to the currency ticker it is priced in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetCurrencies(BTreeMap<String, String>);

impl Default for AssetCurrencies {
    fn default() -> Self {
        Self::from_pairs([
            (LBTC_ASSET, "bitcoin"),
            (USDT_ASSET, "usd"),
            (LCAD_ASSET, "cad"),
        ])
    }
}

impl AssetCurrencies {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(asset, ticker)| (asset.to_lowercase(), ticker.to_lowercase()))
                .collect(),
        )
    }

    /// Parses the compact `hash:ticker,hash:ticker` form.
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = BTreeMap::new();
        for entry in text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (asset, ticker) = entry
                .split_once(':')
                .with_context(|| format!("Asset currency entry {entry:?} must be hash:ticker"))?;
            let asset = AssetId::parse(asset)
                .with_context(|| format!("Invalid asset in entry {entry:?}"))?;
            let ticker = ticker.trim();
            if ticker.is_empty() {
                anyhow::bail!("Asset currency entry {entry:?} has an empty ticker");
            }
            table.insert(asset.as_str().to_string(), ticker.to_lowercase());
        }
        Ok(Self(table))
    }

    pub fn ticker_for(&self, asset: &str) -> Result<&str, RateError> {
        self.0
            .get(&asset.to_lowercase())
            .map(String::as_str)
            .ok_or_else(|| RateError::AssetNotFound(asset.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
