use serde::{Deserialize, Serialize};

use super::{AssetId, MarketId, MarketKey};
use crate::error::{AnalyticsError, AnalyticsResult};

/// A tracked market as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub provider_name: String,
    pub url: String,
    pub base_asset: AssetId,
    pub quote_asset: AssetId,
    pub active: bool,
}

impl Market {
    pub fn key(&self) -> MarketKey {
        MarketKey::derive(&self.url, &self.base_asset, &self.quote_asset)
    }
}

/// A market as reported by discovery, before the catalog has assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredMarket {
    pub provider_name: String,
    pub url: String,
    pub base_asset: AssetId,
    pub quote_asset: AssetId,
}

impl DiscoveredMarket {
    pub fn new(
        provider_name: impl Into<String>,
        url: impl Into<String>,
        base_asset: AssetId,
        quote_asset: AssetId,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            url: url.into(),
            base_asset,
            quote_asset,
        }
    }

    pub fn key(&self) -> MarketKey {
        MarketKey::derive(&self.url, &self.base_asset, &self.quote_asset)
    }

    /// Validates the fields the catalog insists on.
    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.url.trim().is_empty() {
            return Err(AnalyticsError::invalid("market url must not be empty"));
        }
        AssetId::parse(self.base_asset.as_str())
            .map_err(|e| AnalyticsError::invalid(e.to_string()))?;
        AssetId::parse(self.quote_asset.as_str())
            .map_err(|e| AnalyticsError::invalid(e.to_string()))?;
        Ok(())
    }
}

/// Filter for catalog listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketFilter {
    pub url: Option<String>,
    pub base_asset: Option<AssetId>,
    pub quote_asset: Option<AssetId>,
}

impl MarketFilter {
    pub fn matches(&self, market: &Market) -> bool {
        let url_ok = self
            .url
            .as_deref()
            .map(|u| u.trim_end_matches('/') == market.url.trim_end_matches('/'))
            .unwrap_or(true);
        let base_ok = self
            .base_asset
            .as_ref()
            .map(|a| *a == market.base_asset)
            .unwrap_or(true);
        let quote_ok = self
            .quote_asset
            .as_ref()
            .map(|a| *a == market.quote_asset)
            .unwrap_or(true);
        url_ok && base_ok && quote_ok
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if let Some(url) = &self.url {
            reqwest::Url::parse(url)
                .map_err(|e| AnalyticsError::invalid(format!("invalid market url {url:?}: {e}")))?;
        }
        for asset in [&self.base_asset, &self.quote_asset].into_iter().flatten() {
            AssetId::parse(asset.as_str()).map_err(|e| AnalyticsError::invalid(e.to_string()))?;
        }
        Ok(())
    }
}
