use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static ASSET_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9a-f]{64}$").expect("static asset regex"));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid asset id {0:?}: expected 32-byte hex string")]
    Asset(String),
    #[error("Invalid market id {0:?}")]
    Market(String),
}

/// Numeric identifier assigned by the market catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(u64);

impl MarketId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MarketId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| IdError::Market(s.to_string()))
    }
}

impl From<u64> for MarketId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Hex-encoded asset hash as used by the exchange markets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Parses and lowercases an asset hash, rejecting anything that is not 64 hex chars.
    pub fn parse(value: &str) -> Result<Self, IdError> {
        let normalized = value.trim().to_lowercase();
        if ASSET_HASH.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(IdError::Asset(value.to_string()))
        }
    }

    /// Wraps a value without validation. Use for data read back from trusted stores.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Identity of a market for reconciliation: derived from (url, base, quote), never the numeric id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketKey(String);

impl MarketKey {
    const NAMESPACE: Uuid = Uuid::from_u128(0x3f1c_62a4_8d0e_5b7a_9c21_47e6_0ab5_d913);

    /// Deterministic UUIDv5 over the trimmed url and both asset hashes.
    pub fn derive(url: &str, base_asset: &AssetId, quote_asset: &AssetId) -> Self {
        let url = url.trim().trim_end_matches('/');
        let material = format!("{url}|{}|{}", base_asset.as_str(), quote_asset.as_str());
        Self(Uuid::new_v5(&Self::NAMESPACE, material.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
