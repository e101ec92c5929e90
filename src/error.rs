//! Error kinds surfaced by the aggregation engine.

/// Failures of the exchange-rate client.
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    /// The source had no usable rate for the requested pair.
    #[error("currency not found")]
    CurrencyNotFound,

    /// The conversion target is not a supported fiat symbol.
    #[error("unsupported symbol: {0}")]
    UnsupportedSymbol(String),

    /// No ticker is configured for the asset hash.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("rate limit wait exceeded")]
    RateLimitWaitExceeded,

    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

/// Errors returned by the query and ingestion services.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AnalyticsError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;
