//! Analytics aggregation for decentralized exchange markets.
//!
//! Balances and spot prices are fetched from remote markets on a schedule,
//! stored as time series, and served back bucketed, paginated and
//! normalized into a fiat reference currency.

pub mod analytics;
pub mod app;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod period;
pub mod rates;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use error::{AnalyticsError, AnalyticsResult, RateError};
