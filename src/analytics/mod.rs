//! Query-path aggregation: reference-currency normalization and VWAP.

mod normalizer;
pub mod vwap;

pub use normalizer::{PriceNormalizer, ReferencePrices};
pub use vwap::volume_weighted_average;
