pub mod coingecko;
pub mod frankfurter;

use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

pub use coingecko::CoinGeckoSource;
pub use frankfurter::FrankfurterSource;

pub(crate) const USER_AGENT: &str = concat!("dex-analytics/", env!("CARGO_PKG_VERSION"));

/// Converts a JSON float into a decimal via its shortest round-trip text form.
pub(crate) fn decimal_from_f64(value: f64) -> Result<Decimal> {
    let text = value.to_string();
    Decimal::from_str(&text).with_context(|| format!("Rate {text} is not a valid decimal"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn float_text_survives_conversion() {
        assert_eq!(decimal_from_f64(42850.12).unwrap(), dec!(42850.12));
        assert_eq!(decimal_from_f64(0.000025).unwrap(), dec!(0.000025));
        assert!(decimal_from_f64(f64::NAN).is_err());
    }
}
