//! Exchange-rate snapshot and conversion between display currencies.

use std::{collections::BTreeMap, fmt::Debug, fs, path::Path, sync::Arc};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{prelude::*, region::Currency};

/// Units of each currency per one euro.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRates {
    /// Date the rates were published on, if known.
    #[serde(default)]
    pub date: Option<NaiveDate>,

    pub rates: BTreeMap<Currency, f64>,
}

impl Default for ExchangeRates {
    /// Built-in snapshot, used until a fresher table is loaded.
    fn default() -> Self {
        Self {
            date: None,
            rates: BTreeMap::from([
                (Currency::Dkk, 7.46),
                (Currency::Nok, 11.7),
                (Currency::Sek, 11.2),
                (Currency::Usd, 1.08),
            ]),
        }
    }
}

impl ExchangeRates {
    #[instrument(name = "reading exchange rates…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let rates: Self = toml::from_slice(&fs::read(path)?)?;
        ensure!(
            rates.rates.values().all(|rate| rate.is_finite() && *rate > 0.0),
            "exchange rates must be positive"
        );
        Ok(rates)
    }

    fn per_euro(&self, currency: Currency) -> Result<f64> {
        if currency == Currency::Eur {
            return Ok(1.0);
        }
        self.rates
            .get(&currency)
            .copied()
            .with_context(|| format!("no exchange rate for {currency}"))
    }

    /// Convert the value. Identity when the currencies match or either side has no currency.
    pub fn convert(&self, value: f64, from: Currency, to: Currency) -> Result<f64> {
        if from == to || from == Currency::None || to == Currency::None {
            return Ok(value);
        }
        Ok(value / self.per_euro(from)? * self.per_euro(to)?)
    }
}

/// Shared, read-mostly holder of the current [`ExchangeRates`].
///
/// Readers take a cheap snapshot; a refresh replaces the table wholesale.
pub struct CurrencyConverter(watch::Sender<Arc<ExchangeRates>>);

impl CurrencyConverter {
    #[must_use]
    pub fn new(rates: ExchangeRates) -> Self {
        Self(watch::Sender::new(Arc::new(rates)))
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<ExchangeRates> {
        self.0.borrow().clone()
    }

    pub fn replace(&self, rates: ExchangeRates) {
        info!(date = ?rates.date, n_rates = rates.rates.len(), "exchange rates replaced");
        self.0.send_replace(Arc::new(rates));
    }
}

impl Default for CurrencyConverter {
    fn default() -> Self {
        Self::new(ExchangeRates::default())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_identity_ok() -> Result {
        let rates = ExchangeRates::default();
        assert_abs_diff_eq!(rates.convert(42.0, Currency::Dkk, Currency::Dkk)?, 42.0);
        assert_abs_diff_eq!(rates.convert(42.0, Currency::None, Currency::Dkk)?, 42.0);
        assert_abs_diff_eq!(rates.convert(42.0, Currency::Eur, Currency::None)?, 42.0);
        Ok(())
    }

    #[test]
    fn test_convert_via_euro_ok() -> Result {
        let rates = ExchangeRates {
            date: None,
            rates: BTreeMap::from([(Currency::Dkk, 7.5), (Currency::Sek, 11.0)]),
        };
        assert_abs_diff_eq!(rates.convert(100.0, Currency::Eur, Currency::Dkk)?, 750.0);
        assert_abs_diff_eq!(rates.convert(750.0, Currency::Dkk, Currency::Eur)?, 100.0);
        assert_abs_diff_eq!(
            rates.convert(75.0, Currency::Dkk, Currency::Sek)?,
            110.0,
            epsilon = 1e-9
        );
        Ok(())
    }

    #[test]
    fn test_missing_rate_err() {
        let rates = ExchangeRates { date: None, rates: BTreeMap::new() };
        assert!(rates.convert(1.0, Currency::Eur, Currency::Nok).is_err());
    }

    #[test]
    fn test_deserialize_toml_ok() -> Result {
        // language=TOML
        const RATES: &str = r#"
            date = "2024-03-15"

            [rates]
            DKK = 7.4572
            SEK = 11.27
        "#;
        let rates: ExchangeRates = toml::from_str(RATES)?;
        assert_eq!(rates.date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_abs_diff_eq!(rates.rates[&Currency::Dkk], 7.4572);
        Ok(())
    }

    #[test]
    fn test_converter_replace_ok() -> Result {
        let converter = CurrencyConverter::default();
        let before = converter.snapshot();
        converter.replace(ExchangeRates {
            date: None,
            rates: BTreeMap::from([(Currency::Dkk, 8.0)]),
        });
        assert_abs_diff_eq!(converter.snapshot().convert(1.0, Currency::Eur, Currency::Dkk)?, 8.0);
        assert_abs_diff_eq!(before.convert(1.0, Currency::Eur, Currency::Dkk)?, 7.46);
        Ok(())
    }
}
