use std::sync::Arc;

use bon::Builder;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::{
    core::{
        formula::{CostFormula, FormulaError, FormulaInputs},
        interval::Interval,
        series::DaySeries,
        tariff::{HourCharges, TariffSchedule},
    },
    currency::ExchangeRates,
    region::Currency,
    units::{CENT_MULTIPLIER, EnergyUnit},
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PricingError {
    #[display("cost formula failed for {timestamp}: {source}")]
    Formula { timestamp: DateTime<Tz>, source: FormulaError },

    #[display("cannot convert {from} to {to}: no exchange rate")]
    ExchangeRate { from: Currency, to: Currency },
}

/// Everything that turns a raw per-MWh quote into a displayed price.
#[derive(Builder, Clone)]
pub struct Pricing {
    display_currency: Currency,

    /// VAT as a fraction, zero when VAT is not shown.
    #[builder(default)]
    vat: f64,

    #[builder(default)]
    unit: EnergyUnit,

    #[builder(default)]
    in_cents: bool,

    formula: Arc<dyn CostFormula>,
}

/// Data-dependent inputs of one pricing pass.
#[derive(Copy, Clone)]
pub struct PricingInputs<'a> {
    pub source_currency: Currency,
    pub rates: &'a ExchangeRates,
    pub tariffs: Option<&'a TariffSchedule>,
}

impl Pricing {
    #[must_use]
    pub const fn display_currency(&self) -> Currency {
        self.display_currency
    }

    #[must_use]
    pub const fn vat(&self) -> f64 {
        self.vat
    }

    #[must_use]
    pub const fn unit(&self) -> EnergyUnit {
        self.unit
    }

    #[must_use]
    pub const fn in_cents(&self) -> bool {
        self.in_cents
    }

    /// Price every interval of the raw series.
    ///
    /// Pure: the same raw series and inputs always produce the same output.
    pub fn price_series(
        &self,
        raw: &DaySeries,
        inputs: PricingInputs<'_>,
    ) -> Result<DaySeries, PricingError> {
        raw.try_map_prices(|interval| Ok(self.price(interval, inputs)?.price))
    }

    pub fn price_all(
        &self,
        raw: &[Interval],
        inputs: PricingInputs<'_>,
    ) -> Result<Vec<Interval>, PricingError> {
        raw.iter().map(|interval| self.price(interval, inputs)).collect()
    }

    pub fn price(
        &self,
        interval: &Interval,
        inputs: PricingInputs<'_>,
    ) -> Result<Interval, PricingError> {
        let converted = inputs
            .rates
            .convert(interval.price, inputs.source_currency, self.display_currency)
            .map_err(|_| PricingError::ExchangeRate {
                from: inputs.source_currency,
                to: self.display_currency,
            })?;
        let base = converted / self.unit.multiplier();

        let charges = inputs
            .tariffs
            .filter(|schedule| !schedule.hourly.is_empty())
            .map_or_else(HourCharges::default, |schedule| {
                schedule.on(interval.date()).charges_at(interval.hour())
            });

        let formula_inputs = FormulaInputs {
            current_price: base,
            current_tariff: charges.total,
            el_afgift: charges.electricity_duty,
            chargeowner_tariff: charges.charge_owner,
            now: interval.timestamp,
        };
        let additional = self
            .formula
            .evaluate(&formula_inputs)
            .map_err(|source| PricingError::Formula { timestamp: interval.timestamp, source })?;

        let mut price = (base + additional + charges.total) * (1.0 + self.vat);
        if self.in_cents {
            price *= CENT_MULTIPLIER;
        }
        Ok(interval.with_price(price))
    }

    /// Apply VAT to an amount that is already in display units, such as a tariff.
    #[must_use]
    pub fn with_vat(&self, amount: f64) -> f64 {
        amount * (1.0 + self.vat)
    }
}

/// Round at the presentation boundary.
#[must_use]
pub fn round_to(value: f64, decimals: u8) -> f64 {
    let scale = 10_f64.powi(i32::from(decimals));
    (value * scale).round() / scale
}
