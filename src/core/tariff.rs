use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::prelude::*;

/// Key of the government electricity duty among the system charges.
pub const ELECTRICITY_DUTY: &str = "elafgift";

pub const HOURS_PER_DAY: usize = 24;

/// Half-open validity range: `from <= date < to`, open-ended when `to` is absent.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Validity {
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
}

impl Validity {
    pub const fn open_ended(from: NaiveDate) -> Self {
        Self { from, to: None }
    }

    #[must_use]
    pub fn contains(self, date: NaiveDate) -> bool {
        self.from <= date && self.to.is_none_or(|to| date < to)
    }
}

/// Charge-owner (grid operator) tariff, one price per local hour.
#[derive(Clone, Debug, PartialEq)]
pub struct HourlyTariff {
    pub validity: Validity,
    pub prices: [f64; HOURS_PER_DAY],
}

impl HourlyTariff {
    pub fn try_new(validity: Validity, prices: Vec<f64>) -> Result<Self> {
        let n_prices = prices.len();
        let prices = <[f64; HOURS_PER_DAY]>::try_from(prices)
            .map_err(|_| anyhow!("expected {HOURS_PER_DAY} hourly prices, got {n_prices}"))?;
        Ok(Self { validity, prices })
    }
}

/// Government-mandated surcharge, applied regardless of the charge owner.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemCharge {
    pub name: String,
    pub validity: Validity,
    pub price: f64,
}

/// All dated tariff records known from the last successful fetch.
///
/// Kept whole so that any calendar date can be priced, not only the day of the fetch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TariffSchedule {
    pub hourly: Vec<HourlyTariff>,
    pub system: Vec<SystemCharge>,
}

impl TariffSchedule {
    /// Select the records in effect on the date.
    ///
    /// The first matching hourly record wins; for system charges, the first matching record
    /// per charge name.
    pub fn on(&self, date: NaiveDate) -> TariffSnapshot {
        let hourly_charges = self
            .hourly
            .iter()
            .find(|tariff| tariff.validity.contains(date))
            .map(|tariff| (0_u32..).zip(tariff.prices).collect())
            .unwrap_or_default();
        let mut system_charges = BTreeMap::new();
        for charge in self.system.iter().filter(|charge| charge.validity.contains(date)) {
            system_charges.entry(charge.name.clone()).or_insert(charge.price);
        }
        TariffSnapshot { hourly_charges, system_charges }
    }

    /// Reject a schedule that cannot price the date with a full hourly table.
    pub fn validate_on(self, date: NaiveDate) -> Result<Self> {
        let n_hours = self.on(date).hourly_charges.len();
        ensure!(
            n_hours == HOURS_PER_DAY,
            "expected {HOURS_PER_DAY} hourly tariffs on {date}, got {n_hours}"
        );
        Ok(self)
    }
}

/// Tariffs in effect on one calendar day.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[must_use]
pub struct TariffSnapshot {
    /// Local hour (0-23) to the charge-owner tariff.
    pub hourly_charges: BTreeMap<u32, f64>,

    /// Charge name to the system surcharge.
    pub system_charges: BTreeMap<String, f64>,
}

/// Tariff components applicable to a single hour.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HourCharges {
    /// Charge-owner tariff plus all system surcharges.
    pub total: f64,

    pub electricity_duty: f64,
    pub charge_owner: f64,
}

impl TariffSnapshot {
    #[must_use]
    pub fn charges_at(&self, hour: u32) -> HourCharges {
        let charge_owner = self.hourly_charges.get(&hour).copied().unwrap_or_default();
        let system: f64 = self.system_charges.values().sum();
        HourCharges {
            total: charge_owner + system,
            electricity_duty: self
                .system_charges
                .get(ELECTRICITY_DUTY)
                .copied()
                .unwrap_or_default(),
            charge_owner,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    /// Charge owner valid in the first half of 2024, with the duty and a system tariff.
    pub fn schedule() -> TariffSchedule {
        TariffSchedule {
            hourly: vec![
                HourlyTariff::try_new(
                    Validity { from: date(2024, 1, 1), to: Some(date(2024, 6, 1)) },
                    (0..24).map(|hour| if (17..21).contains(&hour) { 0.9 } else { 0.3 }).collect(),
                )
                .unwrap(),
            ],
            system: vec![
                SystemCharge {
                    name: ELECTRICITY_DUTY.to_string(),
                    validity: Validity::open_ended(date(2023, 6, 1)),
                    price: 0.7,
                },
                SystemCharge {
                    name: "systemtarif".to_string(),
                    validity: Validity::open_ended(date(2023, 6, 1)),
                    price: 0.05,
                },
                SystemCharge {
                    name: "systemtarif".to_string(),
                    validity: Validity { from: date(2022, 1, 1), to: Some(date(2023, 6, 1)) },
                    price: 1000.0,
                },
            ],
        }
    }

    #[test]
    fn test_validity_half_open_ok() {
        let validity = Validity { from: date(2024, 1, 1), to: Some(date(2024, 6, 1)) };
        assert!(!validity.contains(date(2023, 12, 31)));
        assert!(validity.contains(date(2024, 1, 1)));
        assert!(validity.contains(date(2024, 5, 31)));
        assert!(!validity.contains(date(2024, 6, 1)));
        assert!(Validity::open_ended(date(2023, 6, 1)).contains(date(2099, 1, 1)));
    }

    #[test]
    fn test_hourly_tariff_rejects_short_table() {
        let validity = Validity::open_ended(date(2024, 1, 1));
        assert!(HourlyTariff::try_new(validity, vec![0.1; 23]).is_err());
        assert!(HourlyTariff::try_new(validity, vec![0.1; 24]).is_ok());
    }

    #[test]
    fn test_snapshot_within_validity_ok() {
        let snapshot = schedule().on(date(2024, 3, 15));
        assert_eq!(snapshot.hourly_charges.len(), 24);
        assert_eq!(snapshot.system_charges.len(), 2);
        let charges = snapshot.charges_at(18);
        assert_abs_diff_eq!(charges.charge_owner, 0.9);
        assert_abs_diff_eq!(charges.electricity_duty, 0.7);
        assert_abs_diff_eq!(charges.total, 0.9 + 0.7 + 0.05);
    }

    #[test]
    fn test_snapshot_after_expiry_ok() {
        let snapshot = schedule().on(date(2024, 7, 1));
        assert!(snapshot.hourly_charges.is_empty());
        let charges = snapshot.charges_at(18);
        assert_abs_diff_eq!(charges.charge_owner, 0.0);
        assert_abs_diff_eq!(charges.total, 0.75);
    }

    #[test]
    fn test_validate_on_ok() {
        assert!(schedule().validate_on(date(2024, 3, 15)).is_ok());
        assert!(schedule().validate_on(date(2024, 7, 1)).is_err());
    }
}
