//! Capabilities a data provider may implement.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    core::{interval::Interval, series::DaySeries, tariff::TariffSchedule},
    prelude::*,
    region::{Currency, Region},
};

/// Raw spot prices a provider returned, split by local calendar day.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpotPrices {
    pub today: Option<DaySeries>,
    pub tomorrow: Option<DaySeries>,
}

impl SpotPrices {
    #[must_use]
    pub fn split(intervals: &[Interval], today: NaiveDate) -> Self {
        Self {
            today: DaySeries::collect_on(today, intervals),
            tomorrow: today
                .checked_add_days(Days::new(1))
                .and_then(|tomorrow| DaySeries::collect_on(tomorrow, intervals)),
        }
    }
}

/// Single CO2 intensity reading, in grams per kilowatt-hour.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Co2Sample {
    pub value: f64,
    pub timestamp: DateTime<Tz>,
}

/// Day-ahead spot prices, quoted per megawatt-hour in [`SpotPriceProvider::default_currency`].
#[async_trait]
pub trait SpotPriceProvider: Send + Sync {
    /// Stable identifier, also used in retry operation keys.
    fn id(&self) -> &'static str;

    /// Human-readable name for attribution.
    fn source_name(&self) -> &'static str;

    fn default_currency(&self) -> Currency;

    fn regions(&self) -> &'static [Region];

    async fn get_spot_prices(&self, region: Region, now: DateTime<Tz>) -> Result<SpotPrices>;

    /// Whether the tomorrow series is complete enough to be adopted.
    fn accepts_tomorrow(&self, _tomorrow: &DaySeries) -> bool {
        true
    }
}

#[async_trait]
pub trait Co2Provider: Send + Sync {
    fn id(&self) -> &'static str;

    fn co2_regions(&self) -> &'static [Region];

    /// Today's readings in the display time zone.
    async fn get_co2_emissions(&self, region: Region, now: DateTime<Tz>) -> Result<Vec<Co2Sample>>;
}

/// Multi-day price forecast, quoted per megawatt-hour like the spot prices.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    fn id(&self) -> &'static str;

    fn source_name(&self) -> &'static str;

    fn default_currency(&self) -> Currency;

    fn regions(&self) -> &'static [Region];

    async fn get_forecast(&self, region: Region, now: DateTime<Tz>) -> Result<Vec<Interval>>;
}

/// Grid tariffs of the configured charge owner together with the system surcharges.
#[async_trait]
pub trait TariffProvider: Send + Sync {
    fn id(&self) -> &'static str;

    /// Name of the net operator, shown next to the tariffs.
    fn operator_name(&self) -> &str;

    fn regions(&self) -> &'static [Region];

    async fn get_tariffs(&self, now: DateTime<Tz>) -> Result<TariffSchedule>;
}
