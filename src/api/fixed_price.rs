//! Constant price for setups without a spot-price contract.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use chrono_tz::Tz;

use crate::{
    api::provider::{SpotPriceProvider, SpotPrices},
    core::{
        interval::Interval,
        series::{DaySeries, hours_of},
    },
    prelude::*,
    region::{Currency, Region},
    units::EnergyUnit,
};

pub struct Api {
    /// Price per megawatt-hour, quoted without a currency.
    price: f64,
}

impl Api {
    pub const ID: &'static str = "fixed_price";

    /// Take the configured price per kilowatt-hour.
    #[must_use]
    pub fn new(price_per_kwh: f64) -> Self {
        Self { price: price_per_kwh * EnergyUnit::KilowattHour.multiplier() }
    }

    fn day(&self, date: NaiveDate, tz: Tz) -> Result<DaySeries> {
        let intervals =
            hours_of(date, tz).into_iter().map(|hour| Interval::new(self.price, hour)).collect();
        DaySeries::try_new(date, intervals)
    }
}

#[async_trait]
impl SpotPriceProvider for Api {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn source_name(&self) -> &'static str {
        "Fixed Price"
    }

    fn default_currency(&self) -> Currency {
        Currency::None
    }

    fn regions(&self) -> &'static [Region] {
        &[Region::Fixed]
    }

    async fn get_spot_prices(&self, _region: Region, now: DateTime<Tz>) -> Result<SpotPrices> {
        let today = now.date_naive();
        let tomorrow = today.checked_add_days(Days::new(1)).context("date out of range")?;
        Ok(SpotPrices {
            today: Some(self.day(today, now.timezone())?),
            tomorrow: Some(self.day(tomorrow, now.timezone())?),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Europe::Copenhagen;

    use super::*;

    #[tokio::test]
    async fn test_get_spot_prices_ok() -> Result {
        let now = Copenhagen.with_ymd_and_hms(2024, 10, 26, 15, 0, 0).unwrap();
        let prices = Api::new(1.5).get_spot_prices(Region::Fixed, now).await?;
        let today = prices.today.context("no today")?;
        let tomorrow = prices.tomorrow.context("no tomorrow")?;
        assert_eq!(today.len(), 24);
        assert_eq!(tomorrow.len(), 25, "autumn transition day");
        assert!(today.iter().chain(&*tomorrow).all(|interval| interval.price == 1500.0));
        Ok(())
    }
}
