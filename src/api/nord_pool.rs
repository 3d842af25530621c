//! [Nord Pool](https://data.nordpoolgroup.com) day-ahead prices.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    api::{
        client,
        provider::{SpotPriceProvider, SpotPrices},
    },
    core::{
        interval::Interval,
        series::{DaySeries, resample_hourly},
    },
    prelude::*,
    region::{Currency, Region},
};

/// Tomorrow's series is only trusted once it has more entries than this.
const MIN_TOMORROW_INTERVALS: usize = 20;

pub struct Api(Client);

impl Api {
    pub const ID: &'static str = "nord_pool";

    pub fn try_new() -> Result<Self> {
        Ok(Self(client::try_new()?))
    }

    /// Delivery area code the data portal uses for the region, `None` outside the market.
    const fn delivery_area(region: Region) -> Option<&'static str> {
        let area = match region {
            Region::De | Region::Lu => "DE-LU",
            Region::Dk1 => "DK1",
            Region::Dk2 => "DK2",
            Region::Fi => "FI",
            Region::Ee => "EE",
            Region::Lt => "LT",
            Region::Lv => "LV",
            Region::No1 => "NO1",
            Region::No2 => "NO2",
            Region::No3 => "NO3",
            Region::No4 => "NO4",
            Region::No5 => "NO5",
            Region::Se1 => "SE1",
            Region::Se2 => "SE2",
            Region::Se3 => "SE3",
            Region::Se4 => "SE4",
            Region::Fr => "FR",
            Region::Nl => "NL",
            Region::Be => "BE",
            Region::At => "AT",
            Region::Fixed => return None,
        };
        Some(area)
    }

    #[instrument(skip_all, fields(on = %on, area = area))]
    async fn get_day(&self, on: NaiveDate, area: &str) -> Result<Vec<(DateTime<Utc>, f64)>> {
        debug!("fetching…");
        let response = self
            .0
            .get("https://dataportal-api.nordpoolgroup.com/api/DayAheadPrices")
            .query(&[
                ("currency", "EUR"),
                ("date", &on.to_string()),
                ("market", "DayAhead"),
                ("deliveryArea", area),
            ])
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("request failed")?;
        if response.status() == StatusCode::NO_CONTENT {
            debug!("no content");
            return Ok(Vec::new());
        }
        let response =
            response.json::<Response>().await.context("failed to deserialize the response")?;
        Ok(response.prices_in(area))
    }
}

#[async_trait]
impl SpotPriceProvider for Api {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn source_name(&self) -> &'static str {
        "Nord Pool"
    }

    fn default_currency(&self) -> Currency {
        Currency::Eur
    }

    fn regions(&self) -> &'static [Region] {
        &[
            Region::Se1,
            Region::Se2,
            Region::Se3,
            Region::Se4,
            Region::No1,
            Region::No2,
            Region::No3,
            Region::No4,
            Region::No5,
            Region::Fi,
            Region::Ee,
            Region::Lv,
            Region::Lt,
            Region::Fr,
            Region::Nl,
            Region::Be,
            Region::At,
            Region::De,
            Region::Lu,
        ]
    }

    /// Fetch yesterday, today and tomorrow in parallel: delivery days are in CET,
    /// so the local day may span two of them.
    #[instrument(skip_all, fields(region = %region))]
    async fn get_spot_prices(&self, region: Region, now: DateTime<Tz>) -> Result<SpotPrices> {
        info!("fetching…");
        let area = Self::delivery_area(region).context("Nord Pool does not serve the region")?;
        let today = now.date_naive();
        let yesterday = today.checked_sub_days(Days::new(1)).context("date out of range")?;
        let tomorrow = today.checked_add_days(Days::new(1)).context("date out of range")?;
        let (yesterday, today_prices, tomorrow) = tokio::try_join!(
            self.get_day(yesterday, area),
            self.get_day(today, area),
            self.get_day(tomorrow, area),
        )?;
        let intervals = [yesterday, today_prices, tomorrow]
            .into_iter()
            .flatten()
            .map(|(start, price)| Interval::new(price, start.with_timezone(&now.timezone())))
            .collect();
        let intervals = resample_hourly(intervals);
        info!(n_intervals = intervals.len(), "fetched");
        Ok(SpotPrices::split(&intervals, today))
    }

    fn accepts_tomorrow(&self, tomorrow: &DaySeries) -> bool {
        tomorrow.len() > MIN_TOMORROW_INTERVALS
    }
}

#[derive(Deserialize)]
struct Response {
    #[serde(rename = "multiAreaEntries", default)]
    entries: Vec<Entry>,
}

impl Response {
    fn prices_in(self, area: &str) -> Vec<(DateTime<Utc>, f64)> {
        self.entries
            .into_iter()
            .filter_map(|entry| {
                let price = entry.price_per_area.get(area).copied()?;
                Some((entry.delivery_start, price))
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct Entry {
    #[serde(rename = "deliveryStart")]
    delivery_start: DateTime<Utc>,

    /// Euro per megawatt-hour by delivery area.
    #[serde(rename = "entryPerArea")]
    price_per_area: HashMap<String, f64>,
}
