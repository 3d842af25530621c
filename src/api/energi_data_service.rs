//! [Energi Data Service](https://www.energidataservice.dk) spot prices and CO2 emission prognosis.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_with::serde_as;

use crate::{
    api::{
        client,
        provider::{Co2Provider, Co2Sample, SpotPriceProvider, SpotPrices},
    },
    core::interval::Interval,
    prelude::*,
    region::{Currency, Region},
};

const BASE_URL: &str = "https://api.energidataservice.dk/dataset";

pub struct Api(Client);

impl Api {
    pub const ID: &'static str = "energi_data_service";

    pub fn try_new() -> Result<Self> {
        Ok(Self(client::try_new()?))
    }

    pub(crate) async fn get_records<R: DeserializeOwned>(
        &self,
        dataset: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<R>> {
        Ok(self
            .0
            .get(format!("{BASE_URL}/{dataset}"))
            .query(query)
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("request failed")?
            .json::<Response<R>>()
            .await
            .context("failed to deserialize the response")?
            .records)
    }
}

#[async_trait]
impl SpotPriceProvider for Api {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn source_name(&self) -> &'static str {
        "Energi Data Service"
    }

    fn default_currency(&self) -> Currency {
        Currency::Eur
    }

    fn regions(&self) -> &'static [Region] {
        &[Region::Dk1, Region::Dk2, Region::Se3, Region::Se4, Region::No2]
    }

    #[instrument(skip_all, fields(region = %region))]
    async fn get_spot_prices(&self, region: Region, now: DateTime<Tz>) -> Result<SpotPrices> {
        info!("fetching…");
        let utc_today = now.with_timezone(&Utc).date_naive();
        let start = utc_today.checked_sub_days(Days::new(1)).context("date out of range")?;
        let end = utc_today.checked_add_days(Days::new(2)).context("date out of range")?;
        let records = self
            .get_records::<SpotPriceRecord>(
                "elspotprices",
                &[
                    ("start", start.to_string()),
                    ("end", end.to_string()),
                    ("filter", serde_json::json!({ "PriceArea": region.to_string() }).to_string()),
                    ("sort", "HourUTC asc".to_string()),
                    ("columns", "HourUTC,SpotPriceEUR".to_string()),
                    ("limit", "150".to_string()),
                ],
            )
            .await?;
        info!(n_records = records.len(), "fetched");
        let intervals = to_intervals(records, now.timezone());
        Ok(SpotPrices::split(&intervals, now.date_naive()))
    }
}

#[async_trait]
impl Co2Provider for Api {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn co2_regions(&self) -> &'static [Region] {
        &[Region::Dk1, Region::Dk2]
    }

    #[instrument(skip_all, fields(region = %region))]
    async fn get_co2_emissions(
        &self,
        region: Region,
        now: DateTime<Tz>,
    ) -> Result<Vec<Co2Sample>> {
        info!("fetching CO2 emissions…");
        let filter = serde_json::json!({ "PriceArea": [region.to_string()] });
        let records = self
            .get_records::<Co2Record>(
                "CO2EmisProg",
                &[
                    ("start", now.with_timezone(&Utc).date_naive().to_string()),
                    ("sort", "Minutes5UTC ASC".to_string()),
                    ("filter", filter.to_string()),
                ],
            )
            .await?;
        info!(n_records = records.len(), "fetched");
        let today = now.date_naive();
        Ok(records
            .into_iter()
            .map(|record| Co2Sample {
                value: record.emission,
                timestamp: record.minutes_5_utc.and_utc().with_timezone(&now.timezone()),
            })
            .filter(|sample| sample.timestamp.date_naive() == today)
            .collect())
    }
}

fn to_intervals(records: Vec<SpotPriceRecord>, tz: Tz) -> Vec<Interval> {
    records
        .into_iter()
        .filter_map(|record| {
            let timestamp = record.hour_utc.and_utc().with_timezone(&tz);
            if let Some(price) = record.spot_price_eur {
                Some(Interval::new(price, timestamp))
            } else {
                warn!(%timestamp, "skipped a record without a price");
                None
            }
        })
        .collect()
}

#[derive(Deserialize)]
struct Response<R> {
    records: Vec<R>,
}

#[derive(Deserialize)]
struct SpotPriceRecord {
    /// Naive UTC.
    #[serde(rename = "HourUTC")]
    hour_utc: NaiveDateTime,

    /// Euro per megawatt-hour.
    #[serde(rename = "SpotPriceEUR")]
    spot_price_eur: Option<f64>,
}

#[serde_as]
#[derive(Deserialize)]
struct Co2Record {
    #[serde(rename = "Minutes5UTC")]
    minutes_5_utc: NaiveDateTime,

    /// Grams per kilowatt-hour.
    #[serde_as(as = "serde_with::PickFirst<(_, serde_with::DisplayFromStr)>")]
    #[serde(rename = "CO2Emission")]
    emission: f64,
}
