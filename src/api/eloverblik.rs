//! [Eloverblik](https://eloverblik.dk) customer API: tariffs of a specific metering point.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate};
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    api::{client, datahub::slugify, provider::TariffProvider},
    core::tariff::{HOURS_PER_DAY, HourlyTariff, SystemCharge, TariffSchedule, Validity},
    prelude::*,
    region::Region,
};

const BASE_URL: &str = "https://api.eloverblik.dk/customerapi/api";

pub struct Api {
    client: Client,
    refresh_token: String,
    metering_point: String,
}

impl Api {
    pub const ID: &'static str = "eloverblik";

    pub fn try_new(refresh_token: String, metering_point: String) -> Result<Self> {
        Ok(Self { client: client::try_new()?, refresh_token, metering_point })
    }

    async fn call<R: DeserializeOwned>(
        &self,
        path: &str,
        bearer: &str,
        body: Option<serde_json::Value>,
    ) -> Result<R> {
        let mut request = self.client.post(format!("{BASE_URL}/{path}")).bearer_auth(bearer);
        if let Some(body) = body {
            request = request.json(&body);
        }
        request
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("request failed")?
            .json::<R>()
            .await
            .context("failed to deserialize the response")
    }

    /// Exchange the long-lived refresh token for a data access token.
    #[instrument(skip_all)]
    async fn get_access_token(&self) -> Result<String> {
        debug!("requesting an access token…");
        let response: TokenResponse = self.call("token", &self.refresh_token, None).await?;
        Ok(response.result)
    }
}

#[async_trait]
impl TariffProvider for Api {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn operator_name(&self) -> &str {
        "Eloverblik"
    }

    fn regions(&self) -> &'static [Region] {
        &[Region::Dk1, Region::Dk2]
    }

    #[instrument(skip_all, fields(metering_point = %self.metering_point))]
    async fn get_tariffs(&self, now: DateTime<Tz>) -> Result<TariffSchedule> {
        info!("fetching…");
        let access_token = self.get_access_token().await?;
        let response: ChargesResponse = self
            .call(
                "meteringpoints/meteringpoint/getcharges",
                &access_token,
                Some(serde_json::json!({
                    "meteringPoints": { "meteringPoint": [self.metering_point] },
                })),
            )
            .await?;
        let tariffs = response
            .result
            .into_iter()
            .next()
            .context("the response contains no metering point")?
            .result
            .tariffs;
        info!(n_tariffs = tariffs.len(), "fetched");
        to_schedule(tariffs, now.date_naive())
    }
}

/// Eloverblik returns what is in effect today, so every entry is valid from the start of the month.
fn to_schedule(tariffs: Vec<Tariff>, today: NaiveDate) -> Result<TariffSchedule> {
    let validity = Validity::open_ended(today.with_day(1).unwrap_or(today));
    let mut schedule = TariffSchedule::default();
    for mut tariff in tariffs {
        tariff.prices.sort_by_key(|price| price.position);
        if tariff.prices.len() == HOURS_PER_DAY {
            let prices = tariff.prices.into_iter().map(|price| price.price).collect();
            schedule.hourly.push(HourlyTariff::try_new(validity, prices)?);
        } else if let Some(price) = tariff.prices.first() {
            schedule.system.push(SystemCharge {
                name: slugify(&tariff.name),
                validity,
                price: price.price,
            });
        }
    }
    Ok(schedule)
}

#[derive(Deserialize)]
struct TokenResponse {
    result: String,
}

#[derive(Deserialize)]
struct ChargesResponse {
    result: Vec<MeteringPointResult>,
}

#[derive(Deserialize)]
struct MeteringPointResult {
    result: Charges,
}

#[derive(Deserialize)]
struct Charges {
    #[serde(default)]
    tariffs: Vec<Tariff>,
}

#[derive(Deserialize)]
struct Tariff {
    name: String,
    prices: Vec<TariffPrice>,
}

#[serde_as]
#[derive(Deserialize)]
struct TariffPrice {
    /// One-based hour, serialized as a string.
    #[serde_as(as = "serde_with::PickFirst<(_, DisplayFromStr)>")]
    position: u32,

    /// Kroner per kilowatt-hour.
    price: f64,
}
