//! [Carnot](https://carnot.dk) AI price forecast.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    api::{client, provider::ForecastProvider},
    core::interval::Interval,
    prelude::*,
    region::{Currency, Region},
};

pub struct Api {
    client: Client,
    api_key: String,
    username: String,
}

impl Api {
    pub const ID: &'static str = "carnot";

    pub fn try_new(api_key: String, username: String) -> Result<Self> {
        Ok(Self { client: client::try_new()?, api_key, username })
    }
}

#[async_trait]
impl ForecastProvider for Api {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn source_name(&self) -> &'static str {
        "Carnot"
    }

    fn default_currency(&self) -> Currency {
        Currency::Dkk
    }

    fn regions(&self) -> &'static [Region] {
        &[Region::Dk1, Region::Dk2]
    }

    /// Forecast for the days after today, in the display time zone.
    #[instrument(skip_all, fields(region = %region))]
    async fn get_forecast(&self, region: Region, now: DateTime<Tz>) -> Result<Vec<Interval>> {
        info!("fetching…");
        let response = self
            .client
            .get("https://whale-app-dquqw.ondigitalocean.app/openapi/get_predict")
            .query(&[
                ("region", region.to_string().to_lowercase().as_str()),
                ("energysource", "spotprice"),
                ("daysahead", "7"),
            ])
            .header("apikey", &self.api_key)
            .header("username", &self.username)
            .send()
            .await
            .context("failed to call")?;
        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY)
        {
            bail!("validation error ({}), check the credentials", response.status());
        }
        let response = response
            .error_for_status()
            .context("request failed")?
            .json::<Response>()
            .await
            .context("failed to deserialize the response")?;
        info!(n_predictions = response.predictions.len(), "fetched");
        Ok(response.after(now))
    }
}

#[derive(Deserialize)]
struct Response {
    predictions: Vec<Prediction>,
}

impl Response {
    fn after(self, now: DateTime<Tz>) -> Vec<Interval> {
        let today = now.date_naive();
        self.predictions
            .into_iter()
            .map(|prediction| {
                let timestamp = prediction.utc_time.and_utc().with_timezone(&now.timezone());
                Interval::new(prediction.prediction, timestamp)
            })
            .filter(|interval| interval.date() > today)
            .collect()
    }
}

#[derive(Deserialize)]
struct Prediction {
    /// Naive UTC.
    #[serde(rename = "utctime")]
    utc_time: NaiveDateTime,

    /// Danish krone per megawatt-hour.
    prediction: f64,
}
