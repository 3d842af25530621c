//! [Frankfurter](https://frankfurter.dev): reference exchange rates published by the ECB.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::Itertools;
use reqwest::Client;
use serde::Deserialize;

use crate::{api::client, currency::ExchangeRates, prelude::*, region::Currency};

const QUOTED: [Currency; 4] = [Currency::Dkk, Currency::Nok, Currency::Sek, Currency::Usd];

pub struct Api(Client);

impl Api {
    pub fn try_new() -> Result<Self> {
        Ok(Self(client::try_new()?))
    }

    #[instrument(skip_all)]
    pub async fn get_latest(&self) -> Result<ExchangeRates> {
        debug!("fetching exchange rates…");
        let response = self
            .0
            .get("https://api.frankfurter.app/latest")
            .query(&[("from", "EUR"), ("to", QUOTED.iter().join(",").as_str())])
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("request failed")?
            .json::<Response>()
            .await
            .context("failed to deserialize the response")?;
        ensure!(response.base == Currency::Eur, "unexpected base currency {}", response.base);
        Ok(ExchangeRates { date: Some(response.date), rates: response.rates })
    }
}

#[derive(Deserialize)]
struct Response {
    base: Currency,
    date: NaiveDate,
    rates: BTreeMap<Currency, f64>,
}
