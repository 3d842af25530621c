//! Read-only sensor views over the engine state, rounded for presentation.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    core::{interval::Interval, pricing::round_to, series::DaySeries},
    engine::{EngineConfig, PriceState},
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct HourPrice {
    pub hour: DateTime<Tz>,
    pub price: f64,
}

/// Tariffs in effect today, with VAT.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TariffAttributes {
    /// Local hour to the charge-owner tariff.
    pub tariffs: BTreeMap<u32, f64>,

    /// System surcharges by name.
    pub additional_tariffs: BTreeMap<String, f64>,
}

/// Price sensor: the current price and its attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SensorProjection {
    /// Whether the computed prices for today are present.
    pub available: bool,

    pub current_price: Option<f64>,
    pub unit: String,
    pub currency: String,
    pub region: &'static str,
    pub region_code: String,
    pub tomorrow_valid: bool,
    pub next_data_update: String,

    pub today: Option<Vec<f64>>,
    pub tomorrow: Option<Vec<f64>>,
    pub raw_today: Option<Vec<HourPrice>>,
    pub raw_tomorrow: Option<Vec<HourPrice>>,

    pub today_min: Option<HourPrice>,
    pub today_max: Option<HourPrice>,
    pub today_mean: Option<f64>,
    pub tomorrow_min: Option<HourPrice>,
    pub tomorrow_max: Option<HourPrice>,
    pub tomorrow_mean: Option<f64>,

    pub use_cent: bool,
    pub attribution: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Vec<HourPrice>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_operator: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tariffs: Option<TariffAttributes>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SensorProjection {
    #[must_use]
    pub fn new(
        state: &PriceState,
        config: &EngineConfig,
        now: &DateTime<Tz>,
        next_data_update: String,
    ) -> Self {
        let pricing = &config.pricing;
        let decimals = config.decimals;
        let round = |price: f64| round_to(price, decimals);
        let hour_price = |interval: &Interval| HourPrice {
            hour: interval.timestamp,
            price: round(interval.price),
        };
        let prices = |series: &DaySeries| -> Vec<f64> {
            series.iter().map(|interval| round(interval.price)).collect()
        };
        let raw = |intervals: &[Interval]| -> Vec<HourPrice> {
            intervals.iter().map(hour_price).collect()
        };

        let currency = pricing.display_currency();
        let unit_prefix =
            if pricing.in_cents() { currency.cent().to_string() } else { currency.to_string() };
        let today = state.today_computed.as_ref();
        let tomorrow = state.tomorrow_computed.as_ref();

        let attribution = state.source.map(|source| match state.forecast_source {
            Some(forecast) if state.predictions_computed.is_some() => {
                format!("Data sourced from {} and forecast from {}", source.name, forecast.name)
            }
            _ => format!("Data sourced from {}", source.name),
        });
        let tariffs = state.tariffs.as_ref().map(|schedule| {
            let snapshot = schedule.on(now.date_naive());
            let with_vat = |charge: f64| round(pricing.with_vat(charge));
            TariffAttributes {
                tariffs: snapshot
                    .hourly_charges
                    .into_iter()
                    .map(|(hour, charge)| (hour, with_vat(charge)))
                    .collect(),
                additional_tariffs: snapshot
                    .system_charges
                    .into_iter()
                    .map(|(name, charge)| (name, with_vat(charge)))
                    .collect(),
            }
        });

        Self {
            available: today.is_some(),
            current_price: today
                .and_then(|today| today.current(now))
                .map(|interval| round(interval.price)),
            unit: format!("{unit_prefix}/{}", pricing.unit()),
            currency: currency.to_string(),
            region: config.region.info().description,
            region_code: config.region.to_string(),
            tomorrow_valid: state.tomorrow_valid,
            next_data_update,
            today: today.map(prices),
            tomorrow: tomorrow.map(prices),
            raw_today: today.map(|today| raw(today.as_slice())),
            raw_tomorrow: tomorrow.map(|tomorrow| raw(tomorrow.as_slice())),
            today_min: today.and_then(DaySeries::min).map(hour_price),
            today_max: today.and_then(DaySeries::max).map(hour_price),
            today_mean: today.and_then(DaySeries::mean).map(round),
            tomorrow_min: tomorrow.and_then(DaySeries::min).map(hour_price),
            tomorrow_max: tomorrow.and_then(DaySeries::max).map(hour_price),
            tomorrow_mean: tomorrow.and_then(DaySeries::mean).map(round),
            use_cent: pricing.in_cents(),
            attribution,
            forecast: state.predictions_computed.as_deref().map(raw),
            net_operator: state.tariffs.as_ref().and(state.net_operator.clone()),
            tariffs,
            error: state.pricing_error.clone(),
        }
    }
}

/// CO2 sensor: the latest reading at or before «now», and the whole day by local time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Co2Projection {
    /// Grams per kilowatt-hour.
    pub state: Option<f64>,

    pub unit: &'static str,
    pub next_refresh: Option<String>,
    pub emissions: BTreeMap<String, f64>,
}

impl Co2Projection {
    #[must_use]
    pub fn new(
        state: &PriceState,
        now: &DateTime<Tz>,
        next_refresh: Option<DateTime<Tz>>,
    ) -> Self {
        let samples = state.co2.as_deref().unwrap_or_default();
        Self {
            state: samples
                .iter()
                .filter(|sample| sample.timestamp <= *now)
                .max_by_key(|sample| sample.timestamp)
                .map(|sample| sample.value),
            unit: "g/kWh",
            next_refresh: next_refresh.map(|refresh| refresh.format("%H:%M:%S").to_string()),
            emissions: samples
                .iter()
                .map(|sample| (sample.timestamp.format("%H:%M").to_string(), sample.value))
                .collect(),
        }
    }
}
