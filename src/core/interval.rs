use chrono::{DateTime, NaiveDate, TimeDelta, Timelike};
use chrono_tz::Tz;
use serde::Serialize;

/// One hour of a price, forecast or emission series.
///
/// Value type: a recomputation produces a new interval instead of patching this one.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[must_use]
pub struct Interval {
    pub price: f64,

    /// Start of the hour in the display time zone.
    #[serde(rename = "hour")]
    pub timestamp: DateTime<Tz>,
}

impl Interval {
    pub const DURATION: TimeDelta = TimeDelta::hours(1);

    pub const fn new(price: f64, timestamp: DateTime<Tz>) -> Self {
        Self { price, timestamp }
    }

    pub const fn with_price(self, price: f64) -> Self {
        Self { price, ..self }
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    #[must_use]
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    /// Whether the instant falls within this interval's hour.
    #[must_use]
    pub fn contains<T: chrono::TimeZone>(&self, instant: &DateTime<T>) -> bool {
        (self.timestamp <= *instant) && (*instant < self.timestamp + Self::DURATION)
    }
}
