//! Wall-clock trigger points. Pure functions of «now», safe across daylight-saving transitions.

use chrono::{DateTime, Days, DurationRound, NaiveDate, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{core::series::local_midnight, prelude::*};

pub const FORECAST_PERIOD: TimeDelta = TimeDelta::minutes(30);
pub const CO2_PERIOD: TimeDelta = TimeDelta::hours(1);
pub const TICK_PERIOD: TimeDelta = TimeDelta::minutes(5);

/// Daily data refresh: a fixed UTC hour with a per-install minute and second.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RefreshTime {
    hour_utc: u32,
    minute: u32,
    second: u32,
}

impl RefreshTime {
    pub fn try_new(hour_utc: u32, minute: u32, second: u32) -> Result<Self> {
        ensure!(hour_utc < 24, "refresh hour must be within 0-23, got {hour_utc}");
        ensure!(minute < 60 && second < 60, "invalid refresh minute or second");
        Ok(Self { hour_utc, minute, second })
    }

    /// Pick the minute in 5-40 and the second at random, to spread the load on the upstream.
    pub fn with_jitter(hour_utc: u32) -> Result<Self> {
        Self::try_new(hour_utc, fastrand::u32(5..=40), fastrand::u32(0..60))
    }

    /// Refresh instant belonging to the local calendar date.
    #[must_use]
    pub fn on(self, date: NaiveDate) -> Option<DateTime<Utc>> {
        Some(date.and_hms_opt(self.hour_utc, self.minute, self.second)?.and_utc())
    }

    /// Whether «now» is past today's refresh instant, so tomorrow's prices should be out.
    #[must_use]
    pub fn has_passed(self, now: &DateTime<Tz>) -> bool {
        self.on(now.date_naive()).is_some_and(|refresh| refresh <= *now)
    }

    #[must_use]
    pub fn next_after(self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let today = now.date_naive();
        [today, today.checked_add_days(Days::new(1))?]
            .into_iter()
            .filter_map(|date| self.on(date))
            .find(|refresh| refresh > now)
            .map(|refresh| refresh.with_timezone(&now.timezone()))
    }

    /// Today's refresh as a local `HH:MM:SS`.
    #[must_use]
    pub fn local_time(self, now: &DateTime<Tz>) -> String {
        self.on(now.date_naive())
            .map(|refresh| refresh.with_timezone(&now.timezone()).format("%H:%M:%S").to_string())
            .unwrap_or_default()
    }
}

/// Start of the next local calendar day.
#[must_use]
pub fn next_midnight(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    local_midnight(now.date_naive().checked_add_days(Days::new(1))?, now.timezone())
}

/// Next multiple of the period, aligned in UTC: whole hours and minutes stay aligned in any zone.
#[must_use]
pub fn next_multiple(now: &DateTime<Tz>, period: TimeDelta) -> Option<DateTime<Tz>> {
    let start = now.with_timezone(&Utc).duration_trunc(period).ok()?;
    Some((start + period).with_timezone(&now.timezone()))
}
