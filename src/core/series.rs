use std::iter;

use chrono::{DateTime, DurationRound, NaiveDate, TimeDelta, TimeZone};
use chrono_tz::Tz;
use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{core::interval::Interval, prelude::*};

/// Intervals of one calendar day in the display time zone, ordered by time.
///
/// Normally 24 entries, 23 or 25 on daylight-saving transition days.
#[derive(Clone, Debug, PartialEq, derive_more::Deref, derive_more::IntoIterator)]
#[must_use]
pub struct DaySeries {
    date: NaiveDate,

    #[deref]
    #[into_iterator(owned, ref)]
    intervals: Vec<Interval>,
}

impl DaySeries {
    pub fn try_new(date: NaiveDate, mut intervals: Vec<Interval>) -> Result<Self> {
        if let Some(stray) = intervals.iter().find(|interval| interval.date() != date) {
            bail!("interval at {} does not belong to {date}", stray.timestamp);
        }
        intervals.sort_by_key(|interval| interval.timestamp);
        Ok(Self { date, intervals })
    }

    /// Pick the intervals that fall on the date, `None` when there are none.
    #[must_use]
    pub fn collect_on(date: NaiveDate, intervals: &[Interval]) -> Option<Self> {
        let intervals = intervals
            .iter()
            .filter(|interval| interval.date() == date)
            .copied()
            .sorted_by_key(|interval| interval.timestamp)
            .collect_vec();
        (!intervals.is_empty()).then_some(Self { date, intervals })
    }

    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Replace every price, keeping the timestamps.
    pub fn try_map_prices<E>(
        &self,
        mut f: impl FnMut(&Interval) -> Result<f64, E>,
    ) -> Result<Self, E> {
        let intervals = self
            .intervals
            .iter()
            .map(|interval| Ok(interval.with_price(f(interval)?)))
            .collect::<Result<_, E>>()?;
        Ok(Self { date: self.date, intervals })
    }

    /// Interval covering the instant.
    #[must_use]
    pub fn current<T: TimeZone>(&self, now: &DateTime<T>) -> Option<&Interval> {
        self.intervals.iter().find(|interval| interval.contains(now))
    }

    #[must_use]
    pub fn min(&self) -> Option<&Interval> {
        self.intervals.iter().min_by_key(|interval| OrderedFloat(interval.price))
    }

    #[must_use]
    pub fn max(&self) -> Option<&Interval> {
        self.intervals.iter().max_by_key(|interval| OrderedFloat(interval.price))
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        (!self.intervals.is_empty()).then(|| {
            self.intervals.iter().map(|interval| interval.price).sum::<f64>()
                / self.intervals.len() as f64
        })
    }
}

/// First instant of the local date: midnight, or the end of a gap that swallowed it.
#[must_use]
pub fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Tz>> {
    (0..=2).find_map(|hour| tz.from_local_datetime(&date.and_hms_opt(hour, 0, 0)?).earliest())
}

/// Starts of every local hour of the date: 23 or 25 of them on transition days.
#[must_use]
pub fn hours_of(date: NaiveDate, tz: Tz) -> Vec<DateTime<Tz>> {
    iter::successors(local_midnight(date, tz), |hour| Some(*hour + Interval::DURATION))
        .take_while(|hour| hour.date_naive() == date)
        .collect()
}

/// Average sub-hourly intervals into hourly ones.
pub fn resample_hourly(intervals: Vec<Interval>) -> Vec<Interval> {
    intervals
        .into_iter()
        .filter_map(|interval| {
            let hour = interval.timestamp.duration_trunc(TimeDelta::hours(1)).ok()?;
            Some((hour, interval.price))
        })
        .sorted_by_key(|(hour, _)| *hour)
        .chunk_by(|(hour, _)| *hour)
        .into_iter()
        .map(|(hour, prices)| {
            let (sum, count) = prices.fold((0.0, 0_u32), |(sum, count), (_, price)| {
                (sum + price, count + 1)
            });
            Interval::new(sum / f64::from(count), hour)
        })
        .collect()
}

#[cfg(test)]
pub mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{Days, Timelike, Utc};
    use chrono_tz::Europe::Copenhagen;

    use super::*;

    /// Hourly intervals covering the local date, priced by the closure over the hour index.
    pub fn hourly(date: NaiveDate, price: impl Fn(usize) -> f64) -> Vec<Interval> {
        hours_of(date, Copenhagen)
            .into_iter()
            .enumerate()
            .map(|(index, timestamp)| Interval::new(price(index), timestamp))
            .collect()
    }

    pub fn day(date: NaiveDate, price: impl Fn(usize) -> f64) -> DaySeries {
        DaySeries::try_new(date, hourly(date, price)).unwrap()
    }

    fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Tz> {
        Copenhagen.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_dst_day_lengths_ok() {
        let spring = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let autumn = NaiveDate::from_ymd_opt(2024, 10, 27).unwrap();
        let regular = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(day(spring, |_| 1.0).len(), 23);
        assert_eq!(day(autumn, |_| 1.0).len(), 25);
        assert_eq!(day(regular, |_| 1.0).len(), 24);
    }

    #[test]
    fn test_hours_of_spring_forward_ok() {
        let hours = hours_of(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(), Copenhagen);
        assert_eq!(hours.len(), 23);
        assert_eq!(hours[1].hour(), 1);
        assert_eq!(hours[2].hour(), 3);
        assert!(hours.windows(2).all(|pair| pair[1] - pair[0] == TimeDelta::hours(1)));
    }

    #[test]
    fn test_local_midnight_ok() {
        let midnight = local_midnight(NaiveDate::from_ymd_opt(2024, 10, 27).unwrap(), Copenhagen);
        assert_eq!(midnight, Some(at(2024, 10, 27, 0)));
        assert_eq!(midnight.unwrap().with_timezone(&Utc).hour(), 22);
    }

    #[test]
    fn test_try_new_rejects_foreign_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let intervals = hourly(date + Days::new(1), |_| 1.0);
        assert!(DaySeries::try_new(date, intervals).is_err());
    }

    #[test]
    fn test_collect_on_splits_days() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let tomorrow = today + Days::new(1);
        let mut intervals = hourly(tomorrow, |_| 2.0);
        intervals.extend(hourly(today, |_| 1.0));

        let series = DaySeries::collect_on(today, &intervals).unwrap();
        assert_eq!(series.len(), 24);
        assert!(series.iter().all(|interval| interval.price == 1.0));
        assert!(series.is_sorted_by_key(|interval| interval.timestamp));
        assert_eq!(series.first().unwrap().hour(), 0);

        assert_eq!(DaySeries::collect_on(tomorrow, &intervals).unwrap().len(), 24);
        assert!(DaySeries::collect_on(tomorrow + Days::new(1), &intervals).is_none());
    }

    #[test]
    fn test_statistics_ok() {
        #[expect(clippy::cast_precision_loss)]
        let series = day(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), |index| index as f64);
        assert_eq!(series.min().unwrap().hour(), 0);
        assert_eq!(series.max().unwrap().hour(), 23);
        assert_abs_diff_eq!(series.mean().unwrap(), 11.5);
    }

    #[test]
    fn test_current_ok() {
        #[expect(clippy::cast_precision_loss)]
        let series = day(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), |index| index as f64);
        let now = at(2024, 3, 15, 13) + TimeDelta::minutes(42);
        assert_abs_diff_eq!(series.current(&now).unwrap().price, 13.0);
        assert_abs_diff_eq!(series.current(&now.with_timezone(&Utc)).unwrap().price, 13.0);
        assert!(series.current(&at(2024, 3, 16, 0)).is_none());
    }

    #[test]
    fn test_resample_hourly_ok() {
        let start = at(2025, 10, 1, 0);
        let quarters = (0..8_i32)
            .map(|index| {
                Interval::new(f64::from(index), start + TimeDelta::minutes(15 * i64::from(index)))
            })
            .collect();
        let hourly = resample_hourly(quarters);
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0].timestamp, start);
        assert_abs_diff_eq!(hourly[0].price, 1.5);
        assert_abs_diff_eq!(hourly[1].price, 5.5);
    }
}
