use chrono::NaiveDate;

use crate::{
    api::Co2Sample,
    core::{interval::Interval, series::DaySeries, tariff::TariffSchedule},
    region::Currency,
};

/// Connector that delivered a dataset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Source {
    pub id: &'static str,
    pub name: &'static str,

    /// Currency the raw quotes are in.
    pub currency: Currency,
}

/// Canonical price state, owned by the engine.
///
/// Raw series are replaced wholesale. The computed ones are derived from them and go stale
/// whenever the raw input changes, which the `*_calculated` flags track.
#[derive(Clone, Debug, Default)]
pub struct PriceState {
    pub today: Option<DaySeries>,
    pub tomorrow: Option<DaySeries>,

    pub today_computed: Option<DaySeries>,
    pub tomorrow_computed: Option<DaySeries>,
    pub today_calculated: bool,
    pub tomorrow_calculated: bool,

    /// A provider actually delivered tomorrow's prices, as opposed to a stale carry-over.
    pub tomorrow_valid: bool,

    pub source: Option<Source>,

    pub predictions: Option<Vec<Interval>>,
    pub predictions_computed: Option<Vec<Interval>>,
    pub forecast_source: Option<Source>,

    pub tariffs: Option<TariffSchedule>,
    pub net_operator: Option<String>,

    pub co2: Option<Vec<Co2Sample>>,

    /// Last pricing failure: the computed series are unavailable until it is resolved.
    pub pricing_error: Option<String>,
}

impl PriceState {
    /// Forget the raw spot prices before a full fetch.
    pub fn reset_fetch(&mut self) {
        self.today = None;
        self.tomorrow = None;
        self.tomorrow_valid = false;
        self.invalidate();
    }

    pub fn adopt_today(&mut self, today: DaySeries, source: Source) {
        self.today = Some(today);
        self.source = Some(source);
        self.invalidate();
    }

    pub fn adopt_both(&mut self, today: DaySeries, tomorrow: DaySeries, source: Source) {
        let tomorrow_date = tomorrow.date();
        self.today = Some(today);
        self.tomorrow = Some(tomorrow);
        self.tomorrow_valid = true;
        self.source = Some(source);
        self.drop_predictions_on(tomorrow_date);
        self.invalidate();
    }

    /// Local midnight: yesterday's tomorrow becomes today, without a fetch.
    pub fn rotate(&mut self) {
        self.today = self.tomorrow.take();
        self.tomorrow_valid = false;
        self.tomorrow_computed = None;
        self.invalidate();
    }

    /// Keep the forecast days in `(today, today + n_days]`, minus tomorrow once it is confirmed.
    pub fn set_predictions(
        &mut self,
        mut predictions: Vec<Interval>,
        today: NaiveDate,
        n_days: u32,
        source: Source,
    ) {
        let last = today.checked_add_days(chrono::Days::new(n_days.into())).unwrap_or(today);
        predictions.retain(|interval| today < interval.date() && interval.date() <= last);
        predictions.sort_by_key(|interval| interval.timestamp);
        self.predictions = Some(predictions);
        self.forecast_source = Some(source);
        if self.tomorrow_valid
            && let Some(tomorrow) = self.tomorrow.as_ref().map(DaySeries::date)
        {
            self.drop_predictions_on(tomorrow);
        }
        self.invalidate();
    }

    pub fn clear_predictions(&mut self) {
        self.predictions = None;
        self.predictions_computed = None;
        self.forecast_source = None;
    }

    fn drop_predictions_on(&mut self, date: NaiveDate) {
        if let Some(predictions) = &mut self.predictions {
            predictions.retain(|interval| interval.date() != date);
        }
    }

    pub const fn invalidate(&mut self) {
        self.today_calculated = false;
        self.tomorrow_calculated = false;
    }

    #[must_use]
    pub const fn is_calculated(&self) -> bool {
        self.today_calculated && self.tomorrow_calculated
    }
}

#[cfg(test)]
mod tests {
    use chrono::Days;
    use itertools::Itertools;

    use super::*;
    use crate::core::series::tests::{day, hourly};

    const SOURCE: Source = Source { id: "test", name: "Test", currency: Currency::Eur };

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_rotate_ok() {
        let mut state = PriceState::default();
        state.adopt_both(day(date(15), |_| 1.0), day(date(16), |_| 2.0), SOURCE);
        state.today_calculated = true;
        state.tomorrow_calculated = true;

        state.rotate();
        assert_eq!(state.today.as_ref().map(DaySeries::date), Some(date(16)));
        assert!(state.tomorrow.is_none());
        assert!(!state.tomorrow_valid);
        assert!(!state.today_calculated);
        assert!(!state.tomorrow_calculated);
    }

    #[test]
    fn test_predictions_window_ok() {
        let mut state = PriceState::default();
        let predictions = (13..=20).flat_map(|day| hourly(date(day), |_| 1.0)).collect();
        state.set_predictions(predictions, date(15), 3, SOURCE);
        let dates = state
            .predictions
            .iter()
            .flatten()
            .map(Interval::date)
            .dedup()
            .collect_vec();
        assert_eq!(dates, [date(16), date(17), date(18)]);

        state.adopt_both(day(date(15), |_| 1.0), day(date(16), |_| 2.0), SOURCE);
        let first = state.predictions.as_ref().and_then(|predictions| predictions.first());
        assert_eq!(first.map(Interval::date), Some(date(16) + Days::new(1)));
    }
}
