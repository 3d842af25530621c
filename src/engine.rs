//! Price normalization engine: fetches, reconciles, retries and prices.

pub mod retry;
pub mod state;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bon::Builder;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::future::BoxFuture;
use tokio::{
    sync::{Mutex, broadcast},
    time::sleep,
};

pub use self::{
    retry::{OperationKey, RetryEntry},
    state::{PriceState, Source},
};
use crate::{
    api::{SpotPriceProvider, SpotPrices, frankfurter},
    core::{
        pricing::{Pricing, PricingError, PricingInputs},
        provider::ProviderRegistry,
        series::DaySeries,
    },
    currency::{CurrencyConverter, ExchangeRates},
    prelude::*,
    projection::{Co2Projection, SensorProjection},
    region::{Currency, Region},
    scheduler::triggers::RefreshTime,
};

/// Wall clock, replaceable in tests.
pub type Clock = fn() -> DateTime<Utc>;

#[derive(Builder, Clone)]
pub struct EngineConfig {
    pub region: Region,
    pub time_zone: Tz,
    pub pricing: Pricing,

    /// Daily refresh instant, with its jitter chosen once per install.
    pub refresh: RefreshTime,

    /// Number of forecast days shown after today.
    #[builder(default = 7)]
    pub forecast_days: u32,

    /// Decimal precision of the presented prices.
    #[builder(default = 3)]
    pub decimals: u8,
}

/// Scope of a spot-price fetch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fetch {
    /// Full fetch from a trigger: may schedule one retry when tomorrow is late.
    Scheduled,

    /// Full fetch retrying the late tomorrow: never schedules another one.
    Tomorrow,

    /// Retry of the single failed provider: adopts only what improves the state.
    Provider(&'static str),
}

#[derive(Copy, Clone, Debug)]
enum RetryTask {
    SpotPrices(Fetch),
    Co2,
    Tariffs,
}

/// One slot per operation, so that a slow fetch never overlaps with itself.
#[derive(Default)]
struct Slots {
    spot_prices: Mutex<()>,
    co2: Mutex<()>,
    forecast: Mutex<()>,
    tariffs: Mutex<()>,
}

#[derive(Default)]
struct Fetched {
    today: Option<(DaySeries, Source)>,
    both: Option<(DaySeries, DaySeries, Source)>,
}

pub struct PriceEngine {
    config: EngineConfig,
    registry: ProviderRegistry,
    converter: Arc<CurrencyConverter>,
    clock: Clock,
    state: Mutex<PriceState>,
    retries: Mutex<retry::RetryState>,
    slots: Slots,
    unloading: AtomicBool,
    updates: broadcast::Sender<()>,
    co2_updates: broadcast::Sender<()>,
}

impl PriceEngine {
    pub fn new(
        config: EngineConfig,
        registry: ProviderRegistry,
        converter: Arc<CurrencyConverter>,
    ) -> Self {
        Self {
            config,
            registry,
            converter,
            clock: Utc::now,
            state: Mutex::default(),
            retries: Mutex::default(),
            slots: Slots::default(),
            unloading: AtomicBool::new(false),
            updates: broadcast::Sender::new(16),
            co2_updates: broadcast::Sender::new(16),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Tz> {
        (self.clock)().with_timezone(&self.config.time_zone)
    }

    /// «Data updated» notifications: re-read the state on each.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.updates.subscribe()
    }

    #[must_use]
    pub fn subscribe_co2(&self) -> broadcast::Receiver<()> {
        self.co2_updates.subscribe()
    }

    #[must_use]
    pub fn has_co2(&self) -> bool {
        self.registry.co2_provider(self.config.region).is_some()
    }

    #[must_use]
    pub fn has_forecast(&self) -> bool {
        self.registry.forecast_provider(self.config.region).is_some()
    }

    /// Today's daily refresh as a local `HH:MM:SS`.
    #[must_use]
    pub fn next_data_refresh(&self) -> String {
        self.config.refresh.local_time(&self.now())
    }

    pub async fn snapshot(&self) -> PriceState {
        self.state.lock().await.clone()
    }

    pub async fn retry_entry(&self, key: &OperationKey) -> Option<RetryEntry> {
        self.retries.lock().await.get(key)
    }

    #[must_use]
    pub fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::SeqCst)
    }

    /// Price sensor view, recomputing first if the raw input changed since the last pass.
    pub async fn projection(&self) -> SensorProjection {
        let mut state = self.state.lock().await;
        if !state.is_calculated() {
            self.recompute(&mut state);
        }
        SensorProjection::new(&state, &self.config, &self.now(), self.next_data_refresh())
    }

    pub async fn co2_projection(&self, next_refresh: Option<DateTime<Tz>>) -> Co2Projection {
        Co2Projection::new(&*self.state.lock().await, &self.now(), next_refresh)
    }

    /// Start-up fetches: spot prices, CO2, tariffs and the forecast.
    pub async fn start(self: &Arc<Self>) {
        self.update().await;
        self.update_co2().await;
        self.fetch_tariffs().await;
        self.update_forecast().await;
    }

    /// Daily refresh: tomorrow's prices, then the forecast and the tariffs.
    pub async fn refresh(self: &Arc<Self>) {
        self.update().await;
        self.update_forecast().await;
        self.fetch_tariffs().await;
    }

    pub async fn update(self: &Arc<Self>) {
        self.fetch_spot_prices(Fetch::Scheduled).await;
    }

    /// Walk the spot-price connectors in priority order.
    ///
    /// A full fetch starts from empty series; the first non-empty today is adopted,
    /// and a connector that also has tomorrow wins outright.
    #[instrument(skip_all, fields(region = %self.config.region, fetch = ?fetch))]
    pub async fn fetch_spot_prices(self: &Arc<Self>, fetch: Fetch) {
        let region = self.config.region;
        let (_slot, connectors): (_, Vec<Arc<dyn SpotPriceProvider>>) = match fetch {
            Fetch::Provider(id) => {
                // A full fetch in progress queries this provider anyway.
                let Ok(slot) = self.slots.spot_prices.try_lock() else {
                    debug!("a full fetch is running, skipping the retry");
                    return;
                };
                let connectors =
                    self.registry.spot_price_provider(region, id).into_iter().cloned().collect();
                (slot, connectors)
            }
            Fetch::Scheduled | Fetch::Tomorrow => {
                let slot = match self.slots.spot_prices.try_lock() {
                    Ok(slot) => slot,
                    Err(_) => {
                        debug!("waiting for the running fetch…");
                        self.slots.spot_prices.lock().await
                    }
                };
                self.state.lock().await.reset_fetch();
                (slot, self.registry.spot_price_providers(region).cloned().collect())
            }
        };
        if connectors.is_empty() {
            warn!("no spot price connector serves the region");
            return;
        }
        let now = self.now();

        let mut fetched = Fetched::default();
        for connector in connectors {
            let key = OperationKey::spot_price(connector.id());
            let result = connector.get_spot_prices(region, now).await;
            let SpotPrices { today, tomorrow } = match result {
                Ok(prices) => {
                    self.clear_retry(&key).await;
                    prices
                }
                Err(error) => {
                    warn!(provider = connector.id(), "failed to fetch the spot prices: {error:#}");
                    let task = RetryTask::SpotPrices(Fetch::Provider(connector.id()));
                    self.schedule_retry(key, task).await;
                    continue;
                }
            };
            let source = Source {
                id: connector.id(),
                name: connector.source_name(),
                currency: connector.default_currency(),
            };
            let tomorrow = tomorrow.filter(|tomorrow| {
                let is_accepted = connector.accepts_tomorrow(tomorrow);
                if !is_accepted {
                    let n_intervals = tomorrow.len();
                    info!(provider = source.id, n_intervals, "tomorrow is incomplete");
                }
                is_accepted
            });
            match (today, tomorrow) {
                (Some(today), Some(tomorrow)) => {
                    info!(provider = source.id, "got today and tomorrow");
                    fetched.both = Some((today, tomorrow, source));
                    break;
                }
                (Some(today), None) => {
                    if fetched.today.is_none() {
                        info!(provider = source.id, "got today");
                        fetched.today = Some((today, source));
                    }
                }
                (None, _) => {
                    debug!(provider = source.id, "no prices for today");
                }
            }
        }

        let is_tomorrow_missing = {
            let mut state = self.state.lock().await;
            if let Some((today, tomorrow, source)) = fetched.both {
                if state.tomorrow.is_none() {
                    state.adopt_both(today, tomorrow, source);
                }
            } else if let Some((today, source)) = fetched.today
                && state.today.is_none()
            {
                state.adopt_today(today, source);
            }
            self.recompute(&mut state);
            state.tomorrow.is_none()
        };
        self.notify();

        if !is_tomorrow_missing {
            self.clear_retry(&OperationKey::tomorrow()).await;
        } else if fetch != Fetch::Scheduled {
            debug!("still no prices for tomorrow, deferring to the next trigger");
        } else if self.config.refresh.has_passed(&now) {
            info!("tomorrow's prices are late");
            self.schedule_retry(OperationKey::tomorrow(), RetryTask::SpotPrices(Fetch::Tomorrow))
                .await;
        } else {
            debug!("no prices for tomorrow before the publication time, not retrying");
        }
    }

    #[instrument(skip_all, fields(region = %self.config.region))]
    pub async fn update_co2(self: &Arc<Self>) {
        let Some(connector) = self.registry.co2_provider(self.config.region).cloned() else {
            return;
        };
        let Ok(_slot) = self.slots.co2.try_lock() else {
            debug!("already fetching");
            return;
        };
        let key = OperationKey::co2(connector.id());
        match connector.get_co2_emissions(self.config.region, self.now()).await {
            Ok(samples) => {
                self.clear_retry(&key).await;
                info!(n_samples = samples.len(), "updated CO2 emissions");
                self.state.lock().await.co2 = (!samples.is_empty()).then_some(samples);
                let _ = self.co2_updates.send(());
            }
            Err(error) => {
                warn!("failed to fetch the CO2 emissions: {error:#}");
                self.schedule_retry(key, RetryTask::Co2).await;
            }
        }
    }

    /// Refresh the forecast. Failures only hide it, they never affect the spot prices.
    #[instrument(skip_all, fields(region = %self.config.region))]
    pub async fn update_forecast(&self) {
        let Some(connector) = self.registry.forecast_provider(self.config.region).cloned() else {
            return;
        };
        let Ok(_slot) = self.slots.forecast.try_lock() else {
            debug!("already fetching");
            return;
        };
        let now = self.now();
        let result = connector.get_forecast(self.config.region, now).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(predictions) => {
                let source = Source {
                    id: connector.id(),
                    name: connector.source_name(),
                    currency: connector.default_currency(),
                };
                let n_days = self.config.forecast_days;
                state.set_predictions(predictions, now.date_naive(), n_days, source);
                self.recompute(&mut state);
            }
            Err(error) => {
                warn!("forecast is unavailable: {error:#}");
                state.clear_predictions();
            }
        }
        drop(state);
        self.notify();
    }

    /// Fetch the tariffs. A schedule without a full hourly table for today keeps the previous one.
    #[instrument(skip_all, fields(region = %self.config.region))]
    pub async fn fetch_tariffs(self: &Arc<Self>) {
        let Some(connector) = self.registry.tariff_provider(self.config.region).cloned() else {
            return;
        };
        let Ok(_slot) = self.slots.tariffs.try_lock() else {
            debug!("already fetching");
            return;
        };
        let now = self.now();
        let key = OperationKey::tariff(connector.id());
        let schedule = match connector.get_tariffs(now).await {
            Ok(schedule) => {
                self.clear_retry(&key).await;
                schedule
            }
            Err(error) => {
                warn!("failed to fetch the tariffs: {error:#}");
                self.schedule_retry(key, RetryTask::Tariffs).await;
                return;
            }
        };
        match schedule.validate_on(now.date_naive()) {
            Ok(schedule) => {
                let mut state = self.state.lock().await;
                state.tariffs = Some(schedule);
                state.net_operator = Some(connector.operator_name().to_string());
                state.invalidate();
                self.recompute(&mut state);
                info!("adopted the tariffs");
            }
            Err(error) => {
                warn!("rejected the tariffs, keeping the previous ones: {error:#}");
                return;
            }
        }
        self.notify();
    }

    /// Local midnight: rotate tomorrow into today, then refresh CO2.
    #[instrument(skip_all, fields(region = %self.config.region))]
    pub async fn new_day(self: &Arc<Self>) {
        let has_today = {
            let mut state = self.state.lock().await;
            state.rotate();
            state.today.is_some()
        };
        info!(has_today, "rotated");
        self.notify();
        if !has_today {
            self.update().await;
        }
        self.update_co2().await;
    }

    /// Top of the hour: the current interval moves on, no data is fetched.
    pub async fn new_hour(&self) {
        {
            let mut state = self.state.lock().await;
            if !state.is_calculated() {
                self.recompute(&mut state);
            }
        }
        self.notify();
    }

    /// Re-signal the CO2 consumers, whose series has a five-minute resolution.
    pub fn tick(&self) {
        let _ = self.co2_updates.send(());
    }

    /// Replace the exchange rates from upstream. A failure keeps the current table.
    pub async fn refresh_exchange_rates(&self, upstream: &frankfurter::Api) {
        match upstream.get_latest().await {
            Ok(rates) => {
                info!(date = ?rates.date, "refreshed the exchange rates");
                self.replace_exchange_rates(rates).await;
            }
            Err(error) => {
                warn!("failed to refresh the exchange rates: {error:#}");
            }
        }
    }

    pub async fn replace_exchange_rates(&self, rates: ExchangeRates) {
        self.converter.replace(rates);
        let mut state = self.state.lock().await;
        state.invalidate();
        self.recompute(&mut state);
        drop(state);
        self.notify();
    }

    /// Cancel every pending retry. Retries firing afterwards are no-ops.
    pub async fn unload(&self) {
        self.unloading.store(true, Ordering::SeqCst);
        let mut retries = self.retries.lock().await;
        let n_pending = retries.n_pending();
        retries.cancel_all();
        info!(n_pending, "unloaded");
    }

    fn notify(&self) {
        let _ = self.updates.send(());
    }

    /// Reprice every raw series from scratch. A failure leaves the computed series absent.
    fn recompute(&self, state: &mut PriceState) {
        match self.try_recompute(state) {
            Ok(()) => {
                state.pricing_error = None;
            }
            Err(error) => {
                error!("failed to compute the prices: {error}");
                state.today_computed = None;
                state.tomorrow_computed = None;
                state.predictions_computed = None;
                state.pricing_error = Some(error.to_string());
            }
        }
        state.today_calculated = true;
        state.tomorrow_calculated = true;
    }

    fn try_recompute(&self, state: &mut PriceState) -> Result<(), PricingError> {
        let pricing = &self.config.pricing;
        let rates = self.converter.snapshot();
        let spot = PricingInputs {
            source_currency: state.source.map_or(Currency::None, |source| source.currency),
            rates: &rates,
            tariffs: state.tariffs.as_ref(),
        };
        let forecast = PricingInputs {
            source_currency: state.forecast_source.map_or(Currency::None, |source| source.currency),
            ..spot
        };
        let today = state.today.as_ref().map(|raw| pricing.price_series(raw, spot)).transpose()?;
        let tomorrow =
            state.tomorrow.as_ref().map(|raw| pricing.price_series(raw, spot)).transpose()?;
        let predictions = state
            .predictions
            .as_deref()
            .map(|raw| pricing.price_all(raw, forecast))
            .transpose()?;
        state.today_computed = today;
        state.tomorrow_computed = tomorrow;
        state.predictions_computed = predictions;
        Ok(())
    }

    async fn clear_retry(&self, key: &OperationKey) {
        self.retries.lock().await.clear(key);
    }

    async fn schedule_retry(self: &Arc<Self>, key: OperationKey, task: RetryTask) {
        if self.is_unloading() {
            debug!(%key, "unloading, not scheduling a retry");
            return;
        }
        let mut retries = self.retries.lock().await;
        if self.is_unloading() {
            return;
        }
        let delay = retries.record_failure(&key);
        warn!(%key, delay_minutes = delay.as_secs() / 60, "scheduled a retry");
        let engine = Arc::downgrade(self);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(engine) = engine.upgrade() {
                engine.run_retry(timer_key, task).await;
            }
        });
        retries.arm(key, timer.abort_handle());
    }

    fn run_retry(self: Arc<Self>, key: OperationKey, task: RetryTask) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.retries.lock().await.disarm(&key);
            if self.is_unloading() {
                debug!(%key, "unloading, skipping the retry");
                return;
            }
            info!(%key, "retrying…");
            match task {
                RetryTask::SpotPrices(fetch) => self.fetch_spot_prices(fetch).await,
                RetryTask::Co2 => self.update_co2().await,
                RetryTask::Tariffs => self.fetch_tariffs().await,
            }
        })
    }
}

#[cfg(test)]
pub mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering::SeqCst},
        time::Duration,
    };

    use approx::assert_abs_diff_eq;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Europe::Copenhagen;
    use itertools::Itertools;

    use super::*;
    use crate::{
        api::{Co2Provider, Co2Sample, ForecastProvider, TariffProvider},
        core::{
            formula::Expression,
            interval::Interval,
            series::tests::{day, hourly},
            tariff::{TariffSchedule, tests::schedule},
        },
    };

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    /// Before the daily refresh at 12:17:42 UTC.
    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap()
    }

    /// After the daily refresh, when tomorrow is expected.
    fn afternoon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 13, 0, 0).unwrap()
    }

    /// Spot-price connector for 15 March 2024, with a tomorrow of `n_tomorrow` hours.
    pub struct FakeSpot {
        id: &'static str,
        has_today: bool,
        n_tomorrow: usize,
        is_failing: AtomicBool,
        is_empty: AtomicBool,
        n_calls: AtomicUsize,
    }

    impl FakeSpot {
        pub fn new(id: &'static str, has_today: bool, n_tomorrow: usize) -> Arc<Self> {
            Arc::new(Self {
                id,
                has_today,
                n_tomorrow,
                is_failing: AtomicBool::new(false),
                is_empty: AtomicBool::new(false),
                n_calls: AtomicUsize::new(0),
            })
        }

        pub fn set_failing(&self, is_failing: bool) {
            self.is_failing.store(is_failing, SeqCst);
        }

        /// Succeed without any prices.
        pub fn set_empty(&self, is_empty: bool) {
            self.is_empty.store(is_empty, SeqCst);
        }

        pub fn n_calls(&self) -> usize {
            self.n_calls.load(SeqCst)
        }
    }

    #[async_trait]
    impl SpotPriceProvider for FakeSpot {
        fn id(&self) -> &'static str {
            self.id
        }

        fn source_name(&self) -> &'static str {
            "Fake"
        }

        fn default_currency(&self) -> Currency {
            Currency::Dkk
        }

        fn regions(&self) -> &'static [Region] {
            &[Region::Dk1]
        }

        async fn get_spot_prices(&self, _region: Region, _now: DateTime<Tz>) -> Result<SpotPrices> {
            self.n_calls.fetch_add(1, SeqCst);
            ensure!(!self.is_failing.load(SeqCst), "upstream is down");
            if self.is_empty.load(SeqCst) {
                return Ok(SpotPrices::default());
            }
            let tomorrow = (self.n_tomorrow != 0).then(|| {
                let full = day(date(16), |_| 200.0);
                DaySeries::try_new(date(16), full.iter().copied().take(self.n_tomorrow).collect())
                    .unwrap()
            });
            Ok(SpotPrices { today: self.has_today.then(|| day(date(15), |_| 100.0)), tomorrow })
        }

        fn accepts_tomorrow(&self, tomorrow: &DaySeries) -> bool {
            tomorrow.len() > 20
        }
    }

    /// Hands out the queued schedules, last first, and fails when there are none left.
    pub struct FakeTariffs(std::sync::Mutex<Vec<TariffSchedule>>);

    impl FakeTariffs {
        pub fn new(queue: Vec<TariffSchedule>) -> Arc<Self> {
            Arc::new(Self(std::sync::Mutex::new(queue)))
        }

        pub fn push(&self, schedule: TariffSchedule) {
            self.0.lock().unwrap().push(schedule);
        }
    }

    #[async_trait]
    impl TariffProvider for FakeTariffs {
        fn id(&self) -> &'static str {
            "fake_tariffs"
        }

        fn operator_name(&self) -> &str {
            "Radius Elnet"
        }

        fn regions(&self) -> &'static [Region] {
            &[Region::Dk1]
        }

        async fn get_tariffs(&self, _now: DateTime<Tz>) -> Result<TariffSchedule> {
            self.0.lock().unwrap().pop().context("no more tariffs")
        }
    }

    /// Carnot-like forecast in DKK per MWh, covering 13 to 25 March 2024.
    pub struct FakeForecast {
        is_failing: AtomicBool,
        n_calls: AtomicUsize,
    }

    impl FakeForecast {
        pub fn new() -> Arc<Self> {
            Arc::new(Self { is_failing: AtomicBool::new(false), n_calls: AtomicUsize::new(0) })
        }

        pub fn set_failing(&self, is_failing: bool) {
            self.is_failing.store(is_failing, SeqCst);
        }

        pub fn n_calls(&self) -> usize {
            self.n_calls.load(SeqCst)
        }
    }

    #[async_trait]
    impl ForecastProvider for FakeForecast {
        fn id(&self) -> &'static str {
            "fake_forecast"
        }

        fn source_name(&self) -> &'static str {
            "Fake Forecast"
        }

        fn default_currency(&self) -> Currency {
            Currency::Dkk
        }

        fn regions(&self) -> &'static [Region] {
            &[Region::Dk1]
        }

        async fn get_forecast(&self, _region: Region, _now: DateTime<Tz>) -> Result<Vec<Interval>> {
            self.n_calls.fetch_add(1, SeqCst);
            ensure!(!self.is_failing.load(SeqCst), "unauthorized");
            Ok((13..=25).flat_map(|day| hourly(date(day), |_| 50.0)).collect())
        }
    }

    struct FakeCo2 {
        is_failing: AtomicBool,
    }

    #[async_trait]
    impl Co2Provider for FakeCo2 {
        fn id(&self) -> &'static str {
            "fake_co2"
        }

        fn co2_regions(&self) -> &'static [Region] {
            &[Region::Dk1]
        }

        async fn get_co2_emissions(
            &self,
            _region: Region,
            now: DateTime<Tz>,
        ) -> Result<Vec<Co2Sample>> {
            ensure!(!self.is_failing.load(SeqCst), "upstream is down");
            Ok(vec![Co2Sample { value: 120.0, timestamp: now }])
        }
    }

    pub fn engine_with(
        clock: Clock,
        formula: &str,
        registry: ProviderRegistry,
    ) -> Arc<PriceEngine> {
        let pricing = Pricing::builder()
            .display_currency(Currency::Dkk)
            .formula(Arc::new(formula.parse::<Expression>().unwrap()))
            .build();
        let config = EngineConfig::builder()
            .region(Region::Dk1)
            .time_zone(Copenhagen)
            .pricing(pricing)
            .refresh(RefreshTime::try_new(12, 17, 42).unwrap())
            .build();
        let converter = Arc::new(CurrencyConverter::new(ExchangeRates::default()));
        Arc::new(PriceEngine::new(config, registry, converter).with_clock(clock))
    }

    pub fn engine(clock: Clock, connectors: &[Arc<FakeSpot>]) -> Arc<PriceEngine> {
        let registry = connectors.iter().fold(ProviderRegistry::default(), |registry, connector| {
            registry.with_spot_price(connector.clone())
        });
        engine_with(clock, "0", registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_chain_ok() {
        let empty = FakeSpot::new("empty", false, 0);
        let backup = FakeSpot::new("backup", true, 0);
        let engine = engine(morning, &[empty.clone(), backup.clone()]);

        engine.update().await;
        let state = engine.snapshot().await;
        assert_eq!(state.today.as_ref().map(|today| today.len()), Some(24));
        assert_eq!(state.source.map(|source| source.id), Some("backup"));
        assert!(state.is_calculated());
        assert_abs_diff_eq!(state.today_computed.unwrap()[0].price, 0.1);
        assert_eq!((empty.n_calls(), backup.n_calls()), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_tomorrow_wins_ok() {
        let today_only = FakeSpot::new("today_only", true, 0);
        let complete = FakeSpot::new("complete", true, 24);
        let engine = engine(afternoon, &[today_only, complete]);

        engine.update().await;
        let state = engine.snapshot().await;
        assert_eq!(state.source.map(|source| source.id), Some("complete"));
        assert!(state.tomorrow_valid);
        assert_eq!(state.tomorrow.map(|tomorrow| tomorrow.date()), Some(date(16)));
        assert!(engine.retry_entry(&OperationKey::tomorrow()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_tomorrow_rejected() {
        let partial = FakeSpot::new("partial", true, 12);
        let engine = engine(morning, &[partial]);

        engine.update().await;
        let state = engine.snapshot().await;
        assert!(state.today.is_some());
        assert!(state.tomorrow.is_none());
        assert!(!state.tomorrow_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_and_clear_ok() {
        let flaky = FakeSpot::new("flaky", true, 0);
        flaky.set_failing(true);
        let engine = engine(morning, &[flaky.clone()]);
        let key = OperationKey::spot_price("flaky");

        engine.update().await;
        assert_eq!(
            engine.retry_entry(&key).await,
            Some(RetryEntry { attempt_count: 1, next_delay: Duration::from_secs(300) })
        );

        sleep(Duration::from_secs(301)).await;
        assert_eq!(flaky.n_calls(), 2);
        assert_eq!(
            engine.retry_entry(&key).await,
            Some(RetryEntry { attempt_count: 2, next_delay: Duration::from_secs(600) })
        );

        flaky.set_failing(false);
        sleep(Duration::from_secs(600)).await;
        assert_eq!(flaky.n_calls(), 3);
        assert!(engine.retry_entry(&key).await.is_none());
        assert!(engine.snapshot().await.today.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_targeted_retry_adopts_tomorrow_ok() {
        let flaky = FakeSpot::new("flaky", true, 24);
        flaky.set_failing(true);
        let backup = FakeSpot::new("backup", true, 0);
        let engine = engine(morning, &[flaky.clone(), backup.clone()]);

        engine.update().await;
        let state = engine.snapshot().await;
        assert_eq!(state.source.map(|source| source.id), Some("backup"));
        assert!(state.tomorrow.is_none());

        flaky.set_failing(false);
        sleep(Duration::from_secs(301)).await;
        let state = engine.snapshot().await;
        assert_eq!(state.source.map(|source| source.id), Some("flaky"));
        assert!(state.tomorrow_valid);
        assert_eq!(backup.n_calls(), 1, "only the failed connector is retried");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_tomorrow_retried_once() {
        let today_only = FakeSpot::new("today_only", true, 0);
        let engine = engine(afternoon, &[today_only.clone()]);
        let key = OperationKey::tomorrow();

        engine.update().await;
        assert_eq!(engine.retry_entry(&key).await.map(|entry| entry.attempt_count), Some(1));

        sleep(Duration::from_secs(2 * 3600)).await;
        assert_eq!(today_only.n_calls(), 2);
        assert_eq!(engine.retry_entry(&key).await.map(|entry| entry.attempt_count), Some(1));
        assert_eq!(engine.retries.lock().await.n_pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tomorrow_retry_before_publication() {
        let today_only = FakeSpot::new("today_only", true, 0);
        let engine = engine(morning, &[today_only]);
        engine.update().await;
        assert!(engine.retry_entry(&OperationKey::tomorrow()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_midnight_rotation_ok() {
        let complete = FakeSpot::new("complete", true, 24);
        let engine = engine(afternoon, &[complete.clone()]);
        engine.update().await;

        engine.new_day().await;
        let state = engine.snapshot().await;
        assert_eq!(state.today.as_ref().map(DaySeries::date), Some(date(16)));
        assert!(state.tomorrow.is_none());
        assert!(!state.tomorrow_valid);
        assert!(!state.today_calculated);
        assert!(!state.tomorrow_calculated);
        assert_eq!(complete.n_calls(), 1, "rotation does not fetch");

        engine.new_hour().await;
        assert!(engine.snapshot().await.is_calculated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unload_cancels_retries() {
        let flaky = FakeSpot::new("flaky", true, 0);
        flaky.set_failing(true);
        let engine = engine(morning, &[flaky.clone()]);

        engine.update().await;
        assert_eq!(engine.retries.lock().await.n_pending(), 1);
        engine.unload().await;
        assert_eq!(engine.retries.lock().await.n_pending(), 0);

        sleep(Duration::from_secs(3 * 3600)).await;
        assert_eq!(flaky.n_calls(), 1);

        engine.update().await;
        assert_eq!(engine.retries.lock().await.n_pending(), 0, "no retries while unloading");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pricing_error_leaves_raw_prices() {
        let connector = FakeSpot::new("spot", true, 0);
        let engine = engine_with(
            morning,
            "1 / (hour - 5)",
            ProviderRegistry::default().with_spot_price(connector),
        );

        engine.update().await;
        let state = engine.snapshot().await;
        assert!(state.today.is_some());
        assert!(state.today_computed.is_none());
        assert!(state.pricing_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_tariffs_keep_previous() {
        let tariffs = FakeTariffs::new(vec![TariffSchedule::default(), schedule()]);
        let registry = ProviderRegistry::default()
            .with_spot_price(FakeSpot::new("spot", true, 0))
            .with_tariff(tariffs);
        let engine = engine_with(morning, "0", registry);
        engine.update().await;

        engine.fetch_tariffs().await;
        let state = engine.snapshot().await;
        assert_eq!(state.tariffs, Some(schedule()));
        assert_eq!(state.net_operator.as_deref(), Some("Radius Elnet"));

        // Charge owner 0.3 at midnight, duty 0.7, system tariff 0.05.
        let price = state.today_computed.as_ref().map(|today| today[0].price);
        assert_abs_diff_eq!(price.unwrap(), 0.1 + 1.05, epsilon = 1e-12);

        engine.fetch_tariffs().await;
        assert_eq!(engine.snapshot().await.tariffs, Some(schedule()));
        assert!(engine.retry_entry(&OperationKey::tariff("fake_tariffs")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fetch_drops_previous_tomorrow() {
        let complete = FakeSpot::new("complete", true, 24);
        let engine = engine(afternoon, &[complete.clone()]);
        engine.update().await;
        assert!(engine.snapshot().await.tomorrow_valid);

        complete.set_empty(true);
        engine.update().await;
        let state = engine.snapshot().await;
        assert!(state.today.is_none());
        assert!(state.tomorrow.is_none());
        assert!(!state.tomorrow_valid);
        assert!(!engine.projection().await.available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_drops_previous_tomorrow() {
        let complete = FakeSpot::new("complete", true, 24);
        let engine = engine(afternoon, &[complete.clone()]);
        engine.update().await;

        complete.set_failing(true);
        engine.update().await;
        let state = engine.snapshot().await;
        assert!(state.tomorrow.is_none());
        assert!(!state.tomorrow_valid);
        assert!(engine.retry_entry(&OperationKey::spot_price("complete")).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_fetch_waits_for_running_one() {
        let complete = FakeSpot::new("complete", true, 24);
        let engine = engine(afternoon, &[complete.clone()]);

        let slot = engine.slots.spot_prices.lock().await;
        let update = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.update().await }
        });
        sleep(Duration::from_secs(1)).await;
        assert_eq!(complete.n_calls(), 0);

        drop(slot);
        update.await.unwrap();
        assert_eq!(complete.n_calls(), 1);
        assert!(engine.snapshot().await.tomorrow_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_retry_yields_to_running_fetch() {
        let complete = FakeSpot::new("complete", true, 24);
        let engine = engine(afternoon, &[complete.clone()]);

        let slot = engine.slots.spot_prices.lock().await;
        engine.fetch_spot_prices(Fetch::Provider("complete")).await;
        drop(slot);
        assert_eq!(complete.n_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forecast_window_ok() {
        let registry = ProviderRegistry::default()
            .with_spot_price(FakeSpot::new("complete", true, 24))
            .with_forecast(FakeForecast::new());
        let engine = engine_with(afternoon, "0", registry);
        engine.update().await;
        engine.update_forecast().await;

        let state = engine.snapshot().await;
        let dates = state
            .predictions_computed
            .iter()
            .flatten()
            .map(Interval::date)
            .dedup()
            .collect_vec();
        assert_eq!(dates, (17..=22).map(date).collect_vec());
        let first = state.predictions_computed.as_ref().and_then(|predictions| predictions.first());
        assert_abs_diff_eq!(first.unwrap().price, 0.05);
        assert_eq!(
            engine.projection().await.attribution.as_deref(),
            Some("Data sourced from Fake and forecast from Fake Forecast")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_forecast_failure_keeps_spot_prices() {
        let forecast = FakeForecast::new();
        let registry = ProviderRegistry::default()
            .with_spot_price(FakeSpot::new("complete", true, 24))
            .with_forecast(forecast.clone());
        let engine = engine_with(afternoon, "0", registry);
        engine.update().await;
        engine.update_forecast().await;

        forecast.set_failing(true);
        engine.update_forecast().await;
        let state = engine.snapshot().await;
        assert!(state.predictions.is_none());
        assert!(state.predictions_computed.is_none());
        assert!(state.forecast_source.is_none());
        assert!(state.today_computed.is_some());
        assert!(state.tomorrow_computed.is_some());
        assert!(state.tomorrow_valid);
        assert!(state.pricing_error.is_none());
        assert_eq!(engine.retries.lock().await.n_pending(), 0, "forecast is not retried");
    }

    #[tokio::test(start_paused = true)]
    async fn test_co2_failure_retried() {
        let co2 = Arc::new(FakeCo2 { is_failing: AtomicBool::new(true) });
        let registry = ProviderRegistry::default()
            .with_spot_price(FakeSpot::new("spot", true, 0))
            .with_co2(co2.clone());
        let engine = engine_with(morning, "0", registry);
        engine.update().await;
        let key = OperationKey::co2("fake_co2");

        engine.update_co2().await;
        assert_eq!(engine.retry_entry(&key).await.map(|entry| entry.attempt_count), Some(1));
        let state = engine.snapshot().await;
        assert!(state.co2.is_none());
        assert!(state.today_computed.is_some());

        co2.is_failing.store(false, SeqCst);
        sleep(Duration::from_secs(301)).await;
        assert!(engine.retry_entry(&key).await.is_none());
        assert_eq!(engine.snapshot().await.co2.map(|samples| samples.len()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tariff_failure_retried() {
        let tariffs = FakeTariffs::new(Vec::new());
        let registry = ProviderRegistry::default()
            .with_spot_price(FakeSpot::new("spot", true, 0))
            .with_tariff(tariffs.clone());
        let engine = engine_with(morning, "0", registry);
        engine.update().await;
        let key = OperationKey::tariff("fake_tariffs");

        engine.fetch_tariffs().await;
        assert_eq!(engine.retry_entry(&key).await.map(|entry| entry.attempt_count), Some(1));
        assert!(engine.snapshot().await.tariffs.is_none());

        tariffs.push(schedule());
        sleep(Duration::from_secs(301)).await;
        assert!(engine.retry_entry(&key).await.is_none());
        assert_eq!(engine.snapshot().await.tariffs, Some(schedule()));
    }
}
