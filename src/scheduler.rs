//! Wall-clock triggers driving the engine.

pub mod triggers;

use std::{future::Future, sync::Arc};

use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use tokio::{task::JoinHandle, time::sleep};

use self::triggers::{CO2_PERIOD, FORECAST_PERIOD, TICK_PERIOD, next_midnight, next_multiple};
use crate::{
    api::{Heartbeat, frankfurter},
    engine::PriceEngine,
    prelude::*,
};

/// Running trigger tasks. Dropping the scheduler does not stop them, [`Scheduler::shutdown`] does.
pub struct Scheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn a task per trigger: midnight, hour, five-minute tick, daily refresh,
    /// and the CO2 and forecast refreshes when the region has those connectors.
    pub fn start(
        engine: &Arc<PriceEngine>,
        heartbeat: Heartbeat,
        exchange_rates: Option<frankfurter::Api>,
    ) -> Self {
        let refresh = engine.config().refresh;
        let exchange_rates = exchange_rates.map(Arc::new);

        let mut tasks = vec![
            every(engine, "midnight", next_midnight, |engine| async move {
                engine.new_day().await;
            }),
            every(
                engine,
                "hour",
                |now| next_multiple(now, TimeDelta::hours(1)),
                |engine| async move {
                    engine.new_hour().await;
                },
            ),
            every(
                engine,
                "tick",
                |now| next_multiple(now, TICK_PERIOD),
                |engine| async move {
                    engine.tick();
                },
            ),
            every(
                engine,
                "daily refresh",
                move |now| refresh.next_after(now),
                move |engine| {
                    let heartbeat = heartbeat.clone();
                    let exchange_rates = exchange_rates.clone();
                    async move {
                        if let Some(exchange_rates) = exchange_rates {
                            engine.refresh_exchange_rates(&exchange_rates).await;
                        }
                        engine.refresh().await;
                        heartbeat.send().await;
                    }
                },
            ),
        ];
        if engine.has_co2() {
            tasks.push(every(
                engine,
                "CO2",
                |now| next_multiple(now, CO2_PERIOD),
                |engine| async move {
                    engine.update_co2().await;
                },
            ));
        }
        if engine.has_forecast() {
            tasks.push(every(
                engine,
                "forecast",
                |now| next_multiple(now, FORECAST_PERIOD),
                |engine| async move {
                    engine.update_forecast().await;
                },
            ));
        }
        info!(n_triggers = tasks.len(), "scheduled");
        Self { tasks }
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Run the action at every instant the schedule yields, one at a time.
fn every<A, F>(
    engine: &Arc<PriceEngine>,
    trigger: &'static str,
    next: impl Fn(&DateTime<Tz>) -> Option<DateTime<Tz>> + Send + 'static,
    action: A,
) -> JoinHandle<()>
where
    A: Fn(Arc<PriceEngine>) -> F + Send + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        loop {
            let now = engine.now();
            let Some(at) = next(&now) else {
                error!(trigger, %now, "failed to compute the next trigger");
                break;
            };
            trace!(trigger, %at, "sleeping…");
            sleep((at - now).to_std().unwrap_or_default()).await;
            if engine.is_unloading() {
                break;
            }
            debug!(trigger, "triggered");
            action(Arc::clone(&engine)).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, time::Duration};

    use chrono::{NaiveDate, TimeZone, Utc};
    use tokio::time::Instant;

    use super::*;
    use crate::{
        core::{provider::ProviderRegistry, tariff::tests::schedule},
        engine::tests::{FakeForecast, FakeSpot, FakeTariffs, engine, engine_with},
    };

    thread_local! {
        static STARTED_AT: Cell<Option<Instant>> = const { Cell::new(None) };
    }

    /// 23:59 in Copenhagen.
    fn before_midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 22, 59, 0).unwrap()
    }

    /// 12:59 in Copenhagen at [`start_ticking`], then advancing with the paused runtime clock.
    fn ticking() -> DateTime<Utc> {
        let elapsed = STARTED_AT.get().map_or(Duration::ZERO, |started_at| started_at.elapsed());
        Utc.with_ymd_and_hms(2024, 3, 15, 11, 59, 0).unwrap()
            + TimeDelta::from_std(elapsed).unwrap()
    }

    fn start_ticking() {
        STARTED_AT.set(Some(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_midnight_rotates_ok() {
        let complete = FakeSpot::new("complete", true, 24);
        let engine = engine(before_midnight, &[complete.clone()]);
        engine.update().await;
        let scheduler = Scheduler::start(&engine, Heartbeat::default(), None);

        sleep(Duration::from_secs(61)).await;
        let state = engine.snapshot().await;
        assert_eq!(
            state.today.map(|today| today.date()),
            NaiveDate::from_ymd_opt(2024, 3, 16)
        );
        assert!(!state.tomorrow_valid);
        assert_eq!(complete.n_calls(), 1);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_unloading() {
        let complete = FakeSpot::new("complete", true, 24);
        let engine = engine(before_midnight, &[complete]);
        let scheduler = Scheduler::start(&engine, Heartbeat::default(), None);
        engine.unload().await;

        sleep(Duration::from_secs(2 * 24 * 3600)).await;
        assert!(scheduler.tasks.iter().all(JoinHandle::is_finished));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_hour_recomputes_ok() {
        start_ticking();
        let engine = engine(ticking, &[FakeSpot::new("complete", true, 24)]);
        let mut updates = engine.subscribe();
        let scheduler = Scheduler::start(&engine, Heartbeat::default(), None);

        sleep(Duration::from_secs(59)).await;
        assert!(updates.try_recv().is_err());
        assert!(!engine.snapshot().await.is_calculated());

        sleep(Duration::from_secs(2)).await;
        assert!(updates.try_recv().is_ok());
        assert!(engine.snapshot().await.is_calculated());
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_refresh_ok() {
        start_ticking();
        let complete = FakeSpot::new("complete", true, 24);
        let registry = ProviderRegistry::default()
            .with_spot_price(complete.clone())
            .with_tariff(FakeTariffs::new(vec![schedule()]));
        let engine = engine_with(ticking, "0", registry);
        let scheduler = Scheduler::start(&engine, Heartbeat::default(), None);

        // 12:17 UTC, the refresh is due at 12:17:42.
        sleep(Duration::from_secs(18 * 60)).await;
        assert_eq!(complete.n_calls(), 0);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(complete.n_calls(), 1);
        let state = engine.snapshot().await;
        assert!(state.tomorrow_valid);
        assert_eq!(state.tariffs, Some(schedule()));
        assert_eq!(state.net_operator.as_deref(), Some("Radius Elnet"));
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_forecast_every_half_hour() {
        start_ticking();
        let forecast = FakeForecast::new();
        let registry = ProviderRegistry::default().with_forecast(forecast.clone());
        let engine = engine_with(ticking, "0", registry);
        let scheduler = Scheduler::start(&engine, Heartbeat::default(), None);

        sleep(Duration::from_secs(61)).await;
        assert_eq!(forecast.n_calls(), 1);
        assert!(engine.snapshot().await.predictions.is_some());

        // The daily refresh at 12:17:42 fetches it as well.
        sleep(Duration::from_secs(28 * 60)).await;
        assert_eq!(forecast.n_calls(), 2);

        sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(forecast.n_calls(), 3);
        scheduler.shutdown();
    }
}
