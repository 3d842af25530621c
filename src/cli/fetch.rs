use clap::Parser;

use crate::{
    cli::EngineArgs,
    core::interval::Interval,
    prelude::*,
    scheduler::triggers::{CO2_PERIOD, next_multiple},
    tables::build_prices_table,
};

#[derive(Parser)]
pub struct FetchArgs {
    #[clap(flatten)]
    pub engine: EngineArgs,

    /// Also print the sensor state as JSON.
    #[clap(long)]
    pub json: bool,
}

impl FetchArgs {
    /// Forced refresh: the start-up fetches, once.
    pub async fn run(self) -> Result {
        let engine = self.engine.try_build_engine()?;
        if let Some(exchange_rates) = self.engine.exchange_rates_upstream()? {
            engine.refresh_exchange_rates(&exchange_rates).await;
        }
        engine.start().await;

        let projection = engine.projection().await;
        let state = engine.snapshot().await;
        let series: [(&str, Option<&[Interval]>); 3] = [
            ("today", state.today_computed.as_ref().map(|today| today.as_slice())),
            ("tomorrow", state.tomorrow_computed.as_ref().map(|tomorrow| tomorrow.as_slice())),
            ("forecast", state.predictions_computed.as_deref()),
        ];
        for (title, intervals) in series {
            if let Some(intervals) = intervals {
                info!(n_intervals = intervals.len(), unit = %projection.unit, "{title}");
                println!("{}", build_prices_table(intervals, self.engine.decimals));
            }
        }
        if let Some(error) = &projection.error {
            error!("prices are unavailable: {error}");
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&projection)?);
            if engine.has_co2() {
                let next_refresh = next_multiple(&engine.now(), CO2_PERIOD);
                let co2 = engine.co2_projection(next_refresh).await;
                println!("{}", serde_json::to_string_pretty(&co2)?);
            }
        }

        engine.unload().await;
        Ok(())
    }
}
