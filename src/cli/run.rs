use clap::Parser;
use reqwest::Url;
use tokio::{signal, sync::broadcast::error::RecvError};

use crate::{
    api::Heartbeat,
    cli::EngineArgs,
    engine::PriceEngine,
    prelude::*,
    scheduler::{
        Scheduler,
        triggers::{CO2_PERIOD, next_multiple},
    },
};

#[derive(Parser)]
pub struct RunArgs {
    #[clap(flatten)]
    pub engine: EngineArgs,

    /// Pinged after each daily refresh.
    #[clap(long = "heartbeat-url", env = "HEARTBEAT_URL")]
    pub heartbeat_url: Option<Url>,
}

impl RunArgs {
    pub async fn run(self) -> Result {
        let engine = self.engine.try_build_engine()?;
        let exchange_rates = self.engine.exchange_rates_upstream()?;
        if let Some(exchange_rates) = &exchange_rates {
            engine.refresh_exchange_rates(exchange_rates).await;
        }

        engine.start().await;
        print_projection(&engine).await?;
        print_co2_projection(&engine).await?;

        let mut updates = engine.subscribe();
        let mut co2_updates = engine.subscribe_co2();
        let heartbeat = Heartbeat::new(self.heartbeat_url);
        let scheduler = Scheduler::start(&engine, heartbeat, exchange_rates);
        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result.context("failed to listen for the shutdown signal")?;
                    info!("shutting down…");
                    break;
                }
                update = updates.recv() => match update {
                    Ok(()) | Err(RecvError::Lagged(_)) => print_projection(&engine).await?,
                    Err(RecvError::Closed) => break,
                },
                update = co2_updates.recv() => match update {
                    Ok(()) | Err(RecvError::Lagged(_)) => print_co2_projection(&engine).await?,
                    Err(RecvError::Closed) => break,
                },
            }
        }

        scheduler.shutdown();
        engine.unload().await;
        Ok(())
    }
}

async fn print_projection(engine: &PriceEngine) -> Result {
    let projection = engine.projection().await;
    if let Some(error) = &projection.error {
        error!("prices are unavailable: {error}");
    }
    println!("{}", serde_json::to_string(&projection)?);
    Ok(())
}

async fn print_co2_projection(engine: &PriceEngine) -> Result {
    if engine.has_co2() {
        let next_refresh = next_multiple(&engine.now(), CO2_PERIOD);
        println!("{}", serde_json::to_string(&engine.co2_projection(next_refresh).await)?);
    }
    Ok(())
}
