#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod cli;
mod core;
mod currency;
mod engine;
mod prelude;
mod projection;
mod region;
mod scheduler;
mod tables;
mod units;

use clap::{Parser, crate_version};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Args, Command},
    core::provider::ProviderRegistry,
    prelude::*,
    tables::{build_charge_owners_table, build_regions_table},
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .compact()
        .init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::Run(args) => {
            args.run().await?;
        }
        Command::Fetch(args) => {
            args.run().await?;
        }
        Command::Regions => {
            println!("{}", build_regions_table(&ProviderRegistry::try_builtin(0.0)?));
        }
        Command::ChargeOwners => {
            println!("{}", build_charge_owners_table());
        }
    }

    info!("done!");
    Ok(())
}
