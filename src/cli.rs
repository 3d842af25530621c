mod engine;
mod fetch;
mod run;

use clap::{Parser, Subcommand};

pub use self::{engine::EngineArgs, fetch::FetchArgs, run::RunArgs};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: keep the prices up to date and print the sensor state on every update.
    #[clap(name = "run")]
    Run(Box<RunArgs>),

    /// Fetch everything once and print the priced series.
    #[clap(name = "fetch")]
    Fetch(Box<FetchArgs>),

    /// List the supported regions and the built-in connectors serving them.
    #[clap(name = "regions")]
    Regions,

    /// List the grid operators known to the DataHub tariff connector.
    #[clap(name = "charge-owners")]
    ChargeOwners,
}
