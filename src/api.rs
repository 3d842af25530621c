pub mod carnot;
mod client;
pub mod datahub;
pub mod eloverblik;
pub mod energi_data_service;
pub mod fixed_price;
pub mod frankfurter;
pub mod heartbeat;
pub mod nord_pool;
pub mod provider;

pub use self::{
    heartbeat::Heartbeat,
    provider::{
        Co2Provider,
        Co2Sample,
        ForecastProvider,
        SpotPriceProvider,
        SpotPrices,
        TariffProvider,
    },
};
