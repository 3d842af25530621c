use std::sync::Arc;

use serde::Serialize;

use crate::{
    api::{
        Co2Provider,
        ForecastProvider,
        SpotPriceProvider,
        TariffProvider,
        energi_data_service,
        fixed_price,
        nord_pool,
    },
    prelude::*,
    region::Region,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    #[display("spot price")]
    SpotPrice,

    #[display("CO2")]
    Co2,

    #[display("forecast")]
    Forecast,

    #[display("tariff")]
    Tariff,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConnectorInfo {
    pub name: &'static str,
    pub capability: Capability,
}

/// Connectors per capability, in registration order.
///
/// The order is the priority of the fallback chain: the first connector serving a region wins.
#[derive(Clone, Default)]
#[must_use]
pub struct ProviderRegistry {
    spot_price: Vec<Arc<dyn SpotPriceProvider>>,
    co2: Vec<Arc<dyn Co2Provider>>,
    forecast: Vec<Arc<dyn ForecastProvider>>,
    tariff: Vec<Arc<dyn TariffProvider>>,
}

impl ProviderRegistry {
    /// Register the built-in spot-price and CO2 connectors.
    pub fn try_builtin(fixed_price_per_kwh: f64) -> Result<Self> {
        let energi_data_service = Arc::new(energi_data_service::Api::try_new()?);
        Ok(Self::default()
            .with_spot_price(energi_data_service.clone())
            .with_spot_price(Arc::new(fixed_price::Api::new(fixed_price_per_kwh)))
            .with_spot_price(Arc::new(nord_pool::Api::try_new()?))
            .with_co2(energi_data_service))
    }

    pub fn with_spot_price(mut self, connector: Arc<dyn SpotPriceProvider>) -> Self {
        self.spot_price.push(connector);
        self
    }

    pub fn with_co2(mut self, connector: Arc<dyn Co2Provider>) -> Self {
        self.co2.push(connector);
        self
    }

    pub fn with_forecast(mut self, connector: Arc<dyn ForecastProvider>) -> Self {
        self.forecast.push(connector);
        self
    }

    pub fn with_tariff(mut self, connector: Arc<dyn TariffProvider>) -> Self {
        self.tariff.push(connector);
        self
    }

    pub fn spot_price_providers(
        &self,
        region: Region,
    ) -> impl Iterator<Item = &Arc<dyn SpotPriceProvider>> {
        self.spot_price.iter().filter(move |connector| connector.regions().contains(&region))
    }

    #[must_use]
    pub fn spot_price_provider(
        &self,
        region: Region,
        id: &str,
    ) -> Option<&Arc<dyn SpotPriceProvider>> {
        self.spot_price_providers(region).find(|connector| connector.id() == id)
    }

    #[must_use]
    pub fn co2_provider(&self, region: Region) -> Option<&Arc<dyn Co2Provider>> {
        self.co2.iter().find(|connector| connector.co2_regions().contains(&region))
    }

    #[must_use]
    pub fn forecast_provider(&self, region: Region) -> Option<&Arc<dyn ForecastProvider>> {
        self.forecast.iter().find(|connector| connector.regions().contains(&region))
    }

    #[must_use]
    pub fn tariff_provider(&self, region: Region) -> Option<&Arc<dyn TariffProvider>> {
        self.tariff.iter().find(|connector| connector.regions().contains(&region))
    }

    /// Every connector able to serve the region, spot prices first.
    #[must_use]
    pub fn connectors_for(&self, region: Region) -> Vec<ConnectorInfo> {
        let spot_price = self
            .spot_price_providers(region)
            .map(|connector| (connector.id(), Capability::SpotPrice));
        let co2 = self
            .co2
            .iter()
            .filter(|connector| connector.co2_regions().contains(&region))
            .map(|connector| (connector.id(), Capability::Co2));
        let forecast = self
            .forecast
            .iter()
            .filter(|connector| connector.regions().contains(&region))
            .map(|connector| (connector.id(), Capability::Forecast));
        let tariff = self
            .tariff
            .iter()
            .filter(|connector| connector.regions().contains(&region))
            .map(|connector| (connector.id(), Capability::Tariff));
        spot_price
            .chain(co2)
            .chain(forecast)
            .chain(tariff)
            .map(|(name, capability)| ConnectorInfo { name, capability })
            .collect()
    }
}
