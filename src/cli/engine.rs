use std::{path::PathBuf, sync::Arc};

use chrono_tz::Tz;
use clap::Parser;

use crate::{
    api::{carnot, datahub, eloverblik, frankfurter},
    core::{formula::Expression, pricing::Pricing, provider::ProviderRegistry},
    currency::{CurrencyConverter, ExchangeRates},
    engine::{EngineConfig, PriceEngine},
    prelude::*,
    region::{Currency, Region},
    scheduler::triggers::RefreshTime,
    units::EnergyUnit,
};

/// Everything the engine is configured with.
#[derive(Parser)]
pub struct EngineArgs {
    /// Bidding zone: a code like `DK1`, or its description like `West of the great belt`.
    #[clap(long, env = "REGION", value_parser = parse_region)]
    pub region: Region,

    /// Include the region's VAT.
    #[clap(long = "vat", env = "VAT")]
    pub with_vat: bool,

    /// Display currency, the region's own by default.
    #[clap(long, env = "CURRENCY")]
    pub currency: Option<Currency>,

    #[clap(long, env = "UNIT", default_value = "kWh")]
    pub unit: EnergyUnit,

    /// Show prices in cents (øre, öre).
    #[clap(long = "in-cents", env = "IN_CENTS")]
    pub in_cents: bool,

    #[clap(long, env = "DECIMALS", default_value = "3")]
    pub decimals: u8,

    /// Additional cost per unit, for example `if(hour >= 17 and hour < 21, 0.6, 0.2)`.
    ///
    /// Variables: `current_price`, `current_tariff`, `el_afgift`, `chargeowner_tariff`,
    /// `hour`, `minute`, `weekday`, `day`, `month`, `year`.
    #[clap(long = "cost-formula", env = "COST_FORMULA", default_value = "0")]
    pub formula: Expression,

    /// Display time zone (IANA name).
    #[clap(long = "time-zone", env = "TIME_ZONE", default_value = "Europe/Copenhagen")]
    pub time_zone: Tz,

    /// Price per kilowatt-hour for the `FIXED` region.
    #[clap(long = "fixed-price", env = "FIXED_PRICE", default_value = "0")]
    pub fixed_price: f64,

    /// VAT percent for the `FIXED` region.
    #[clap(long = "fixed-price-vat-percent", env = "FIXED_PRICE_VAT_PERCENT", default_value = "0")]
    pub fixed_price_vat_percent: f64,

    /// Hour (UTC) of the daily refresh, when tomorrow's prices are expected.
    #[clap(long = "refresh-hour-utc", env = "REFRESH_HOUR_UTC", default_value = "12")]
    pub refresh_hour_utc: u32,

    /// TOML table of exchange rates per euro, replacing the built-in one.
    #[clap(long = "exchange-rates-path", env = "EXCHANGE_RATES_PATH")]
    pub exchange_rates_path: Option<PathBuf>,

    /// Refresh the exchange rates daily from Frankfurter (ECB reference rates).
    #[clap(long = "fetch-exchange-rates", env = "FETCH_EXCHANGE_RATES")]
    pub fetch_exchange_rates: bool,

    #[clap(flatten)]
    pub forecast: ForecastArgs,

    #[clap(flatten)]
    pub tariffs: TariffArgs,
}

#[derive(Parser)]
pub struct ForecastArgs {
    /// Show the Carnot price forecast.
    #[clap(id = "forecast", long = "forecast", env = "FORECAST")]
    pub is_enabled: bool,

    #[clap(long = "carnot-api-key", env = "CARNOT_API_KEY")]
    pub api_key: Option<String>,

    #[clap(long = "carnot-username", env = "CARNOT_USERNAME")]
    pub username: Option<String>,

    /// Number of forecast days after today.
    #[clap(long = "forecast-days", env = "FORECAST_DAYS", default_value = "7")]
    pub n_days: u32,
}

#[derive(Parser)]
pub struct TariffArgs {
    /// Add the grid tariffs to the prices.
    #[clap(id = "tariffs", long = "tariffs", env = "TARIFFS")]
    pub is_enabled: bool,

    /// DataHub charge owner, see `charge-owners`.
    #[clap(long = "charge-owner", env = "CHARGE_OWNER")]
    pub charge_owner: Option<String>,

    /// Eloverblik refresh token: the tariffs of the metering point are used instead of DataHub.
    #[clap(long = "eloverblik-refresh-token", env = "ELOVERBLIK_REFRESH_TOKEN")]
    pub refresh_token: Option<String>,

    #[clap(long = "eloverblik-metering-point", env = "ELOVERBLIK_METERING_POINT")]
    pub metering_point: Option<String>,
}

fn parse_region(value: &str) -> Result<Region> {
    Region::lookup(value).with_context(|| format!("unknown region `{value}`"))
}

impl EngineArgs {
    /// Display currency. An override that differs from the region's currency wins, with a warning.
    pub fn display_currency(&self) -> Currency {
        let official = self.region.info().currency;
        match self.currency {
            Some(currency) if currency != official => {
                warn!(
                    %currency,
                    %official,
                    region = %self.region,
                    "display currency differs from the region's",
                );
                currency
            }
            Some(currency) => currency,
            None => official,
        }
    }

    /// VAT as a fraction, zero when not shown.
    pub fn vat(&self) -> f64 {
        match (self.with_vat, self.region) {
            (false, _) => 0.0,
            (true, Region::Fixed) => self.fixed_price_vat_percent / 100.0,
            (true, region) => region.info().vat,
        }
    }

    pub fn validate(&self) -> Result {
        ensure!(self.decimals <= 10, "at most 10 decimals are supported");
        ensure!(self.fixed_price.is_finite(), "fixed price must be a number");
        ensure!(
            (0.0..100.0).contains(&self.fixed_price_vat_percent),
            "fixed price VAT must be a percentage"
        );
        ensure!((1..=7).contains(&self.forecast.n_days), "forecast covers 1 to 7 days");
        if self.forecast.is_enabled {
            ensure!(
                self.forecast.api_key.is_some() && self.forecast.username.is_some(),
                "forecast requires the Carnot API key and username"
            );
        }
        if self.tariffs.is_enabled {
            let has_eloverblik =
                self.tariffs.refresh_token.is_some() && self.tariffs.metering_point.is_some();
            ensure!(
                has_eloverblik || self.tariffs.charge_owner.is_some(),
                "tariffs require a charge owner, or the Eloverblik refresh token and metering point"
            );
        }
        Ok(())
    }

    pub fn build_registry(&self) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::try_builtin(self.fixed_price)?;
        if self.forecast.is_enabled
            && let Some(api_key) = &self.forecast.api_key
            && let Some(username) = &self.forecast.username
        {
            let carnot = carnot::Api::try_new(api_key.clone(), username.clone())?;
            registry = registry.with_forecast(Arc::new(carnot));
        }
        if self.tariffs.is_enabled {
            registry = match (
                &self.tariffs.refresh_token,
                &self.tariffs.metering_point,
                &self.tariffs.charge_owner,
            ) {
                (Some(refresh_token), Some(metering_point), _) => {
                    registry.with_tariff(Arc::new(eloverblik::Api::try_new(
                        refresh_token.clone(),
                        metering_point.clone(),
                    )?))
                }
                (_, _, Some(charge_owner)) => {
                    registry.with_tariff(Arc::new(datahub::Api::try_new(charge_owner)?))
                }
                _ => bail!("no tariff connector is configured"),
            };
            if registry.tariff_provider(self.region).is_none() {
                warn!(region = %self.region, "tariffs are not available in the region");
            }
        }
        if self.forecast.is_enabled && registry.forecast_provider(self.region).is_none() {
            warn!(region = %self.region, "forecast is not available in the region");
        }
        Ok(registry)
    }

    #[instrument(skip_all, fields(region = %self.region))]
    pub fn try_build_engine(&self) -> Result<Arc<PriceEngine>> {
        self.validate()?;
        let rates = match &self.exchange_rates_path {
            Some(path) => ExchangeRates::read_from(path)?,
            None => ExchangeRates::default(),
        };
        let pricing = Pricing::builder()
            .display_currency(self.display_currency())
            .vat(self.vat())
            .unit(self.unit)
            .in_cents(self.in_cents)
            .formula(Arc::new(self.formula.clone()))
            .build();
        let refresh = RefreshTime::with_jitter(self.refresh_hour_utc)?;
        let config = EngineConfig::builder()
            .region(self.region)
            .time_zone(self.time_zone)
            .pricing(pricing)
            .refresh(refresh)
            .forecast_days(self.forecast.n_days)
            .decimals(self.decimals)
            .build();
        let registry = self.build_registry()?;
        let now = chrono::Utc::now().with_timezone(&self.time_zone);
        info!(refresh_at = %refresh.local_time(&now), "configured");
        Ok(Arc::new(PriceEngine::new(config, registry, Arc::new(CurrencyConverter::new(rates)))))
    }

    pub fn exchange_rates_upstream(&self) -> Result<Option<frankfurter::Api>> {
        self.fetch_exchange_rates.then(frankfurter::Api::try_new).transpose()
    }
}
