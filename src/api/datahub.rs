//! DataHub price list on Energi Data Service: charge-owner tariffs and system surcharges.

pub mod charge_owners;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;

pub use self::charge_owners::{CHARGE_OWNERS, ChargeOwner};
use crate::{
    api::{energi_data_service, provider::TariffProvider},
    core::tariff::{HOURS_PER_DAY, HourlyTariff, SystemCharge, TariffSchedule, Validity},
    prelude::*,
    region::Region,
};

const DATASET: &str = "DatahubPricelist";

/// Price-list notes of the government surcharges.
const SYSTEM_CHARGES: [&str; 3] = ["Elafgift", "Systemtarif", "Transmissions nettarif"];

pub struct Api {
    records: energi_data_service::Api,
    owner: &'static ChargeOwner,
}

impl Api {
    pub const ID: &'static str = "datahub";

    pub fn try_new(charge_owner: &str) -> Result<Self> {
        let owner = ChargeOwner::lookup(charge_owner)
            .with_context(|| format!("unknown charge owner `{charge_owner}`"))?;
        Ok(Self { records: energi_data_service::Api::try_new()?, owner })
    }

    async fn get_price_list(&self, filter: Value) -> Result<Vec<PriceListRecord>> {
        self.records
            .get_records(
                DATASET,
                &[
                    ("filter", filter.to_string()),
                    ("sort", "ValidFrom desc".to_string()),
                    ("limit", "500".to_string()),
                ],
            )
            .await
    }
}

#[async_trait]
impl TariffProvider for Api {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn operator_name(&self) -> &str {
        self.owner.name
    }

    fn regions(&self) -> &'static [Region] {
        &[Region::Dk1, Region::Dk2]
    }

    #[instrument(skip_all, fields(owner = self.owner.name))]
    async fn get_tariffs(&self, _now: DateTime<Tz>) -> Result<TariffSchedule> {
        info!("fetching system charges…");
        let system = self
            .get_price_list(serde_json::json!({ "Note": SYSTEM_CHARGES }))
            .await?
            .into_iter()
            .filter_map(PriceListRecord::into_system_charge)
            .collect_vec();
        info!(n_system = system.len(), "fetching charge-owner tariffs…");
        let hourly = self
            .get_price_list(serde_json::json!({
                "ChargeTypeCode": self.owner.charge_type_codes,
                "GLN_Number": [self.owner.gln],
            }))
            .await?
            .into_iter()
            .filter_map(|record| match record.into_hourly_tariff() {
                Ok(tariff) => Some(tariff),
                Err(error) => {
                    warn!("skipped a price list record: {error:#}");
                    None
                }
            })
            .collect_vec();
        info!(n_hourly = hourly.len(), "fetched");
        Ok(TariffSchedule { hourly, system })
    }
}

/// `Transmissions nettarif` → `transmissions_nettarif`.
#[must_use]
pub fn slugify(text: &str) -> String {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .join("_")
}

#[derive(Deserialize)]
struct PriceListRecord {
    #[serde(rename = "ValidFrom")]
    valid_from: NaiveDateTime,

    #[serde(rename = "ValidTo")]
    valid_to: Option<NaiveDateTime>,

    #[serde(rename = "Note", default)]
    note: String,

    /// `Price1` to `Price24` among the other columns.
    #[serde(flatten)]
    columns: HashMap<String, Value>,
}

impl PriceListRecord {
    fn validity(&self) -> Validity {
        Validity {
            from: self.valid_from.date(),
            to: self.valid_to.map(|valid_to| valid_to.date()),
        }
    }

    fn price(&self, position: usize) -> Option<Option<f64>> {
        self.columns.get(&format!("Price{position}")).map(Value::as_f64)
    }

    /// Hourly prices; a missing price repeats the first one.
    fn into_hourly_tariff(self) -> Result<HourlyTariff> {
        let base = self.price(1).flatten().unwrap_or_default();
        let prices = (1..=HOURS_PER_DAY)
            .map_while(|position| self.price(position))
            .map(|price| price.unwrap_or(base))
            .collect();
        HourlyTariff::try_new(self.validity(), prices)
    }

    fn into_system_charge(self) -> Option<SystemCharge> {
        let price = self.price(1).flatten()?;
        Some(SystemCharge { name: slugify(&self.note), validity: self.validity(), price })
    }
}
