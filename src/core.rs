pub mod formula;
pub mod interval;
pub mod pricing;
pub mod provider;
pub mod series;
pub mod tariff;

pub use self::{
    formula::{CostFormula, Expression, FormulaError, FormulaInputs},
    interval::Interval,
    pricing::{Pricing, PricingError, PricingInputs},
    provider::ProviderRegistry,
    series::DaySeries,
    tariff::{TariffSchedule, TariffSnapshot},
};
