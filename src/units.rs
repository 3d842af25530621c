use serde::{Deserialize, Serialize};

/// Multiplier applied when prices are displayed in cents (øre, öre) instead of whole units.
pub const CENT_MULTIPLIER: f64 = 100.0;

/// Display unit of energy. Upstream prices are quoted per megawatt-hour.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum EnergyUnit {
    #[display("MWh")]
    #[value(name = "MWh")]
    #[serde(rename = "MWh")]
    MegawattHour,

    #[default]
    #[display("kWh")]
    #[value(name = "kWh")]
    #[serde(rename = "kWh")]
    KilowattHour,

    #[display("Wh")]
    #[value(name = "Wh")]
    #[serde(rename = "Wh")]
    WattHour,
}

impl EnergyUnit {
    /// Divisor that rescales a per-MWh price into this unit.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::MegawattHour => 1.0,
            Self::KilowattHour => 1_000.0,
            Self::WattHour => 1_000_000.0,
        }
    }
}
