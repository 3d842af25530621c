//! Bidding zones and their market metadata.

use serde::{Deserialize, Serialize};

#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[display("DKK")]
    #[value(name = "DKK")]
    Dkk,

    #[display("NOK")]
    #[value(name = "NOK")]
    Nok,

    #[display("SEK")]
    #[value(name = "SEK")]
    Sek,

    #[display("EUR")]
    #[value(name = "EUR")]
    Eur,

    #[display("USD")]
    #[value(name = "USD")]
    Usd,

    /// Prices carry no currency (fixed price setups): conversions are the identity.
    #[display("NONE")]
    #[value(name = "NONE")]
    None,
}

impl Currency {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Dkk | Self::Nok | Self::Sek => "Kr",
            Self::Eur => "€",
            Self::Usd => "$",
            Self::None => "NONE",
        }
    }

    /// Name of the hundredth part, used when prices are shown in cents.
    #[must_use]
    pub const fn cent(self) -> &'static str {
        match self {
            Self::Dkk | Self::Nok => "Øre",
            Self::Sek => "Öre",
            Self::Eur => "c",
            Self::Usd => "¢",
            Self::None => "NONE",
        }
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    #[display("DK1")]
    #[value(name = "DK1")]
    Dk1,

    #[display("DK2")]
    #[value(name = "DK2")]
    Dk2,

    #[display("FI")]
    #[value(name = "FI")]
    Fi,

    #[display("EE")]
    #[value(name = "EE")]
    Ee,

    #[display("LT")]
    #[value(name = "LT")]
    Lt,

    #[display("LV")]
    #[value(name = "LV")]
    Lv,

    #[display("NO1")]
    #[value(name = "NO1")]
    No1,

    #[display("NO2")]
    #[value(name = "NO2")]
    No2,

    #[display("NO3")]
    #[value(name = "NO3")]
    No3,

    #[display("NO4")]
    #[value(name = "NO4")]
    No4,

    #[display("NO5")]
    #[value(name = "NO5")]
    No5,

    #[display("SE1")]
    #[value(name = "SE1")]
    Se1,

    #[display("SE2")]
    #[value(name = "SE2")]
    Se2,

    #[display("SE3")]
    #[value(name = "SE3")]
    Se3,

    #[display("SE4")]
    #[value(name = "SE4")]
    Se4,

    #[display("FR")]
    #[value(name = "FR")]
    Fr,

    #[display("NL")]
    #[value(name = "NL")]
    Nl,

    #[display("BE")]
    #[value(name = "BE")]
    Be,

    #[display("AT")]
    #[value(name = "AT")]
    At,

    #[display("DE")]
    #[value(name = "DE")]
    De,

    #[display("LU")]
    #[value(name = "LU")]
    Lu,

    #[display("FIXED")]
    #[value(name = "FIXED")]
    Fixed,
}

/// Static market metadata of a region.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct RegionInfo {
    pub currency: Currency,
    pub country: &'static str,
    pub description: &'static str,

    /// VAT as a fraction, for example `0.25`.
    pub vat: f64,
}

impl Region {
    pub const ALL: [Self; 22] = [
        Self::Dk1,
        Self::Dk2,
        Self::Fi,
        Self::Ee,
        Self::Lt,
        Self::Lv,
        Self::No1,
        Self::No2,
        Self::No3,
        Self::No4,
        Self::No5,
        Self::Se1,
        Self::Se2,
        Self::Se3,
        Self::Se4,
        Self::Fr,
        Self::Nl,
        Self::Be,
        Self::At,
        Self::De,
        Self::Lu,
        Self::Fixed,
    ];

    #[must_use]
    pub const fn info(self) -> RegionInfo {
        const fn info(
            currency: Currency,
            country: &'static str,
            description: &'static str,
            vat: f64,
        ) -> RegionInfo {
            RegionInfo { currency, country, description, vat }
        }

        match self {
            Self::Dk1 => info(Currency::Dkk, "Denmark", "West of the great belt", 0.25),
            Self::Dk2 => info(Currency::Dkk, "Denmark", "East of the great belt", 0.25),
            Self::Fi => info(Currency::Eur, "Finland", "Finland", 0.24),
            Self::Ee => info(Currency::Eur, "Estonia", "Estonia", 0.20),
            Self::Lt => info(Currency::Eur, "Lithuania", "Lithuania", 0.21),
            Self::Lv => info(Currency::Eur, "Latvia", "Latvia", 0.21),
            Self::No1 => info(Currency::Nok, "Norway", "Oslo", 0.25),
            Self::No2 => info(Currency::Nok, "Norway", "Kristiansand", 0.25),
            Self::No3 => info(Currency::Nok, "Norway", "Molde, Trondheim", 0.25),
            Self::No4 => info(Currency::Nok, "Norway", "Tromsø", 0.25),
            Self::No5 => info(Currency::Nok, "Norway", "Bergen", 0.25),
            Self::Se1 => info(Currency::Sek, "Sweden", "Luleå", 0.25),
            Self::Se2 => info(Currency::Sek, "Sweden", "Sundsvall", 0.25),
            Self::Se3 => info(Currency::Sek, "Sweden", "Stockholm", 0.25),
            Self::Se4 => info(Currency::Sek, "Sweden", "Malmö", 0.25),
            Self::Fr => info(Currency::Eur, "France", "France", 0.055),
            Self::Nl => info(Currency::Eur, "Netherlands", "Netherlands", 0.21),
            Self::Be => info(Currency::Eur, "Belgium", "Belgium", 0.21),
            Self::At => info(Currency::Eur, "Austria", "Austria", 0.20),
            Self::De => info(Currency::Eur, "Germany", "Germany", 0.19),
            Self::Lu => info(Currency::Eur, "Luxemburg", "Luxemburg", 0.08),
            Self::Fixed => info(Currency::None, "Fixed Price", "Fixed Price", 0.0),
        }
    }

    /// Resolve either a region code (`DK1`) or its human description (`West of the great belt`).
    #[must_use]
    pub fn lookup(code_or_description: &str) -> Option<Self> {
        let needle = code_or_description.trim();
        Self::ALL.into_iter().find(|region| {
            region.to_string().eq_ignore_ascii_case(needle)
                || region.info().description.eq_ignore_ascii_case(needle)
        })
    }
}
