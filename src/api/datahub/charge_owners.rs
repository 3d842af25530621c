//! Grid operators publishing their tariffs to the DataHub price list.

/// Charge owner and the DataHub identifiers of its consumption tariff.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChargeOwner {
    pub name: &'static str,
    pub company: &'static str,

    /// Global location number.
    pub gln: &'static str,

    pub charge_type_codes: &'static [&'static str],
}

impl ChargeOwner {
    /// Find an owner by its short name, ignoring case.
    #[must_use]
    pub fn lookup(name: &str) -> Option<&'static Self> {
        let name = name.trim();
        CHARGE_OWNERS.iter().find(|owner| owner.name.eq_ignore_ascii_case(name))
    }
}

pub const CHARGE_OWNERS: &[ChargeOwner] = &[
    ChargeOwner {
        name: "Radius",
        company: "Radius Elnet A/S",
        gln: "5790000705689",
        charge_type_codes: &["DT_C_01"],
    },
    ChargeOwner {
        name: "RAH",
        company: "RAH Net A/S",
        gln: "5790000681327",
        charge_type_codes: &["RAH-C"],
    },
    ChargeOwner {
        name: "Konstant",
        company: "Konstant Net A/S - 151",
        gln: "5790000704842",
        charge_type_codes: &["151-NT01T"],
    },
    ChargeOwner {
        name: "Cerius",
        company: "Cerius A/S",
        gln: "5790000705184",
        charge_type_codes: &["30TR_C_ET"],
    },
    ChargeOwner {
        name: "N1",
        company: "N1 A/S - 131",
        gln: "5790001089030",
        charge_type_codes: &["CD", "CD R"],
    },
    ChargeOwner {
        name: "N1 Randers",
        company: "N1 Randers A/S",
        gln: "5790000681372",
        charge_type_codes: &["CD"],
    },
    ChargeOwner {
        name: "Dinel",
        company: "Dinel A/S",
        gln: "5790000610099",
        charge_type_codes: &["TCL>100_02"],
    },
    ChargeOwner {
        name: "TREFOR El-net",
        company: "TREFOR El-net A/S",
        gln: "5790000392261",
        charge_type_codes: &["C"],
    },
    ChargeOwner {
        name: "TREFOR El-net Øst",
        company: "TREFOR El-net Øst A/S",
        gln: "5790000706686",
        charge_type_codes: &["46"],
    },
    ChargeOwner {
        name: "Elektrus",
        company: "Elektrus A/S",
        gln: "5790000836239",
        charge_type_codes: &["6000091"],
    },
    ChargeOwner {
        name: "Elnet Midt",
        company: "Elnet Midt A/S",
        gln: "5790001100520",
        charge_type_codes: &["T3002"],
    },
    ChargeOwner {
        name: "Hurup Elværk Net",
        company: "Hurup Elværk Net A/S",
        gln: "5790000610839",
        charge_type_codes: &["HEV-NT-01"],
    },
    ChargeOwner {
        name: "Veksel",
        company: "Veksel A/S",
        gln: "5790001088217",
        charge_type_codes: &["NT-10"],
    },
    ChargeOwner {
        name: "Vores Elnet",
        company: "Vores Elnet A/S",
        gln: "5790000610976",
        charge_type_codes: &["TNT1009"],
    },
    ChargeOwner {
        name: "Netselskabet Elværk",
        company: "Netselskabet Elværk A/S - 042",
        gln: "5790000681075",
        charge_type_codes: &["0NCFF"],
    },
    ChargeOwner {
        name: "Nord Energi Net",
        company: "Nord Energi Net A/S",
        gln: "5790000610877",
        charge_type_codes: &["TA031U200"],
    },
    ChargeOwner {
        name: "Nordvestjysk Elforsyning (NOE Net)",
        company: "NOE Net A/S",
        gln: "5790000395620",
        charge_type_codes: &["Net C"],
    },
    ChargeOwner {
        name: "Ikast El Net",
        company: "Ikast El Net A/S",
        gln: "5790000682102",
        charge_type_codes: &["IEV-NT-01", "IEV-NT-11"],
    },
    ChargeOwner {
        name: "FLOW Elnet",
        company: "FLOW Elnet A/S",
        gln: "5790000392551",
        charge_type_codes: &["FE2 NT-01"],
    },
    ChargeOwner {
        name: "Elinord",
        company: "Elinord A/S",
        gln: "5790001095277",
        charge_type_codes: &["43300"],
    },
    ChargeOwner {
        name: "Hammel Elforsyning Net",
        company: "Hammel Elforsyning Net A/S",
        gln: "5790001090166",
        charge_type_codes: &["50001"],
    },
    ChargeOwner {
        name: "El-net Kongerslev",
        company: "El-net Kongerslev A/S",
        gln: "5790002502699",
        charge_type_codes: &["K_22100"],
    },
    ChargeOwner {
        name: "Ravdex",
        company: "Ravdex A/S",
        gln: "5790000836727",
        charge_type_codes: &["NT-C"],
    },
    ChargeOwner {
        name: "Tarm Elværk Net",
        company: "Tarm Elværk Net A/S",
        gln: "5790000706419",
        charge_type_codes: &["TEV-NT-01"],
    },
    ChargeOwner {
        name: "Zeanet",
        company: "Zeanet A/S",
        gln: "5790001089375",
        charge_type_codes: &["43110"],
    },
    ChargeOwner {
        name: "NKE-Elnet",
        company: "NKE-Elnet A/S",
        gln: "5790001088231",
        charge_type_codes: &["94TR_C_ET"],
    },
    ChargeOwner {
        name: "L-Net",
        company: "L-Net A/S",
        gln: "5790001090111",
        charge_type_codes: &["4010"],
    },
    ChargeOwner {
        name: "Midtfyns Elforsyning",
        company: "Midtfyns Elforsyning A.m.b.A",
        gln: "5790001089023",
        charge_type_codes: &["TNT15000"],
    },
    ChargeOwner {
        name: "Sunds Net",
        company: "Sunds Net A.m.b.A",
        gln: "5790001095444",
        charge_type_codes: &["SEF-NT-05"],
    },
];
