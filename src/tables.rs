use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use itertools::Itertools;

use crate::{
    api::datahub::CHARGE_OWNERS,
    core::{interval::Interval, provider::ProviderRegistry},
    region::Region,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

/// Priced intervals, colored against the mean of the displayed ones.
pub fn build_prices_table(intervals: &[Interval], decimals: u8) -> Table {
    #[expect(clippy::cast_precision_loss)]
    let mean = intervals.iter().map(|interval| interval.price).sum::<f64>()
        / intervals.len().max(1) as f64;
    let precision = usize::from(decimals);

    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Price"]);
    for interval in intervals {
        table.add_row(vec![
            Cell::new(interval.timestamp.format("%Y-%m-%d")).add_attribute(Attribute::Dim),
            Cell::new(interval.timestamp.format("%H:%M")),
            Cell::new((interval.timestamp + Interval::DURATION).format("%H:%M"))
                .add_attribute(Attribute::Dim),
            Cell::new(format!("{:.precision$}", interval.price))
                .set_alignment(CellAlignment::Right)
                .fg(if interval.price >= mean { Color::Red } else { Color::Green }),
        ]);
    }
    table
}

pub fn build_regions_table(registry: &ProviderRegistry) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Code", "Country", "Description", "Currency", "VAT", "Connectors"]);
    for region in Region::ALL {
        let info = region.info();
        let connectors = registry
            .connectors_for(region)
            .into_iter()
            .map(|connector| format!("{} ({})", connector.name, connector.capability))
            .join(", ");
        table.add_row(vec![
            Cell::new(region).add_attribute(Attribute::Bold),
            Cell::new(info.country),
            Cell::new(info.description),
            Cell::new(format!("{} ({})", info.currency, info.currency.symbol())),
            Cell::new(format!("{:.1}%", info.vat * 100.0)).set_alignment(CellAlignment::Right),
            Cell::new(connectors).add_attribute(Attribute::Dim),
        ]);
    }
    table
}

pub fn build_charge_owners_table() -> Table {
    let mut table = new_table();
    table.set_header(vec!["Name", "Company", "GLN", "Charge type codes"]);
    for owner in CHARGE_OWNERS {
        table.add_row(vec![
            Cell::new(owner.name).add_attribute(Attribute::Bold),
            Cell::new(owner.company),
            Cell::new(owner.gln).add_attribute(Attribute::Dim),
            Cell::new(owner.charge_type_codes.join(", ")),
        ]);
    }
    table
}
