use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use photoindex_core::Library;

use super::format_timestamp;

pub fn run(library: &Library) -> Result<()> {
    let stats = library.status()?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Catalog"), Cell::new(library.catalog_path().display())]);
    table.add_row(vec![Cell::new("Roots"), Cell::new(stats.total_roots)]);
    table.add_row(vec![Cell::new("Assets"), Cell::new(stats.total_assets)]);
    table.add_row(vec![Cell::new("Regions"), Cell::new(stats.total_regions)]);
    table.add_row(vec![Cell::new("Batches"), Cell::new(stats.total_batches)]);

    if let Some(last) = library.batches(1)?.first() {
        table.add_row(vec![
            Cell::new("Last scan"),
            Cell::new(format!(
                "#{} {} ({})",
                last.id,
                format_timestamp(last.ended_at.or(Some(last.started_at))),
                last.mode
            )),
        ]);
    }

    println!("{table}");
    Ok(())
}
