use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use photoindex_core::Library;

use super::format_timestamp;

pub fn add(library: &Library, path: PathBuf) -> Result<()> {
    let root = library.add_root(&path)?;
    println!("Added root: {}", root.path.display());
    Ok(())
}

pub fn rm(library: &Library, path: PathBuf) -> Result<()> {
    let (root, sweep) = library.remove_root(&path)?;
    println!(
        "Removed root: {} ({} assets removed from catalog)",
        root.path.display(),
        sweep.assets
    );
    Ok(())
}

pub fn list(library: &Library) -> Result<()> {
    let roots = library.roots()?;
    if roots.is_empty() {
        println!("No roots registered. Add one with `photoindex roots add <path>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("Path"),
        Cell::new("Assets"),
        Cell::new("Added"),
    ]);

    for root in &roots {
        let assets = library.assets(root.id)?.len();
        table.add_row(vec![
            Cell::new(root.id),
            Cell::new(root.path.display()),
            Cell::new(assets),
            Cell::new(format_timestamp(Some(root.added_at))),
        ]);
    }

    println!("{table}");
    Ok(())
}
