use std::collections::HashMap;

use anyhow::{bail, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photoindex_core::domain::ScanBatch;
use photoindex_core::Library;

use super::format_timestamp;

fn batch_row(batch: &ScanBatch, root: &str) -> Vec<Cell> {
    let c = &batch.counters;
    let status = if batch.ended_at.is_none() {
        Cell::new("incomplete").fg(Color::Red)
    } else if batch.warning {
        Cell::new("counts differ").fg(Color::Yellow)
    } else {
        Cell::new("ok").fg(Color::Green)
    };
    vec![
        Cell::new(batch.id),
        Cell::new(root),
        Cell::new(batch.mode),
        Cell::new(format_timestamp(Some(batch.started_at))),
        Cell::new(c.found),
        Cell::new(c.added),
        Cell::new(c.updated),
        Cell::new(c.skipped),
        Cell::new(c.removed),
        Cell::new(c.errors),
        Cell::new(batch.summary.as_deref().unwrap_or("-")),
        status,
    ]
}

pub fn list(library: &Library, limit: usize) -> Result<()> {
    let batches = library.batches(limit)?;
    if batches.is_empty() {
        println!("No scans yet. Run `photoindex scan`.");
        return Ok(());
    }
    let roots: HashMap<i64, String> = library
        .roots()?
        .into_iter()
        .map(|r| (r.id, r.path.display().to_string()))
        .collect();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "ID", "Root", "Mode", "Started", "Found", "Added", "Updated", "Skipped", "Removed",
        "Errors", "Elapsed", "Status",
    ]);
    for batch in &batches {
        let root = roots.get(&batch.root_id).map(String::as_str).unwrap_or("(removed)");
        table.add_row(batch_row(batch, root));
    }

    println!("{table}");
    Ok(())
}

pub fn log(library: &Library, batch_id: i64) -> Result<()> {
    let Some(batch) = library.batch(batch_id)? else {
        bail!("no batch with ID {batch_id}");
    };
    println!("Batch #{}: {}", batch.id, batch.counters);

    let entries = library.log_entries(batch_id)?;
    if entries.is_empty() {
        println!("No log entries.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Path", "Message"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(format_timestamp(Some(entry.logged_at))),
            Cell::new(entry.path.display()),
            Cell::new(&entry.message),
        ]);
    }
    println!("{table}");
    Ok(())
}
