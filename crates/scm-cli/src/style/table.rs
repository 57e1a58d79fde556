//! Table formatting using comfy-table, narrowed from the teacher's
//! `kimberlite-cli::style::table`.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

/// Builds a list table: one header row, then one row per record.
pub fn list_table(columns: &[&str], rows: &[Vec<String>]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS).set_content_arrangement(ContentArrangement::Dynamic);

    let header: Vec<Cell> = columns
        .iter()
        .map(|col| {
            if super::no_color() { Cell::new(col) } else { Cell::new(col).add_attribute(Attribute::Bold).fg(Color::Cyan) }
        })
        .collect();
    table.set_header(header);

    for row in rows {
        table.add_row(row);
    }
    table
}

pub fn print_list_table(columns: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        println!("(none)");
        return;
    }
    let table = list_table(columns, rows);
    println!("{table}");
    let count = rows.len();
    let noun = if count == 1 { "row" } else { "rows" };
    println!("({count} {noun})");
}

/// Builds a two-column key/value table for a single-record lookup.
pub fn info_table(entries: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS).set_content_arrangement(ContentArrangement::Dynamic);
    for (key, value) in entries {
        let key_cell = if super::no_color() { Cell::new(key) } else { Cell::new(key).fg(Color::DarkGrey) };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }
    table
}

pub fn print_info_table(entries: &[(&str, String)]) {
    println!("{}", info_table(entries));
}
