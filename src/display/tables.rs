//! Table formatting utilities for structured output.

use std::collections::BTreeSet;

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

use crate::types::{EngineStats, RankedImage};

/// Descriptions longer than this are cut in result tables.
const DESCRIPTION_PREVIEW_CHARS: usize = 80;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        // Apply rounded corners
        table.apply_modifier(UTF8_ROUND_CORNERS);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Ranked search results, one row per image.
pub fn create_results_table(results: &[RankedImage]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("NASA ID").add_attribute(Attribute::Bold),
        Cell::new("Category").add_attribute(Attribute::Bold),
        Cell::new("Description").add_attribute(Attribute::Bold),
    ]);

    for hit in results {
        // comfy-table colors the score cell itself; no ANSI in the text
        let color = if hit.similarity_score >= 0.5 {
            Color::Green
        } else if hit.similarity_score >= 0.25 {
            Color::Yellow
        } else {
            Color::Reset
        };

        table.add_row(vec![
            Cell::new(hit.rank),
            Cell::new(format!("{:.3}", hit.similarity_score)).fg(color),
            Cell::new(&hit.record.nasa_id),
            Cell::new(hit.record.category.as_deref().unwrap_or("-")),
            Cell::new(preview(&hit.record.description)),
        ]);
    }

    table.to_string()
}

/// Engine readiness summary.
pub fn create_stats_table(stats: &EngineStats) -> String {
    let categories = joined(&stats.categories);
    let sources = joined(&stats.sources);
    let dimension = stats
        .dimension
        .map_or_else(|| "-".to_string(), |d| d.to_string());

    let (ready_text, color) = if stats.ready {
        ("ready", Color::Green)
    } else {
        ("not loaded", Color::Yellow)
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Index"),
        Cell::new(ready_text).fg(color).add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec!["Images", &stats.total.to_string()]);
    table.add_row(vec!["Categories", &categories]);
    table.add_row(vec!["Sources", &sources]);
    table.add_row(vec!["Model", &stats.model]);
    table.add_row(vec!["Dimension", &dimension]);

    table.to_string()
}

fn joined(values: &BTreeSet<String>) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(DESCRIPTION_PREVIEW_CHARS - 1).collect();
    format!("{}…", cut.trim_end())
}
