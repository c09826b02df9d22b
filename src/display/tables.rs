//! Table formatting utilities for CLI output.

use crate::cache::CacheStats;
use crate::search::{HealthReport, MergedResult};
use crate::vector::VectorStoreStats;
use comfy_table::{
    Attribute, Cell, CellAlignment, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

const PREVIEW_CHARS: usize = 60;

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
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Right-aligns a column, used for numbers.
    pub fn align_right(mut self, index: usize) -> Self {
        if let Some(column) = self.table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
        self
    }

    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Single-line preview, cut at a char boundary.
fn preview(content: &str) -> String {
    let line = content.trim().replace(['\n', '\r', '\t'], " ");
    if line.chars().count() <= PREVIEW_CHARS {
        return line;
    }
    let cut: String = line.chars().take(PREVIEW_CHARS - 3).collect();
    format!("{cut}...")
}

/// Ranked search results.
pub fn create_results_table(results: &[MergedResult]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "#", "File", "Line", "Source", "Score", "Rerank", "Preview",
    ]);
    for (rank, result) in results.iter().enumerate() {
        builder = builder.add_row(vec![
            (rank + 1).to_string(),
            result.file.clone(),
            result
                .line_number
                .map_or_else(|| "-".to_string(), |n| n.to_string()),
            result.source.as_str().to_string(),
            format!("{:.3}", result.combined_score()),
            result
                .hybrid_metadata
                .rerank_score
                .map_or_else(|| "-".to_string(), |s| format!("{s:.3}")),
            preview(&result.content),
        ]);
    }
    builder.align_right(0).align_right(2).align_right(4).build()
}

pub fn create_health_table(report: &HealthReport) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["Component", "Status", "Detail"]);
    for (name, component) in &report.components {
        builder = builder.add_row(vec![
            name.clone(),
            component.status.as_str().to_string(),
            component.detail.clone(),
        ]);
    }
    builder.build()
}

/// Vector store stats with one row per namespace plus a total.
pub fn create_stats_table(stats: &VectorStoreStats) -> String {
    let mut builder =
        TableBuilder::new().set_headers(vec!["Namespace", "Vectors", "Status"]);
    for ns in &stats.namespaces {
        builder = builder.add_row(vec![
            ns.namespace.clone(),
            ns.num_docs.to_string(),
            format!("{:?}", ns.status).to_lowercase(),
        ]);
    }
    builder = builder.add_row(vec![
        format!(
            "total ({}, {} dims)",
            stats.storage_type.as_str(),
            stats.dimensions
        ),
        stats.num_docs.to_string(),
        String::new(),
    ]);
    builder.align_right(1).build()
}

pub fn create_cache_table(stats: &CacheStats) -> String {
    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Cache".to_string(), stats.cache_type.clone()])
        .add_row(vec!["Backend".to_string(), stats.backend.clone()])
        .add_row(vec!["Status".to_string(), stats.status.clone()])
        .add_row(vec!["Hits".to_string(), stats.hits.to_string()])
        .add_row(vec!["Misses".to_string(), stats.misses.to_string()])
        .add_row(vec!["Errors".to_string(), stats.errors.to_string()])
        .add_row(vec![
            "Hit rate".to_string(),
            format!("{:.1}%", stats.hit_rate * 100.0),
        ])
        .build()
}
