//! CLI output: error mapping and listing presentation.

use crate::error::{RepositoryError, StorageError};
use crate::exploded::ContentEntry;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::{CellAlignment, Table};
use owo_colors::OwoColorize;

/// Map repository errors to a string for CLI output.
pub fn map_error(e: &RepositoryError) -> String {
    let message = format!("{} {}", "error:".red().bold(), e);
    if e.is_retryable() {
        format!("{}\n{}", message, "the content is busy; try again".dimmed())
    } else {
        message
    }
}

pub fn format_entries_text(entries: &[ContentEntry]) -> String {
    if entries.is_empty() {
        return "(empty)".dimmed().to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Path", "Size"]);
    for entry in entries {
        let size = if entry.is_directory {
            "-".to_string()
        } else {
            entry.size.to_string()
        };
        table.add_row(vec![entry.path.clone(), size]);
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table.to_string()
}

pub fn format_entries_json(entries: &[ContentEntry]) -> Result<String, RepositoryError> {
    serde_json::to_string_pretty(entries)
        .map_err(|e| RepositoryError::StorageError(StorageError::InvalidPath(e.to_string())))
}
