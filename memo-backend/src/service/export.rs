//! Rendering the cached collection for download.

use memo_types::{ExportFormat, Memo};

use crate::storage::{StorageError, StorageResult};

/// Heading used when a memo has no non-blank line
pub const UNTITLED_HEADING: &str = "Untitled memo";

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

pub fn render(memos: &[Memo], format: ExportFormat) -> StorageResult<String> {
    match format {
        ExportFormat::Json => to_json(memos),
        ExportFormat::Markdown => Ok(to_markdown(memos)),
    }
}

/// The collection exactly as cached, in the stored record shape
pub fn to_json(memos: &[Memo]) -> StorageResult<String> {
    serde_json::to_string_pretty(memos)
        .map_err(|e| StorageError::unknown("Failed to serialize memos for export").with_cause(e))
}

/// One section per memo, in cache order
pub fn to_markdown(memos: &[Memo]) -> String {
    memos
        .iter()
        .map(markdown_section)
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

fn markdown_section(memo: &Memo) -> String {
    format!(
        "## {}\n\n{}\n\n_Updated: {}_",
        memo.title().unwrap_or(UNTITLED_HEADING),
        memo.content,
        memo.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}
