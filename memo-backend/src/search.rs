//! Case-insensitive substring matching for memo search.

/// True when `query` is blank, or when the lowercased `text` contains the lowercased `query`.
pub fn matches(text: &str, query: &str) -> bool {
    if query.trim().is_empty() {
        return true;
    }
    text.to_lowercase().contains(&query.to_lowercase())
}
