//! Shared types for the memo backend and the presentation layers that drive it.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use strum::{AsRefStr, Display, EnumString};

// Canonical hyphenated UUID v4 shape (version nibble 4, RFC 4122 variant)
static UUID_V4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$")
        .unwrap()
});

// =====================================================
// Identity
// =====================================================

/// Opaque memo identifier. Always shaped like a UUID v4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoId(String);

impl MemoId {
    /// Allocate a fresh random id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Accept `s` only if it matches the UUID v4 textual shape
    pub fn parse(s: &str) -> Option<Self> {
        if is_uuid_v4(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MemoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check whether `s` has the hyphenated UUID v4 shape
pub fn is_uuid_v4(s: &str) -> bool {
    UUID_V4_RE.is_match(s)
}

// =====================================================
// Domain Types
// =====================================================

/// A single short text note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    pub id: MemoId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memo {
    /// First non-blank line of the content, trimmed
    pub fn title(&self) -> Option<&str> {
        self.content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}

/// Partial update merged into an existing memo. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl MemoPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    pub fn apply(self, memo: &mut Memo) {
        if let Some(content) = self.content {
            memo.content = content;
        }
    }
}

/// Pending content for one memo, as observed by the autosave scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoDraft {
    pub id: MemoId,
    pub content: String,
}

impl MemoDraft {
    pub fn new(id: MemoId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

// =====================================================
// Status Types
// =====================================================

/// Autosave status exposed to the presentation layer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SaveStatus {
    /// Nothing observed since the last reset
    #[default]
    Idle,
    /// Edits observed, waiting out the debounce window
    Typing,
    /// A commit is in flight or waiting for a retry
    Saving,
    /// The latest commit succeeded
    Saved,
    /// Retries were exhausted
    Error,
}

/// Export formats offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExportFormat {
    Json,
    Markdown,
}
