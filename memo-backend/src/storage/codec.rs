//! Encoding and fail-fast validation of the persisted memo collection.
//!
//! The stored value is a JSON array of `{id, content, createdAt, updatedAt}`
//! records with RFC 3339 timestamps. A single bad record rejects the whole
//! read; nothing is silently dropped.

use chrono::{DateTime, Utc};
use memo_types::{Memo, MemoId};
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::error::{StorageError, StorageResult};

/// Serialize the full collection to its stored byte form
pub fn encode(memos: &[Memo]) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(memos)
        .map_err(|e| StorageError::unknown("Failed to serialize memos").with_cause(e))
}

/// Decode and validate a stored collection. Order is preserved as stored.
pub fn decode(bytes: &[u8]) -> StorageResult<Vec<Memo>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| StorageError::unknown("Failed to deserialize stored memos").with_cause(e))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(StorageError::parse(format!(
                "expected a sequence of memos, found {}",
                json_type_name(&other)
            )));
        }
    };

    let mut seen = HashSet::with_capacity(items.len());
    let mut memos = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let memo = validate_record(index, item)?;
        if !seen.insert(memo.id.clone()) {
            return Err(StorageError::parse(format!(
                "record {}: duplicate id {}",
                index, memo.id
            )));
        }
        memos.push(memo);
    }

    Ok(memos)
}

/// Sort by `updated_at` descending. Stable, so ties keep their stored order.
pub fn sort_newest_first(memos: &mut [Memo]) {
    memos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

fn validate_record(index: usize, item: &Value) -> StorageResult<Memo> {
    let record = item.as_object().ok_or_else(|| {
        StorageError::parse(format!(
            "record {}: expected an object, found {}",
            index,
            json_type_name(item)
        ))
    })?;

    let raw_id = string_field(index, record, "id")?;
    let id = MemoId::parse(raw_id).ok_or_else(|| {
        StorageError::parse(format!("record {}: id '{}' is not a UUID v4", index, raw_id))
    })?;
    let content = string_field(index, record, "content")?.to_string();
    let created_at = timestamp_field(index, record, "createdAt")?;
    let updated_at = timestamp_field(index, record, "updatedAt")?;

    if updated_at < created_at {
        return Err(StorageError::parse(format!(
            "record {}: updatedAt {} is earlier than createdAt {}",
            index,
            updated_at.to_rfc3339(),
            created_at.to_rfc3339()
        )));
    }

    Ok(Memo {
        id,
        content,
        created_at,
        updated_at,
    })
}

fn string_field<'a>(index: usize, record: &'a Map<String, Value>, field: &str) -> StorageResult<&'a str> {
    match record.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(StorageError::parse(format!(
            "record {}: field '{}' must be a string, found {}",
            index,
            field,
            json_type_name(other)
        ))),
        None => Err(StorageError::parse(format!(
            "record {}: missing field '{}'",
            index, field
        ))),
    }
}

fn timestamp_field(index: usize, record: &Map<String, Value>, field: &str) -> StorageResult<DateTime<Utc>> {
    let raw = string_field(index, record, field)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StorageError::parse(format!(
                "record {}: field '{}' is not a valid timestamp: '{}'",
                index, field, raw
            ))
            .with_cause(e)
        })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
