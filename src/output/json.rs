//! JSON output formatting.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::queue::QueueItem;
use crate::storage::Collection;

/// Format the documents of a collection as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_documents_json(docs: &[Value], collection: Collection) -> Result<String, SyncError> {
    let output = json!({
        "collection": collection.as_str(),
        "count": docs.len(),
        "items": docs
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queued actions as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_queue_json(items: &[QueueItem]) -> Result<String, SyncError> {
    let output = json!({
        "count": items.len(),
        "items": items
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format collection sizes as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_collections_json(
    counts: &[(Collection, i64)],
    version: i32,
) -> Result<String, SyncError> {
    let collections: Vec<Value> = counts
        .iter()
        .map(|(c, n)| json!({"name": c.as_str(), "since": c.since_version(), "count": n}))
        .collect();
    let output = json!({
        "version": version,
        "collections": collections
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
