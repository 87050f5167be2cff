//! Output formatting for casesync.
//!
//! This module provides formatters for documents, queued actions and store
//! summaries in human-readable and JSON form.

mod json;
mod pretty;

use serde_json::Value;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::queue::{format_sync_report, QueueItem, SyncReport};
use crate::storage::Collection;

pub use json::*;
pub use pretty::*;

/// Format the documents of a collection based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_documents(
    docs: &[Value],
    collection: Collection,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_documents_pretty(docs, collection)),
        OutputFormat::Json => format_documents_json(docs, collection),
    }
}

/// Format a single document based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_document(doc: &Value, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_document_pretty(doc)),
        OutputFormat::Json => to_json(doc),
    }
}

/// Format queued actions based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_queue(items: &[QueueItem], format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_queue_pretty(items)),
        OutputFormat::Json => format_queue_json(items),
    }
}

/// Format collection sizes based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_collections(
    counts: &[(Collection, i64)],
    version: i32,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_collections_pretty(counts, version)),
        OutputFormat::Json => format_collections_json(counts, version),
    }
}

/// Format a sync report based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_report(report: &SyncReport, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_sync_report(report)),
        OutputFormat::Json => to_json(report),
    }
}
