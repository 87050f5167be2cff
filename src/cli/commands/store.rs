//! Local store commands.

use std::io::Read;
use std::path::Path;

use colored::Colorize;
use serde_json::{json, Value};

use super::Context;
use crate::cli::args::{OutputFormat, StoreCommands};
use crate::error::SyncError;
use crate::output::{format_collections, format_document, format_documents, to_json};
use crate::storage::{Collection, LocalStore, CURRENT_VERSION};

/// Execute store subcommands.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the input is not valid
/// JSON, or the storage operation fails.
pub fn store(ctx: &Context, cmd: StoreCommands) -> Result<String, SyncError> {
    let store = ctx.open_store()?;
    let format = ctx.format;

    match cmd {
        StoreCommands::Get { collection, key } => get(&store, collection, &key, format),
        StoreCommands::List { collection, index } => {
            let docs = match index {
                Some(index) => store.get_all_from_index(collection, &index)?,
                None => store.get_all(collection)?,
            };
            format_documents(&docs, collection, format)
        },
        StoreCommands::Put {
            collection,
            document,
            key,
            index,
        } => {
            let doc: Value = serde_json::from_str(&document)?;
            let key = key.map(Value::String);
            let stored = store.put(collection, doc, key.as_ref(), index.as_deref())?;
            written(collection, &stored, format)
        },
        StoreCommands::Delete { collection, key } => {
            if !store.delete(collection, &json!(key))? {
                return Err(SyncError::NotFound(format!("{collection}/{key}")));
            }
            match format {
                OutputFormat::Json => to_json(&json!({"collection": collection, "deleted": key})),
                OutputFormat::Pretty => Ok(format!("{} Deleted {collection}/{key}", "✓".green())),
            }
        },
        StoreCommands::Clear { collection, force } => clear(&store, collection, force, format),
        StoreCommands::Import {
            collection,
            file,
            index,
        } => {
            let records: Value = serde_json::from_str(&read_input(&file)?)?;
            let written = store.bulk_add(collection, records, index.as_deref())?;
            match format {
                OutputFormat::Json => {
                    to_json(&json!({"collection": collection, "written": written}))
                },
                OutputFormat::Pretty => Ok(format!(
                    "{} Merged {written} documents into {collection}",
                    "✓".green()
                )),
            }
        },
        StoreCommands::Collections => {
            let counts = Collection::ALL
                .into_iter()
                .map(|c| store.count(c).map(|n| (c, n)))
                .collect::<Result<Vec<_>, _>>()?;
            format_collections(&counts, store.version()?, format)
        },
        StoreCommands::Version => {
            let version = store.version()?;
            match format {
                OutputFormat::Json => {
                    to_json(&json!({"version": version, "latest": CURRENT_VERSION}))
                },
                OutputFormat::Pretty => Ok(format!(
                    "Schema version {version} (latest {CURRENT_VERSION})"
                )),
            }
        },
    }
}

fn get(
    store: &LocalStore,
    collection: Collection,
    key: &str,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let doc = store
        .get(collection, &json!(key))?
        .ok_or_else(|| SyncError::NotFound(format!("{collection}/{key}")))?;
    format_document(&doc, format)
}

fn written(collection: Collection, key: &str, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Json => to_json(&json!({"collection": collection, "key": key})),
        OutputFormat::Pretty => Ok(format!("{} Stored {collection}/{key}", "✓".green())),
    }
}

fn clear(
    store: &LocalStore,
    collection: Collection,
    force: bool,
    format: OutputFormat,
) -> Result<String, SyncError> {
    if !force {
        let count = store.count(collection)?;
        return Ok(format!(
            "Would remove {count} documents from {collection}. Use --force to confirm."
        ));
    }

    let removed = store.clear(collection)?;
    match format {
        OutputFormat::Json => to_json(&json!({"collection": collection, "removed": removed})),
        OutputFormat::Pretty => Ok(format!(
            "{} Removed {removed} documents from {collection}",
            "✓".green()
        )),
    }
}

fn read_input(path: &Path) -> Result<String, SyncError> {
    if path == Path::new("-") {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        return Ok(input);
    }

    std::fs::read_to_string(path).map_err(|e| {
        SyncError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}
