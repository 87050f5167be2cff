//! Offline queue commands.

use chrono::Utc;
use colored::Colorize;
use serde_json::{json, Value};

use super::Context;
use crate::cli::args::{OutputFormat, QueueCommands};
use crate::error::SyncError;
use crate::output::{format_queue, format_report, to_json};
use crate::queue::{
    enqueue_offline, load_offline, ActionQueue, ApiRequest, AttachmentStatus, HttpTransport,
    Method, QueueItem, QueueSink, SyncReport, SyncRunner,
};
use crate::storage::{Collection, LocalStore};
use crate::sync::SyncTarget;

/// Sink for queues that only record actions; sending happens in `queue run`.
struct Deferred;

impl QueueSink for Deferred {
    fn dispatch(&mut self, _item: &QueueItem) {}
    fn attachment_status(&mut self, _status: AttachmentStatus) {}
    fn sync_success(&mut self, _records: usize) {}
}

/// Execute queue subcommands.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the input is not valid
/// JSON, or the storage operation fails.
pub fn queue(ctx: &Context, cmd: QueueCommands) -> Result<String, SyncError> {
    let store = ctx.open_store()?;
    let format = ctx.format;

    match cmd {
        QueueCommands::List => format_queue(&load_offline(&store)?, format),
        QueueCommands::Add {
            action_type,
            method,
            path,
            body,
            id,
            target,
            record_type,
            attachment,
        } => {
            let item = build_item(
                action_type,
                method,
                path,
                body.as_deref(),
                id,
                target,
                record_type,
                attachment,
            )?;
            let mut queue = ActionQueue::new(Deferred, ctx.config.queue.max_tries);
            let queued = enqueue_offline(&store, &mut queue, vec![item])?;
            format_queue(&queued, format)
        },
        QueueCommands::Status => status(ctx, &store, format),
        QueueCommands::Run => {
            let transport = HttpTransport::new(&ctx.config.server);
            let mut runner = SyncRunner::new(store, transport, ctx.config.queue.max_tries);
            if runner.hydrate()? == 0 {
                return match format {
                    OutputFormat::Json => format_report(&SyncReport::default(), format),
                    OutputFormat::Pretty => Ok("No queued actions to sync.".to_string()),
                };
            }
            let report = runner.run()?;
            runner.close();
            format_report(&report, format)
        },
        QueueCommands::Skip => {
            let transport = HttpTransport::new(&ctx.config.server);
            let mut runner = SyncRunner::new(store, transport, ctx.config.queue.max_tries);
            runner.hydrate()?;
            let skipped = runner.skip();
            runner.close();

            match (skipped, format) {
                (None, OutputFormat::Json) => to_json(&Value::Null),
                (None, OutputFormat::Pretty) => Ok("Queue is empty.".to_string()),
                (Some(item), OutputFormat::Json) => to_json(&item),
                (Some(item), OutputFormat::Pretty) => Ok(format!(
                    "{} Skipped {} {} {}",
                    "○".yellow(),
                    item.action_type.bold(),
                    item.api.method,
                    item.api.path
                )),
            }
        },
        QueueCommands::Clear { force } => {
            if !force {
                let count = store.count(Collection::OfflineRequests)?;
                return Ok(format!(
                    "Would remove {count} queued actions. Use --force to confirm."
                ));
            }
            let removed = store.clear(Collection::OfflineRequests)?;
            match format {
                OutputFormat::Json => to_json(&json!({"removed": removed})),
                OutputFormat::Pretty => {
                    Ok(format!("{} Removed {removed} queued actions", "✓".green()))
                },
            }
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn build_item(
    action_type: String,
    method: Method,
    path: String,
    body: Option<&str>,
    id: Option<String>,
    target: Option<Collection>,
    record_type: Option<String>,
    attachment: Option<String>,
) -> Result<QueueItem, SyncError> {
    let mut api = ApiRequest::new(method, path);
    if let Some(body) = body {
        api = api.with_body(serde_json::from_str(body)?);
    }
    if let Some(id) = id {
        api = api.with_id(id);
    }
    if let Some(collection) = target {
        api = api.with_db(SyncTarget {
            record_type: record_type.clone().unwrap_or_default(),
            collection: collection.as_str().to_string(),
        });
    }

    let mut item = QueueItem::new(action_type, api);
    if let (Some(field_name), Some(record_type)) = (attachment, record_type) {
        item = item.with_attachment(record_type, field_name);
    }
    Ok(item)
}

fn status(ctx: &Context, store: &LocalStore, format: OutputFormat) -> Result<String, SyncError> {
    let items = load_offline(store)?;
    let attachments = items.iter().filter(|i| i.attachment().is_some()).count();
    let oldest = items.iter().filter_map(|i| i.queued_at).min();

    match format {
        OutputFormat::Json => to_json(&json!({
            "queued": items.len(),
            "attachments": attachments,
            "oldest": oldest.map(|t| t.to_rfc3339()),
            "max_tries": ctx.config.queue.max_tries,
            "server": ctx.config.server.base_url,
        })),
        OutputFormat::Pretty => {
            let mut lines = Vec::new();

            lines.push("Offline Queue Status".bold().to_string());
            lines.push("─".repeat(40));
            lines.push(format!(
                "  Queued:       {} {}",
                items.len(),
                if items.is_empty() {
                    "".dimmed()
                } else {
                    "actions waiting".dimmed()
                }
            ));
            lines.push(format!("  Attachments:  {attachments}"));

            if let Some(oldest) = oldest {
                let age = Utc::now().signed_duration_since(oldest);
                let age_str = if age.num_hours() > 0 {
                    format!("{} hours ago", age.num_hours())
                } else if age.num_minutes() > 0 {
                    format!("{} minutes ago", age.num_minutes())
                } else {
                    "just now".to_string()
                };
                lines.push(format!("  Oldest:       {}", age_str.dimmed()));
            }

            lines.push(format!("  Server:       {}", ctx.config.server.base_url));
            lines.push(format!("  Max tries:    {}", ctx.config.queue.max_tries));

            if !items.is_empty() {
                lines.push(String::new());
                lines.push(
                    "Run 'casesync queue run' to send queued actions"
                        .dimmed()
                        .to_string(),
                );
            }

            Ok(lines.join("\n"))
        },
    }
}
