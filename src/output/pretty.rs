use colored::Colorize;
use serde_json::Value;

use crate::queue::QueueItem;
use crate::storage::Collection;

/// Format the documents of a collection as a list
pub fn format_documents_pretty(docs: &[Value], collection: Collection) -> String {
    if docs.is_empty() {
        return format!("{collection} (0 items)\n  No items");
    }

    let mut output = format!("{collection} ({} items)\n", docs.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for doc in docs {
        let id = doc.get("id").map_or_else(|| "-".to_string(), display_scalar);
        let mut line = id.bold().to_string();

        if let Some(record_type) = doc.get("type").and_then(Value::as_str) {
            line.push_str(&format!("  {}", record_type.cyan()));
        }

        let fields = doc.as_object().map_or(0, |m| m.len());
        line.push_str(&format!("  {}", format!("{fields} fields").dimmed()));

        output.push_str(&line);
        output.push('\n');
    }

    output
}

/// Format a single document
pub fn format_document_pretty(doc: &Value) -> String {
    let Some(map) = doc.as_object() else {
        return display_scalar(doc);
    };

    let mut output = String::new();
    if let Some(id) = map.get("id") {
        output.push_str(&format!("{}\n", display_scalar(id).bold()));
    }

    for (key, value) in map.iter().filter(|(k, _)| k.as_str() != "id") {
        let rendered = match value {
            Value::Array(items) => format!("[{} items]", items.len()),
            Value::Object(fields) => format!("{{{} fields}}", fields.len()),
            other => display_scalar(other),
        };
        output.push_str(&format!("  {}: {}\n", key.dimmed(), rendered));
    }

    output
}

/// Format queued actions in dispatch order
pub fn format_queue_pretty(items: &[QueueItem]) -> String {
    if items.is_empty() {
        return "Offline queue (0 actions)\n  Nothing queued".to_string();
    }

    let mut output = format!("Offline queue ({} actions)\n", items.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for (position, item) in items.iter().enumerate() {
        let id = item.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        let mut line = format!(
            "{:>3}. {} {} {}",
            position + 1,
            format!("#{id}").dimmed(),
            item.api.method.to_string().cyan(),
            item.api.path
        );
        line.push_str(&format!("  {}", item.action_type.bold()));

        if let Some(attachment) = item.attachment() {
            line.push_str(&format!("  {}", format!("[{}]", attachment.field_name).magenta()));
        }

        if let Some(queued_at) = item.queued_at {
            line.push_str(&format!(
                "  {}",
                queued_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
            ));
        }

        output.push_str(&line);
        output.push('\n');
    }

    output
}

/// Format collection sizes
pub fn format_collections_pretty(counts: &[(Collection, i64)], version: i32) -> String {
    let mut output = format!("Local store (schema version {version})\n");
    output.push_str(&"─".repeat(40));
    output.push('\n');

    for (collection, count) in counts {
        output.push_str(&format!(
            "  {:<22} {:>6}  {}\n",
            collection.as_str(),
            count,
            format!("v{}", collection.since_version()).dimmed()
        ));
    }

    output
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ApiRequest, Method};
    use serde_json::json;

    #[test]
    fn test_empty_documents() {
        let output = format_documents_pretty(&[], Collection::Records);
        assert!(output.contains("records (0 items)"));
    }

    #[test]
    fn test_document_summary() {
        colored::control::set_override(false);
        let output = format_document_pretty(&json!({
            "id": "c1",
            "name": "Ana",
            "family_details_section": [{"unique_id": "f1"}],
            "photo": null
        }));
        assert!(output.starts_with("c1\n"));
        assert!(output.contains("name: Ana"));
        assert!(output.contains("family_details_section: [1 items]"));
        assert!(output.contains("photo: null"));
    }

    #[test]
    fn test_queue_listing() {
        colored::control::set_override(false);
        let mut item = QueueItem::new(
            "cases/SAVE_ATTACHMENT",
            ApiRequest::new(Method::Post, "cases/c1/attachments"),
        )
        .with_attachment("cases", "photos");
        item.id = Some(7);

        let output = format_queue_pretty(&[item]);
        assert!(output.contains("Offline queue (1 actions)"));
        assert!(output.contains("#7 POST cases/c1/attachments"));
        assert!(output.contains("[photos]"));
    }

    #[test]
    fn test_collections_table() {
        let output = format_collections_pretty(&[(Collection::Dashboards, 2)], 4);
        assert!(output.contains("schema version 4"));
        assert!(output.contains("dashboards"));
    }
}
