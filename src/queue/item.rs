//! Queued network actions.
//!
//! A `QueueItem` is the serialized form of a write the client could not
//! send while offline. The same shape is persisted in `offline_requests`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sync::SyncTarget;

/// HTTP method of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read.
    #[default]
    Get,
    /// Create.
    Post,
    /// Partial update.
    Patch,
    /// Replace.
    Put,
    /// Remove.
    Delete,
}

impl Method {
    /// Wire name of this method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Parse a method name, case-insensitively.
    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PATCH" => Some(Self::Patch),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request half of a queued action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Path relative to the server base URL.
    pub path: String,
    /// HTTP method.
    #[serde(default)]
    pub method: Method,
    /// JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Id of the record the request targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Collection the response is written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<SyncTarget>,
}

impl ApiRequest {
    /// A request without body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            id: None,
            db: None,
        }
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the targeted record id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Write the response into `target` once the request succeeds.
    #[must_use]
    pub fn with_db(mut self, target: SyncTarget) -> Self {
        self.db = Some(target);
        self
    }
}

/// Attachment field an upload belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Field holding the attachment.
    pub field_name: String,
    /// Record type owning the field.
    pub record_type: String,
}

/// A pending network action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Key in `offline_requests`, once persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Action type, e.g. `cases/SAVE_RECORD`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Request to send.
    pub api: ApiRequest,
    /// Attachment field, for uploads and attachment removals.
    #[serde(
        default,
        rename = "fromAttachment",
        alias = "from_attachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub from_attachment: Option<AttachmentRef>,
    /// When the action was queued.
    #[serde(
        default,
        rename = "queuedAt",
        alias = "queued_at",
        skip_serializing_if = "Option::is_none"
    )]
    pub queued_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Create a new item.
    #[must_use]
    pub fn new(action_type: impl Into<String>, api: ApiRequest) -> Self {
        Self {
            id: None,
            action_type: action_type.into(),
            api,
            from_attachment: None,
            queued_at: None,
        }
    }

    /// Mark this item as an attachment action for `field_name`.
    #[must_use]
    pub fn with_attachment(
        mut self,
        record_type: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        self.from_attachment = Some(AttachmentRef {
            field_name: field_name.into(),
            record_type: record_type.into(),
        });
        self
    }

    /// Attachment field this item affects, if it is an attachment action.
    #[must_use]
    pub fn attachment(&self) -> Option<&AttachmentRef> {
        if self.action_type.contains("ATTACHMENT") {
            self.from_attachment.as_ref()
        } else {
            None
        }
    }

    /// Whether this item refers to the given attachment field.
    #[must_use]
    pub fn touches_attachment(&self, record_type: &str, field_name: &str) -> bool {
        self.attachment()
            .is_some_and(|a| a.record_type == record_type && a.field_name == field_name)
    }

    /// Whether a successful dispatch counts as a synced record.
    ///
    /// Reads and attachment uploads/removals do not count.
    #[must_use]
    pub fn counts_as_synced(&self) -> bool {
        self.api.method != Method::Get
            && !["SAVE_ATTACHMENT", "DELETE_ATTACHMENT"]
                .iter()
                .any(|suffix| self.action_type.ends_with(suffix))
    }

    /// Identity of the synced record.
    ///
    /// Uses `api.id`, then `api.body.data.id`, then the request path.
    #[must_use]
    pub fn synced_id(&self) -> String {
        let id = self.api.id.as_ref().or_else(|| {
            self.api
                .body
                .as_ref()
                .and_then(|body| body.get("data"))
                .and_then(|data| data.get("id"))
        });

        match id {
            Some(Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => self.api.path.clone(),
        }
    }
}

/// Upload state of one attachment field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentStatus {
    /// Record type owning the field.
    pub record_type: String,
    /// Field holding the attachment.
    #[serde(rename = "fieldName")]
    pub field_name: String,
    /// The field's head action is being sent.
    pub processing: bool,
    /// More actions for the field are still queued.
    pub pending: bool,
    /// The field's last action was dropped after failing.
    pub error: bool,
}

impl AttachmentStatus {
    /// Action type under which the status is published.
    #[must_use]
    pub fn action_type(&self) -> String {
        format!("{}/SET_ATTACHMENT_STATUS", self.record_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_persisted_shape() {
        let item: QueueItem = serde_json::from_value(json!({
            "id": 4,
            "type": "cases/SAVE_ATTACHMENT",
            "api": {
                "path": "cases/c1/attachments",
                "method": "POST",
                "body": {"data": {"field_name": "photos"}}
            },
            "fromAttachment": {"field_name": "photos", "record_type": "cases"}
        }))
        .unwrap();

        assert_eq!(item.id, Some(4));
        assert_eq!(item.api.method, Method::Post);
        assert!(item.touches_attachment("cases", "photos"));
        assert!(!item.counts_as_synced());
    }

    #[test]
    fn test_method_defaults_to_get() {
        let item: QueueItem =
            serde_json::from_value(json!({"type": "cases/FETCH", "api": {"path": "cases"}}))
                .unwrap();
        assert_eq!(item.api.method, Method::Get);
        assert!(!item.counts_as_synced());
    }

    #[test]
    fn test_attachment_requires_attachment_type() {
        let item = QueueItem::new("cases/SAVE_RECORD", ApiRequest::new(Method::Patch, "cases/c1"))
            .with_attachment("cases", "photos");
        assert!(item.attachment().is_none());
        assert!(item.counts_as_synced());
    }

    #[test]
    fn test_synced_id_sources() {
        let by_api = QueueItem::new(
            "cases/SAVE_RECORD",
            ApiRequest::new(Method::Patch, "cases/c1").with_id("c1"),
        );
        assert_eq!(by_api.synced_id(), "c1");

        let by_body = QueueItem::new(
            "cases/SAVE_RECORD",
            ApiRequest::new(Method::Post, "cases").with_body(json!({"data": {"id": 12}})),
        );
        assert_eq!(by_body.synced_id(), "12");

        let by_path = QueueItem::new("cases/SAVE_RECORD", ApiRequest::new(Method::Post, "cases"));
        assert_eq!(by_path.synced_id(), "cases");
    }

    #[test]
    fn test_method_names() {
        assert_eq!(Method::from_name("patch"), Some(Method::Patch));
        assert_eq!(Method::from_name("TRACE"), None);
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_attachment_status_action_type() {
        let status = AttachmentStatus {
            record_type: "cases".to_string(),
            field_name: "photos".to_string(),
            processing: true,
            pending: false,
            error: false,
        };
        assert_eq!(status.action_type(), "cases/SET_ATTACHMENT_STATUS");
    }
}
