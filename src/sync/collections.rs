//! Routing of server payloads into local collections.
//!
//! Responses carry their documents under `data`. Depending on the target
//! collection the documents are stored as typed records, as a catalogue of
//! documents, or as a single settings document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::SyncError;
use crate::storage::{Collection, LocalStore};

/// Where a payload belongs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    /// Record type used as query index (`case`, `incident`, ...).
    #[serde(default, rename = "recordType", alias = "record_type")]
    pub record_type: String,
    /// Collection name.
    pub collection: String,
}

impl SyncTarget {
    /// Target a collection without a record type.
    #[must_use]
    pub fn collection(collection: Collection) -> Self {
        Self {
            record_type: String::new(),
            collection: collection.as_str().to_string(),
        }
    }

    /// Target typed records.
    #[must_use]
    pub fn records(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            collection: Collection::Records.as_str().to_string(),
        }
    }

    fn record_type(&self) -> Option<&str> {
        Some(self.record_type.as_str()).filter(|t| !t.is_empty())
    }
}

/// Direction of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    /// Store the payload.
    #[default]
    Write,
    /// Read the stored documents.
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    Records,
    Catalogue,
    Singleton,
    User,
}

const fn handler_for(collection: Collection) -> Option<Handler> {
    match collection {
        Collection::Records => Some(Handler::Records),
        Collection::Options
        | Collection::Locations
        | Collection::Forms
        | Collection::Idp
        | Collection::Dashboards
        | Collection::Logos => Some(Handler::Catalogue),
        Collection::SystemSettings
        | Collection::Permissions
        | Collection::Primero
        | Collection::ContactInformation => Some(Handler::Singleton),
        Collection::User => Some(Handler::User),
        Collection::OfflineRequests => None,
    }
}

/// Store or read `json` for `target`.
///
/// Writes return `json` unchanged; reads return `{"data": ...}` built from
/// the store. Targets without a handler (unknown names, `offline_requests`)
/// return `json` untouched.
///
/// # Errors
///
/// Returns an error if the payload has the wrong shape or storage fails.
pub fn sync_collection(
    store: &LocalStore,
    target: &SyncTarget,
    json: Value,
    method: SyncMethod,
) -> Result<Value, SyncError> {
    let Some((collection, handler)) = target
        .collection
        .parse::<Collection>()
        .ok()
        .and_then(|c| handler_for(c).map(|h| (c, h)))
    else {
        return Ok(json);
    };

    debug!(%collection, ?handler, ?method, "syncing collection");

    match method {
        SyncMethod::Write => {
            save(store, collection, handler, target, &json)?;
            Ok(json)
        },
        SyncMethod::Read => find(store, collection, handler, target, &json),
    }
}

fn payload(json: &Value) -> &Value {
    json.get("data").unwrap_or(json)
}

fn save(
    store: &LocalStore,
    collection: Collection,
    handler: Handler,
    target: &SyncTarget,
    json: &Value,
) -> Result<(), SyncError> {
    let data = payload(json).clone();

    match handler {
        Handler::Records | Handler::Catalogue => {
            let index = target.record_type();
            if data.is_array() {
                store.bulk_add(collection, data, index)?;
            } else if data.get("id").is_some() || handler == Handler::Records {
                store.put(collection, data, None, index)?;
            } else {
                store.bulk_add(collection, data, index)?;
            }
        },
        Handler::Singleton => {
            store.put(collection, data, Some(&json!(collection.as_str())), None)?;
        },
        Handler::User => {
            let key = data
                .get("user_name")
                .or_else(|| data.get("id"))
                .cloned()
                .unwrap_or_else(|| json!("current"));
            store.put(collection, data, Some(&key), None)?;
        },
    }
    Ok(())
}

fn find(
    store: &LocalStore,
    collection: Collection,
    handler: Handler,
    target: &SyncTarget,
    json: &Value,
) -> Result<Value, SyncError> {
    let requested = payload(json).get("id");

    let data = match (handler, requested) {
        (Handler::Records | Handler::Catalogue, Some(id)) => {
            store.get(collection, id)?.unwrap_or(Value::Null)
        },
        (Handler::Records, None) => match target.record_type() {
            Some(record_type) => Value::Array(store.get_all_from_index(collection, record_type)?),
            None => Value::Array(store.get_all(collection)?),
        },
        (Handler::Catalogue, None) => Value::Array(store.get_all(collection)?),
        (Handler::Singleton, _) => store
            .get(collection, &json!(collection.as_str()))?
            .map(|mut doc| {
                if let Value::Object(map) = &mut doc {
                    map.remove("id");
                }
                doc
            })
            .unwrap_or(Value::Null),
        (Handler::User, _) => store
            .get_all(collection)?
            .into_iter()
            .next()
            .unwrap_or(Value::Null),
    };

    Ok(json!({ "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SchemaRegistry;

    fn create_test_store() -> LocalStore {
        LocalStore::open_in_memory(SchemaRegistry::default()).unwrap()
    }

    #[test]
    fn test_records_write_and_read_by_type() {
        let store = create_test_store();

        let response = json!({"data": [{"id": "c1", "name": "Ana"}, {"id": "c2"}]});
        let returned =
            sync_collection(&store, &SyncTarget::records("case"), response.clone(), SyncMethod::Write)
                .unwrap();
        assert_eq!(returned, response);

        sync_collection(
            &store,
            &SyncTarget::records("incident"),
            json!({"data": {"id": "i1"}}),
            SyncMethod::Write,
        )
        .unwrap();

        let cases = sync_collection(
            &store,
            &SyncTarget::records("case"),
            Value::Null,
            SyncMethod::Read,
        )
        .unwrap();
        assert_eq!(cases["data"].as_array().map(Vec::len), Some(2));
        assert_eq!(cases["data"][0]["type"], "case");

        let one = sync_collection(
            &store,
            &SyncTarget::records("incident"),
            json!({"data": {"id": "i1"}}),
            SyncMethod::Read,
        )
        .unwrap();
        assert_eq!(one["data"]["id"], "i1");
    }

    #[test]
    fn test_singleton_settings() {
        let store = create_test_store();
        let target = SyncTarget::collection(Collection::SystemSettings);

        sync_collection(
            &store,
            &target,
            json!({"data": {"default_locale": "en", "locales": ["en"]}}),
            SyncMethod::Write,
        )
        .unwrap();
        sync_collection(
            &store,
            &target,
            json!({"data": {"default_locale": "fr"}}),
            SyncMethod::Write,
        )
        .unwrap();

        let read = sync_collection(&store, &target, Value::Null, SyncMethod::Read).unwrap();
        assert_eq!(
            read,
            json!({"data": {"default_locale": "fr", "locales": ["en"]}})
        );
    }

    #[test]
    fn test_catalogue_mapping_payload() {
        let store = create_test_store();
        let target = SyncTarget::collection(Collection::Options);

        sync_collection(
            &store,
            &target,
            json!({"data": {"lookup-sex": {"values": ["f"]}}}),
            SyncMethod::Write,
        )
        .unwrap();

        assert!(store
            .get(Collection::Options, &json!("lookup-sex"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_user_keyed_by_user_name() {
        let store = create_test_store();
        let target = SyncTarget::collection(Collection::User);

        sync_collection(
            &store,
            &target,
            json!({"data": {"user_name": "primero", "locale": "en"}}),
            SyncMethod::Write,
        )
        .unwrap();

        let read = sync_collection(&store, &target, Value::Null, SyncMethod::Read).unwrap();
        assert_eq!(read["data"]["id"], "primero");
        assert_eq!(read["data"]["locale"], "en");
    }

    #[test]
    fn test_unrouted_collection_passes_through() {
        let store = create_test_store();
        let payload = json!({"data": [{"id": 1}]});

        let unknown = SyncTarget {
            record_type: String::new(),
            collection: "reports".to_string(),
        };
        assert_eq!(
            sync_collection(&store, &unknown, payload.clone(), SyncMethod::Write).unwrap(),
            payload
        );

        let queue = SyncTarget::collection(Collection::OfflineRequests);
        sync_collection(&store, &queue, payload, SyncMethod::Write).unwrap();
        assert_eq!(store.count(Collection::OfflineRequests).unwrap(), 0);
    }

    #[test]
    fn test_target_deserializes_camel_case() {
        let target: SyncTarget =
            serde_json::from_value(json!({"recordType": "case", "collection": "records"})).unwrap();
        assert_eq!(target, SyncTarget::records("case"));
    }
}
