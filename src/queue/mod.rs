//! Offline action queue.
//!
//! Writes made while offline are persisted in `offline_requests` and replayed
//! in order once the server is reachable.

pub mod action_queue;
pub mod events;
pub mod http;
pub mod item;
pub mod runner;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

pub use action_queue::{ActionQueue, QueueState, DEFAULT_MAX_TRIES};
pub use events::{
    QueueEvent, QueueSink, QUEUE_ADD, QUEUE_FAILED, QUEUE_FINISHED, QUEUE_SKIP, QUEUE_SUCCESS,
};
pub use http::{HttpTransport, Transport};
pub use item::{ApiRequest, AttachmentRef, AttachmentStatus, Method, QueueItem};
pub use runner::{format_sync_report, RunnerSink, SyncReport, SyncRunner};

use crate::error::SyncError;
use crate::storage::{Collection, LocalStore};

/// Read the persisted offline requests in queue order.
///
/// Unreadable requests are logged and skipped.
///
/// # Errors
///
/// Returns an error if the collection cannot be read.
pub fn load_offline(store: &LocalStore) -> Result<Vec<QueueItem>, SyncError> {
    let mut items = Vec::new();
    for doc in store.get_all(Collection::OfflineRequests)? {
        match serde_json::from_value::<QueueItem>(doc) {
            Ok(item) => items.push(item),
            Err(e) => warn!(error = %e, "ignoring unreadable offline request"),
        }
    }
    Ok(items)
}

/// Persist `items` in `offline_requests`, then enqueue them.
///
/// Each item gets its storage key as `id` and a `queued_at` timestamp if it
/// has none. Returns the items as enqueued.
///
/// # Errors
///
/// Returns an error if an item cannot be persisted. Items persisted before
/// the failure are not enqueued.
pub fn enqueue_offline<S: QueueSink>(
    store: &LocalStore,
    queue: &mut ActionQueue<S>,
    items: Vec<QueueItem>,
) -> Result<Vec<QueueItem>, SyncError> {
    let mut persisted = Vec::with_capacity(items.len());

    for mut item in items {
        item.queued_at.get_or_insert_with(Utc::now);
        let doc = serde_json::to_value(&item)?;

        let key = match item.id {
            Some(id) => store.put(Collection::OfflineRequests, doc, Some(&Value::from(id)), None)?,
            None => store.add(Collection::OfflineRequests, doc)?,
        };
        item.id = Some(key.parse().map_err(|_| {
            SyncError::InvalidItem(format!("offline request stored under non-numeric key {key}"))
        })?);

        persisted.push(item);
    }

    queue.handle(QueueEvent::Add(persisted.clone()));
    Ok(persisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SchemaRegistry;

    #[derive(Default)]
    struct NullSink;

    impl QueueSink for NullSink {
        fn dispatch(&mut self, _item: &QueueItem) {}
        fn attachment_status(&mut self, _status: AttachmentStatus) {}
        fn sync_success(&mut self, _records: usize) {}
    }

    #[test]
    fn test_enqueue_offline_assigns_ids() {
        let store = LocalStore::open_in_memory(SchemaRegistry::default()).unwrap();
        let mut queue = ActionQueue::new(NullSink, DEFAULT_MAX_TRIES);

        let items = vec![
            QueueItem::new("cases/SAVE_RECORD", ApiRequest::new(Method::Post, "cases")),
            QueueItem::new("cases/SAVE_RECORD", ApiRequest::new(Method::Post, "cases")),
        ];
        let queued = enqueue_offline(&store, &mut queue, items).unwrap();

        assert_eq!(queued[0].id, Some(1));
        assert_eq!(queued[1].id, Some(2));
        assert!(queued.iter().all(|i| i.queued_at.is_some()));
        assert_eq!(queue.len(), 2);

        let stored = store.get_all(Collection::OfflineRequests).unwrap();
        let restored: QueueItem = serde_json::from_value(stored[1].clone()).unwrap();
        assert_eq!(restored, queued[1]);
    }
}
