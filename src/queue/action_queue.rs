//! Sequential dispatcher for queued actions.
//!
//! The queue sends one action at a time, strictly in FIFO order. An action
//! stays at the head until an event reports its outcome; the queue never
//! removes it on its own.

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, info, warn};

use super::events::{QueueEvent, QueueSink};
use super::item::{AttachmentStatus, QueueItem};
use crate::error::SyncError;
use crate::storage::LocalStore;

/// Consecutive failures after which the head action is dropped.
pub const DEFAULT_MAX_TRIES: u32 = 3;

/// Externally visible queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// The head action was sent and its outcome is awaited.
    Pending,
    /// The next action may be sent.
    Ready,
    /// The queue was closed.
    Halted,
}

/// In-memory action queue.
pub struct ActionQueue<S> {
    items: VecDeque<QueueItem>,
    success: BTreeSet<String>,
    tries: u32,
    max_tries: u32,
    working: bool,
    in_flight: bool,
    closed: bool,
    sink: S,
}

impl<S: QueueSink> ActionQueue<S> {
    /// Create an empty queue emitting to `sink`.
    #[must_use]
    pub fn new(sink: S, max_tries: u32) -> Self {
        Self {
            items: VecDeque::new(),
            success: BTreeSet::new(),
            tries: 0,
            max_tries: max_tries.max(1),
            working: false,
            in_flight: false,
            closed: false,
            sink,
        }
    }

    /// Load the persisted `offline_requests` and enqueue them.
    ///
    /// Unreadable requests are logged and left in the store. Returns the
    /// number of actions enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    pub fn hydrate(&mut self, store: &LocalStore) -> Result<usize, SyncError> {
        let items = super::load_offline(store)?;
        let count = items.len();
        if count > 0 {
            info!(count, "restored offline requests");
        }
        self.handle(QueueEvent::Add(items));
        Ok(count)
    }

    /// Apply one event.
    pub fn handle(&mut self, event: QueueEvent) {
        if self.closed {
            debug!(topic = event.topic(), "ignoring event on closed queue");
            return;
        }

        debug!(topic = event.topic(), len = self.items.len(), "queue event");
        match event {
            QueueEvent::Add(items) => self.add(items),
            QueueEvent::Success(item) => self.on_success(&item),
            QueueEvent::Failed => self.on_failed(),
            QueueEvent::Skip => self.on_skip(),
            QueueEvent::Finished(_) => self.on_finished(),
        }
    }

    /// Send the head action if nothing is in flight.
    pub fn start(&mut self) {
        self.process();
    }

    /// Stop processing. Later events are ignored.
    pub fn close(&mut self) {
        self.closed = true;
        self.in_flight = false;
    }

    fn add(&mut self, items: Vec<QueueItem>) {
        self.items.extend(items);
        self.process();
    }

    fn on_success(&mut self, item: &QueueItem) {
        if item.counts_as_synced() {
            self.success.insert(item.synced_id());
        }

        self.tries = 0;
        self.pop_head();
        self.on_attachment(item, false, false);
        self.process();
    }

    fn on_failed(&mut self) {
        self.in_flight = false;
        self.tries += 1;

        if self.tries >= self.max_tries {
            self.tries = 0;
            if let Some(item) = self.pop_head() {
                warn!(
                    action = %item.action_type,
                    path = %item.api.path,
                    tries = self.max_tries,
                    "dropping action after repeated failures"
                );
                self.on_attachment(&item, false, true);
            }
        }

        self.process();
    }

    fn on_skip(&mut self) {
        self.tries = 0;
        self.pop_head();
        self.process();
    }

    fn on_finished(&mut self) {
        self.pop_head();
        self.process();
        self.notify_if_drained();
    }

    fn pop_head(&mut self) -> Option<QueueItem> {
        self.in_flight = false;
        let head = self.items.pop_front();
        if let Some(item) = &head {
            self.sink.removed(item);
        }
        head
    }

    fn process(&mut self) {
        if self.working || self.in_flight || self.closed {
            return;
        }
        self.working = true;

        if let Some(item) = self.items.front().cloned() {
            self.on_attachment(&item, true, false);
            debug!(action = %item.action_type, path = %item.api.path, "dispatching");
            self.in_flight = true;
            self.sink.dispatch(&item);
        }

        self.working = false;
    }

    fn on_attachment(&mut self, item: &QueueItem, processing: bool, error: bool) {
        let Some(attachment) = item.attachment() else {
            return;
        };

        let status = AttachmentStatus {
            record_type: attachment.record_type.clone(),
            field_name: attachment.field_name.clone(),
            processing,
            pending: self.has_attachments(&attachment.record_type, &attachment.field_name),
            error,
        };
        self.sink.attachment_status(status);
    }

    /// Only `Finished` reports synced records, and only once the queue is empty.
    fn notify_if_drained(&mut self) {
        if !self.items.is_empty() || self.success.is_empty() {
            return;
        }

        let records = self.success.len();
        info!(records, "offline changes synced");
        self.sink.sync_success(records);
        self.success.clear();
    }

    /// Whether any queued action targets the given attachment field.
    #[must_use]
    pub fn has_attachments(&self, record_type: &str, field_name: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.touches_attachment(record_type, field_name))
    }

    /// Whether actions are waiting.
    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.items.is_empty()
    }

    /// Number of queued actions, including the head.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The head action.
    #[must_use]
    pub fn head(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    /// Queued actions in dispatch order.
    pub fn items(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    /// Consecutive failures of the head action.
    #[must_use]
    pub const fn tries(&self) -> u32 {
        self.tries
    }

    /// Records synced since the last drain.
    #[must_use]
    pub fn synced_count(&self) -> usize {
        self.success.len()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> QueueState {
        if self.closed {
            QueueState::Halted
        } else if self.in_flight {
            QueueState::Pending
        } else {
            QueueState::Ready
        }
    }

    /// The sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::events::MockQueueSink;
    use crate::queue::item::{ApiRequest, Method};
    use crate::storage::Collection;
    use crate::sync::SchemaRegistry;
    use mockall::predicate::eq;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        dispatched: Vec<QueueItem>,
        statuses: Vec<AttachmentStatus>,
        notifications: Vec<usize>,
        removed: Vec<QueueItem>,
    }

    impl QueueSink for RecordingSink {
        fn dispatch(&mut self, item: &QueueItem) {
            self.dispatched.push(item.clone());
        }

        fn attachment_status(&mut self, status: AttachmentStatus) {
            self.statuses.push(status);
        }

        fn sync_success(&mut self, records: usize) {
            self.notifications.push(records);
        }

        fn removed(&mut self, item: &QueueItem) {
            self.removed.push(item.clone());
        }
    }

    fn save(id: &str) -> QueueItem {
        QueueItem::new(
            "cases/SAVE_RECORD",
            ApiRequest::new(Method::Patch, format!("cases/{id}")).with_id(id),
        )
    }

    fn upload(field: &str) -> QueueItem {
        QueueItem::new(
            "cases/SAVE_ATTACHMENT",
            ApiRequest::new(Method::Post, "cases/c1/attachments"),
        )
        .with_attachment("cases", field)
    }

    fn paths(queue: &ActionQueue<RecordingSink>) -> Vec<String> {
        queue.items().map(|i| i.api.path.clone()).collect()
    }

    fn new_queue() -> ActionQueue<RecordingSink> {
        ActionQueue::new(RecordingSink::default(), DEFAULT_MAX_TRIES)
    }

    #[test]
    fn test_add_dispatches_head_once() {
        let mut queue = new_queue();

        queue.handle(QueueEvent::Add(vec![save("a"), save("b")]));
        queue.handle(QueueEvent::Add(vec![save("c")]));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.state(), QueueState::Pending);
        assert_eq!(queue.sink().dispatched, vec![save("a")]);
    }

    #[test]
    fn test_success_removes_exactly_the_head() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![save("a"), save("b"), save("c")]));

        queue.handle(QueueEvent::Success(save("a")));

        assert_eq!(paths(&queue), vec!["cases/b", "cases/c"]);
        assert_eq!(queue.sink().dispatched.len(), 2);
        assert_eq!(queue.sink().dispatched[1], save("b"));
        assert_eq!(queue.sink().removed, vec![save("a")]);
    }

    #[test]
    fn test_three_failures_drop_the_head() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![save("a"), save("b")]));

        queue.handle(QueueEvent::Failed);
        assert_eq!(queue.tries(), 1);
        queue.handle(QueueEvent::Failed);
        assert_eq!(queue.tries(), 2);
        assert_eq!(paths(&queue), vec!["cases/a", "cases/b"]);

        queue.handle(QueueEvent::Failed);
        assert_eq!(queue.tries(), 0);
        assert_eq!(paths(&queue), vec!["cases/b"]);

        let dispatched: Vec<_> = queue
            .sink()
            .dispatched
            .iter()
            .map(|i| i.api.path.as_str())
            .collect();
        assert_eq!(dispatched, vec!["cases/a", "cases/a", "cases/a", "cases/b"]);
    }

    #[test]
    fn test_success_after_retry_resets_counter() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![save("a"), save("b")]));

        queue.handle(QueueEvent::Failed);
        queue.handle(QueueEvent::Failed);
        queue.handle(QueueEvent::Success(save("a")));

        assert_eq!(queue.tries(), 0);
        queue.handle(QueueEvent::Failed);
        assert_eq!(queue.tries(), 1);
        assert_eq!(paths(&queue), vec!["cases/b"]);
    }

    #[test]
    fn test_skip_resets_counter_and_drops_head() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![save("a"), save("b")]));

        queue.handle(QueueEvent::Failed);
        queue.handle(QueueEvent::Skip);

        assert_eq!(queue.tries(), 0);
        assert_eq!(paths(&queue), vec!["cases/b"]);
        assert_eq!(queue.sink().dispatched.last(), Some(&save("b")));
    }

    #[test]
    fn test_drain_notifies_once_with_distinct_ids() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![save("a"), save("a"), save("b")]));

        queue.handle(QueueEvent::Success(save("a")));
        queue.handle(QueueEvent::Success(save("a")));
        assert_eq!(queue.synced_count(), 1);

        queue.handle(QueueEvent::Success(save("b")));
        assert!(queue.is_empty());
        assert!(queue.sink().notifications.is_empty());
        assert_eq!(queue.synced_count(), 2);

        queue.handle(QueueEvent::Finished(None));
        assert_eq!(queue.sink().notifications, vec![2]);
        assert_eq!(queue.synced_count(), 0);

        queue.handle(QueueEvent::Finished(None));
        assert_eq!(queue.sink().notifications, vec![2]);
    }

    #[test]
    fn test_only_finished_notifies() {
        let mut queue = new_queue();

        queue.handle(QueueEvent::Add(vec![save("a")]));
        queue.handle(QueueEvent::Success(save("a")));
        assert!(queue.sink().notifications.is_empty());

        queue.handle(QueueEvent::Add(vec![save("b")]));
        queue.handle(QueueEvent::Skip);
        queue.handle(QueueEvent::Add(vec![save("c")]));
        for _ in 0..DEFAULT_MAX_TRIES {
            queue.handle(QueueEvent::Failed);
        }
        assert!(queue.is_empty());
        assert!(queue.sink().notifications.is_empty());

        queue.handle(QueueEvent::Finished(None));
        assert_eq!(queue.sink().notifications, vec![1]);
    }

    #[test]
    fn test_finished_with_items_left_does_not_notify() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![save("a"), save("b"), save("c")]));
        queue.handle(QueueEvent::Success(save("a")));

        queue.handle(QueueEvent::Finished(Some("b".to_string())));

        assert_eq!(paths(&queue), vec!["cases/c"]);
        assert!(queue.sink().notifications.is_empty());
        assert_eq!(queue.synced_count(), 1);
    }

    #[test]
    fn test_reads_and_uploads_are_not_counted() {
        let mut queue = new_queue();
        let fetch = QueueItem::new("cases/FETCH", ApiRequest::new(Method::Get, "cases"));
        queue.handle(QueueEvent::Add(vec![fetch.clone(), upload("photos")]));

        queue.handle(QueueEvent::Success(fetch));
        queue.handle(QueueEvent::Success(upload("photos")));

        assert!(queue.is_empty());
        assert!(queue.sink().notifications.is_empty());
    }

    #[test]
    fn test_finished_drops_head_and_notifies() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![save("a"), save("b")]));
        queue.handle(QueueEvent::Success(save("a")));

        queue.handle(QueueEvent::Finished(Some("b".to_string())));

        assert!(queue.is_empty());
        assert_eq!(queue.sink().notifications, vec![1]);
    }

    #[test]
    fn test_attachment_statuses() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![upload("photos"), upload("photos")]));

        let processing = &queue.sink().statuses[0];
        assert!(processing.processing);
        assert!(processing.pending);
        assert!(!processing.error);

        queue.handle(QueueEvent::Success(upload("photos")));
        let done = &queue.sink().statuses[1];
        assert!(!done.processing);
        assert!(done.pending);

        for _ in 0..DEFAULT_MAX_TRIES {
            queue.handle(QueueEvent::Failed);
        }
        let failed = queue.sink().statuses.last().cloned().unwrap();
        assert!(failed.error);
        assert!(!failed.processing);
        assert!(!failed.pending);
        assert_eq!(failed.field_name, "photos");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_custom_threshold() {
        let mut queue = ActionQueue::new(RecordingSink::default(), 1);
        queue.handle(QueueEvent::Add(vec![save("a")]));
        queue.handle(QueueEvent::Failed);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_halts_queue() {
        let mut queue = new_queue();
        queue.handle(QueueEvent::Add(vec![save("a")]));
        queue.close();

        assert_eq!(queue.state(), QueueState::Halted);
        queue.handle(QueueEvent::Success(save("a")));
        queue.handle(QueueEvent::Add(vec![save("b")]));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.sink().dispatched.len(), 1);
    }

    #[test]
    fn test_hydrate_from_store() {
        let store = LocalStore::open_in_memory(SchemaRegistry::default()).unwrap();
        store
            .add(
                Collection::OfflineRequests,
                serde_json::to_value(save("a")).unwrap(),
            )
            .unwrap();
        store
            .add(Collection::OfflineRequests, json!({"garbage": true}))
            .unwrap();
        store
            .add(
                Collection::OfflineRequests,
                serde_json::to_value(save("b")).unwrap(),
            )
            .unwrap();

        let mut queue = new_queue();
        assert_eq!(queue.hydrate(&store).unwrap(), 2);
        assert_eq!(paths(&queue), vec!["cases/a", "cases/b"]);
        assert_eq!(queue.head().and_then(|i| i.id), Some(1));
    }

    #[test]
    fn test_dispatch_called_once_per_attempt() {
        let mut sink = MockQueueSink::new();
        sink.expect_dispatch()
            .with(eq(save("a")))
            .times(2)
            .return_const(());
        sink.expect_removed().times(1).return_const(());
        sink.expect_sync_success().with(eq(1)).times(1).return_const(());
        sink.expect_attachment_status().never();

        let mut queue = ActionQueue::new(sink, DEFAULT_MAX_TRIES);
        queue.handle(QueueEvent::Add(vec![save("a")]));
        queue.handle(QueueEvent::Failed);
        queue.handle(QueueEvent::Success(save("a")));
        queue.handle(QueueEvent::Finished(None));
    }

    #[test]
    fn test_success_alone_never_notifies() {
        let mut sink = MockQueueSink::new();
        sink.expect_dispatch().times(1).return_const(());
        sink.expect_removed().times(1).return_const(());
        sink.expect_sync_success().never();

        let mut queue = ActionQueue::new(sink, DEFAULT_MAX_TRIES);
        queue.handle(QueueEvent::Add(vec![save("a")]));
        queue.handle(QueueEvent::Success(save("a")));
        assert!(queue.is_empty());
    }
}
