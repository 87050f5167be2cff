//! Drives an action queue against a transport until it drains.
//!
//! The runner owns the local store, the queue and the event channel. Each
//! dispatched action is sent through the transport and its outcome is fed
//! back into the queue as an event, one action at a time.

use std::sync::mpsc::{self, Receiver, Sender};

use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::action_queue::ActionQueue;
use super::events::{QueueEvent, QueueSink};
use super::http::Transport;
use super::item::{AttachmentStatus, QueueItem};
use crate::error::SyncError;
use crate::storage::{Collection, LocalStore};
use crate::sync::{sync_collection, SyncMethod, SyncTarget};

/// Sink collecting the queue's output between runner steps.
#[derive(Debug, Default)]
pub struct RunnerSink {
    outbox: Option<QueueItem>,
    removed: Vec<QueueItem>,
    statuses: Vec<AttachmentStatus>,
    notifications: Vec<usize>,
}

impl QueueSink for RunnerSink {
    fn dispatch(&mut self, item: &QueueItem) {
        self.outbox = Some(item.clone());
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

/// Outcome of one run.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    /// Actions sent successfully
    pub succeeded: usize,
    /// Failed send attempts, retried or not
    pub failed_attempts: usize,
    /// Actions dropped after exhausting their tries
    pub dropped: usize,
    /// Actions skipped
    pub skipped: usize,
    /// Records announced as synced
    pub synced_records: usize,
    /// Attachment status updates, in emission order
    pub attachment_updates: Vec<AttachmentStatus>,
    /// Transport errors, in order
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Total actions that left the queue.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.dropped + self.skipped
    }

    /// Whether every action was sent.
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.dropped == 0
    }
}

/// Queue runner.
pub struct SyncRunner<T> {
    store: LocalStore,
    queue: ActionQueue<RunnerSink>,
    transport: T,
    tx: Sender<QueueEvent>,
    rx: Receiver<QueueEvent>,
}

impl<T: Transport> SyncRunner<T> {
    /// Create a runner over `store`.
    #[must_use]
    pub fn new(store: LocalStore, transport: T, max_tries: u32) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            store,
            queue: ActionQueue::new(RunnerSink::default(), max_tries),
            transport,
            tx,
            rx,
        }
    }

    /// Enqueue the persisted offline requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn hydrate(&mut self) -> Result<usize, SyncError> {
        self.queue.hydrate(&self.store)
    }

    /// Channel for feeding events from elsewhere.
    #[must_use]
    pub fn sender(&self) -> Sender<QueueEvent> {
        self.tx.clone()
    }

    /// Persist `items` as offline requests and enqueue them.
    ///
    /// # Errors
    ///
    /// Returns an error if an item cannot be persisted.
    pub fn enqueue(&mut self, items: Vec<QueueItem>) -> Result<Vec<QueueItem>, SyncError> {
        super::enqueue_offline(&self.store, &mut self.queue, items)
    }

    /// Drop the head action without sending it.
    pub fn skip(&mut self) -> Option<QueueItem> {
        let head = self.queue.head().cloned();
        self.queue.handle(QueueEvent::Skip);
        self.apply_removals();
        head
    }

    /// Send queued actions until the queue drains.
    ///
    /// Once the queue is empty a `Finished` event is fed back, which
    /// produces the sync-success notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the event channel is closed.
    pub fn run(&mut self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let mut finished = false;
        self.queue.start();

        loop {
            self.apply_removals();

            if let Some(item) = self.queue.sink_mut().outbox.take() {
                let event = self.send(&item, &mut report);
                self.tx.send(event).map_err(|_| SyncError::Closed)?;
            }

            let Ok(event) = self.rx.try_recv() else {
                if finished || !self.queue.is_empty() {
                    break;
                }
                finished = true;
                self.tx
                    .send(QueueEvent::Finished(None))
                    .map_err(|_| SyncError::Closed)?;
                continue;
            };

            let before = self.queue.len();
            match &event {
                QueueEvent::Success(_) => report.succeeded += 1,
                QueueEvent::Failed => report.failed_attempts += 1,
                QueueEvent::Skip => report.skipped += 1,
                QueueEvent::Add(_) | QueueEvent::Finished(_) => {},
            }
            let failed = matches!(event, QueueEvent::Failed);

            self.queue.handle(event);

            if failed && self.queue.len() < before {
                report.dropped += 1;
            }
        }

        let sink = self.queue.sink_mut();
        report.attachment_updates = std::mem::take(&mut sink.statuses);
        report.synced_records = std::mem::take(&mut sink.notifications).into_iter().sum();

        info!(
            succeeded = report.succeeded,
            dropped = report.dropped,
            remaining = self.queue.len(),
            "sync run finished"
        );
        Ok(report)
    }

    fn send(&mut self, item: &QueueItem, report: &mut SyncReport) -> QueueEvent {
        match self.transport.send(&item.api) {
            Ok(response) => {
                if let Some(target) = &item.api.db {
                    self.store_response(target, response);
                }
                QueueEvent::Success(item.clone())
            },
            Err(e) => {
                warn!(action = %item.action_type, error = %e, "dispatch failed");
                report.errors.push(format!("{}: {e}", item.action_type));
                QueueEvent::Failed
            },
        }
    }

    /// Write a response into its target collection. New forms can declare
    /// subform lists, so the schemas are refreshed after forms are written.
    fn store_response(&mut self, target: &SyncTarget, response: Value) {
        if let Err(e) = sync_collection(&self.store, target, response, SyncMethod::Write) {
            warn!(collection = %target.collection, error = %e, "failed to store response");
            return;
        }

        if target.collection == Collection::Forms.as_str() {
            if let Err(e) = self.store.refresh_schemas_from_forms() {
                warn!(error = %e, "failed to refresh schemas from forms");
            }
        }
    }

    fn apply_removals(&mut self) {
        for item in std::mem::take(&mut self.queue.sink_mut().removed) {
            let Some(id) = item.id else { continue };
            if let Err(e) = self.store.delete(Collection::OfflineRequests, &json!(id)) {
                warn!(id, error = %e, "failed to delete offline request");
            }
        }
    }

    /// The queue.
    #[must_use]
    pub const fn queue(&self) -> &ActionQueue<RunnerSink> {
        &self.queue
    }

    /// The local store.
    #[must_use]
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Close the queue and the store.
    pub fn close(&mut self) {
        self.queue.close();
        self.store.close();
    }
}

/// Format a sync report for display.
#[must_use]
pub fn format_sync_report(report: &SyncReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Sync completed: {} actions", report.total()));
    lines.push("─".repeat(40));

    if report.succeeded > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} sent", report.succeeded).green()
        ));
    }

    if report.synced_records > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} records synced", report.synced_records).green()
        ));
    }

    if report.dropped > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} dropped after repeated failures", report.dropped).red()
        ));
    }

    if report.skipped > 0 {
        lines.push(format!(
            "  {} {}",
            "○".yellow(),
            format!("{} skipped", report.skipped).yellow()
        ));
    }

    if !report.errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for err in report.errors.iter().take(3) {
            lines.push(format!("  - {err}"));
        }
    }

    lines.join("\n")
}
