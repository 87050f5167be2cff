//! Messages flowing into and out of the action queue.

use super::item::{AttachmentStatus, QueueItem};

/// Topic of `QueueEvent::Add`.
pub const QUEUE_ADD: &str = "queue-add";
/// Topic of `QueueEvent::Success`.
pub const QUEUE_SUCCESS: &str = "queue-success";
/// Topic of `QueueEvent::Failed`.
pub const QUEUE_FAILED: &str = "queue-failed";
/// Topic of `QueueEvent::Skip`.
pub const QUEUE_SKIP: &str = "queue-skip";
/// Topic of `QueueEvent::Finished`.
pub const QUEUE_FINISHED: &str = "queue-finished";

/// Input to the action queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// Append actions to the tail.
    Add(Vec<QueueItem>),
    /// The head action was sent successfully.
    Success(QueueItem),
    /// The head action failed.
    Failed,
    /// Drop the head action without sending it again.
    Skip,
    /// The head action completed outside the regular dispatch path.
    Finished(Option<String>),
}

impl QueueEvent {
    /// Topic name of this event.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::Add(_) => QUEUE_ADD,
            Self::Success(_) => QUEUE_SUCCESS,
            Self::Failed => QUEUE_FAILED,
            Self::Skip => QUEUE_SKIP,
            Self::Finished(_) => QUEUE_FINISHED,
        }
    }
}

/// Receiver of everything the queue emits.
///
/// `dispatch` must not block on the outcome: completion is reported later
/// by feeding `Success` or `Failed` back into the queue.
#[cfg_attr(test, mockall::automock)]
pub trait QueueSink {
    /// Send the head action.
    fn dispatch(&mut self, item: &QueueItem);

    /// Publish the upload state of an attachment field.
    fn attachment_status(&mut self, status: AttachmentStatus);

    /// Announce that `records` records were synced since the last drain.
    fn sync_success(&mut self, records: usize);

    /// The action left the queue.
    fn removed(&mut self, _item: &QueueItem) {}
}
