use crate::models::{Id, Message, Notice};

/// Post-commit notification hooks.
///
/// `message_sent` consumes the committed record and returns the copy handed
/// back to the caller, so an observer that wants to annotate the message does
/// it through the return value instead of a shared mutable reference. The
/// remaining hooks are fire-and-forget. `threads_deleted` only fires when the
/// whole batch succeeded.
pub trait EventHooks: Send + Sync {
    fn message_sent(&self, message: Message) -> Message {
        message
    }
    fn notice_sent(&self, _notice: &Notice) {}
    fn threads_deleting(&self, _ids: &[Id]) {}
    fn threads_deleted(&self, _ids: &[Id]) {}
}

/// Default sink: structured log lines, no annotation.
pub struct LogHooks;

impl EventHooks for LogHooks {
    fn message_sent(&self, message: Message) -> Message {
        tracing::info!(
            message_id = message.id,
            thread_id = message.thread_id,
            sender_id = message.sender_id,
            "message sent"
        );
        message
    }

    fn notice_sent(&self, notice: &Notice) {
        tracing::info!(notice_id = notice.id, "notice sent");
    }

    fn threads_deleting(&self, ids: &[Id]) {
        tracing::debug!(?ids, "deleting threads");
    }

    fn threads_deleted(&self, ids: &[Id]) {
        tracing::info!(count = ids.len(), "threads deleted");
    }
}
