use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Why a notification is being sent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReportSubmitted,
    StatusChanged,
    AppealDecision,
}

/// One outbound notification
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

/// Fire-and-forget delivery of status-change messages
///
/// Delivery is best-effort: implementations swallow and log their own
/// failures, and the engine never rolls back state because a notification
/// did not go out.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Dispatcher that writes notifications to the log
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            title = %notification.title,
            "notification dispatched"
        );
    }
}

/// Dispatcher that buffers notifications in memory
///
/// Useful in tests and for callers that drain and forward in batches.
#[derive(Default)]
pub struct BufferingDispatcher {
    buffer: Mutex<Vec<Notification>>,
}

impl BufferingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything buffered so far
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.buffer.lock())
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

#[async_trait]
impl NotificationDispatcher for BufferingDispatcher {
    async fn notify(&self, notification: Notification) {
        self.buffer.lock().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffering_dispatcher_drains() {
        let dispatcher = BufferingDispatcher::new();
        dispatcher
            .notify(Notification {
                user_id: "u1".into(),
                kind: NotificationKind::StatusChanged,
                title: "Account warned".into(),
                message: "You received a warning".into(),
                data: serde_json::Value::Null,
            })
            .await;

        assert_eq!(dispatcher.len(), 1);
        let drained = dispatcher.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind, NotificationKind::StatusChanged);
        assert!(dispatcher.is_empty());
    }
}
