//! Outbound notification boundary.
//!
//! State-machine code hands a [`Notification`] to the sink only after its
//! transaction has committed. Delivery is fire-and-forget from the caller's
//! point of view: a sink failure is the notification subsystem's problem and
//! never rolls back a committed transition.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReservationReceived,
    ReservationConfirmed,
    ReservationCancelled,
    BookCheckedOut,
    ReturnReminder,
    BookReturned,
    AccountBlocked,
    BookAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        recipient: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            recipient: recipient.into(),
            payload,
        }
    }
}

#[mockall::automock]
pub trait NotificationSink: Send + Sync {
    /// Enqueue one message. Must not block and must not panic on a full or
    /// closed queue; dropping the message is acceptable, losing a committed
    /// state transition is not.
    fn notify(&self, note: Notification);
}
