//! EventSink port - エディタへの通知

use crate::domain::StatusNotification;

/// Receives status notifications meant for the editor.
///
/// Delivery is best effort: a sink whose consumer is gone drops the
/// notification.
pub trait EventSink: Send + Sync {
    fn notify(&self, notification: StatusNotification);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn notify(&self, _notification: StatusNotification) {}
}
