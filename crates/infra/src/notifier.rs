//! Fire-and-forget notifications.
//!
//! Delivery (email, in-app) lives outside the engine. A failed notification
//! is logged and dropped; it never fails or rolls back the operation that
//! triggered it.

use thiserror::Error;

use bazaar_events::{EventBus, Notification};

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Publishes notifications onto an [`EventBus`].
#[derive(Debug)]
pub struct BusNotifier<B> {
    bus: B,
}

impl<B> BusNotifier<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> Notifier for BusNotifier<B>
where
    B: EventBus<Notification>,
{
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.bus
            .publish(notification)
            .map_err(|e| NotifyError(format!("{e:?}")))
    }
}

/// Deliver a notification, logging instead of propagating failures.
pub(crate) fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    let topic = notification.topic();
    let vendor_id = notification.vendor_id();
    if let Err(err) = notifier.notify(notification) {
        tracing::warn!(topic, %vendor_id, error = %err, "notification dropped");
    }
}
