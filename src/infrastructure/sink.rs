//! Notification sink that emits through `tracing`.
//!
//! Hosts without a mail transport can still see notifications: each one is an
//! `ERROR` event on the [`NOTIFY_TARGET`] target, which any subscriber can
//! route to a pager, a chat webhook or plain stderr.

use crate::application::ports::NotificationSink;
use crate::domain::report::Notification;
use crate::error::NotifyError;

/// Target of notification events.
pub const NOTIFY_TARGET: &str = "fault_reporter::notify";

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationSink for TracingSink {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::error!(
            target: NOTIFY_TARGET,
            to = %notification.to,
            sender = notification.sender.as_deref().unwrap_or(""),
            subject = %notification.subject,
            body = %notification.body,
            "{}",
            notification.subject
        );
        Ok(())
    }
}
