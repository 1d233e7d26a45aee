//! Recording notification sink.

use crate::application::ports::NotificationSink;
use crate::domain::report::Notification;
use crate::error::NotifyError;
use std::sync::{Arc, Mutex};

/// Sink that keeps every notification it accepts.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Notification>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications accepted so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }

    /// Reject every following notification with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self
            .failure
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock") =
            Some(reason.into());
    }
}

impl NotificationSink for RecordingSink {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let failure = self
            .failure
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .clone();
        if let Some(reason) = failure {
            return Err(NotifyError::Rejected(reason));
        }

        self.sent
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
            .push(notification.clone());
        Ok(())
    }
}
