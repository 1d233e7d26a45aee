//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters (or the hosting application) implement
//! these ports.

use crate::domain::record::{ErrorRecord, RuntimeSignal};
use crate::domain::report::{Notification, RequestContext};
use crate::error::{NotifyError, StoreError};
use std::fmt::Debug;
use std::hash::Hash;
use std::path::PathBuf;
use std::time::SystemTime;

/// Port for obtaining wall-clock time.
///
/// Wall-clock rather than monotonic time: cadence windows are compared
/// against the log artifact's modification time, which survives restarts.
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> SystemTime;
}

/// Size and modification time of the log artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStatus {
    /// Length in bytes; zero when the artifact does not exist
    pub len: u64,
    /// Last modification time; `None` when the artifact does not exist
    pub modified: Option<SystemTime>,
}

impl StoreStatus {
    /// Missing or zero-length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Port for the rotating error log.
///
/// Every mutating call is a full read-modify-write sequence performed while
/// holding an exclusive lock on the artifact.
pub trait LogStore: Send + Sync + Debug {
    /// Append an entry, rotating first when the artifact is over its cap.
    ///
    /// When `stamp` is given, the artifact's modification time is set to it
    /// after writing, inside the same lock.
    ///
    /// Returns `false` without writing when the artifact carries the
    /// disable marker.
    fn append(&self, entry: &str, stamp: Option<SystemTime>) -> Result<bool, StoreError>;

    /// Append like [`LogStore::append`], choosing the stamp from the status
    /// the artifact had just before the write.
    ///
    /// `plan` is called at most once, and only when the artifact is enabled.
    /// Implementations backed by a shared artifact should read the status
    /// under the same lock as the write; the default reads it separately.
    fn append_with(
        &self,
        entry: &str,
        plan: &mut dyn FnMut(StoreStatus) -> Option<SystemTime>,
    ) -> Result<bool, StoreError> {
        if self.is_disabled()? {
            return Ok(false);
        }
        let stamp = plan(self.status()?);
        self.append(entry, stamp)
    }

    /// Full contents; empty when the artifact does not exist.
    fn read(&self) -> Result<Vec<u8>, StoreError>;

    /// Truncate to empty. Removes the disable marker as a side effect.
    fn clear(&self) -> Result<(), StoreError>;

    /// Whether the artifact starts with the disable marker.
    fn is_disabled(&self) -> Result<bool, StoreError>;

    /// Flip the disable marker. Returns the new disabled state.
    fn toggle_disabled(&self) -> Result<bool, StoreError>;

    /// Current size and modification time.
    fn status(&self) -> Result<StoreStatus, StoreError>;
}

/// Port for outbound notifications (mail, chat, pager...).
pub trait NotificationSink: Send + Sync + Debug {
    /// Deliver a notification.
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Port for the hosting application.
///
/// Only [`Host::emergency_shutdown`] is mandatory; everything else defaults to
/// "not available".
pub trait Host: Send + Sync {
    /// Request currently being served, if any.
    fn request_context(&self) -> RequestContext {
        RequestContext::default()
    }

    /// Directory the process should be working in while handling a fault.
    fn app_root(&self) -> Option<PathBuf> {
        None
    }

    /// Discard or flush buffered response output before terminating.
    fn flush_output(&self) {}

    /// Whether a response page has already been produced.
    fn has_response_page(&self) -> bool {
        false
    }

    /// Render a generic failure page for the current request.
    fn set_fallback_error_page(&self) {}

    /// Terminate the process after the record has been logged and notified.
    fn emergency_shutdown(&self, record: &ErrorRecord);

    /// The last fatal signal recorded by the platform, if any.
    fn last_fatal_signal(&self) -> Option<RuntimeSignal> {
        None
    }

    /// Enable or disable the runtime's own diagnostic output.
    ///
    /// Returns the previous setting so it can be restored.
    fn set_diagnostic_output(&self, enabled: bool) -> bool {
        let _ = enabled;
        true
    }
}

/// In-process observer of captured faults.
pub trait ErrorObserver: Send + Sync {
    /// Called for every processed record before it is reported.
    ///
    /// The record may be mutated, e.g. to force suppression. Its signature is
    /// already sealed.
    fn on_error(&self, record: &mut ErrorRecord) {
        let _ = record;
    }

    /// Called right before emergency shutdown.
    fn on_terminate(&self, record: &mut ErrorRecord) {
        let _ = record;
    }
}

/// Port for concurrent key-value storage.
///
/// This abstraction allows the application layer to store and retrieve values
/// without depending on specific concurrent data structure implementations.
/// Infrastructure provides concrete implementations (ShardedStorage).
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Read an entry without creating it.
    fn with_entry<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R;

    /// Whether the key is present.
    fn contains(&self, key: &K) -> bool;

    /// Remove an entry.
    fn remove(&self, key: &K);

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);
}
