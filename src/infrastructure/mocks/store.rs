//! In-memory log store.

use crate::application::ports::{Clock, LogStore, StoreStatus};
use crate::domain::report::ENTRY_SEPARATOR;
use crate::error::StoreError;
use crate::infrastructure::file_store::DISABLED_MARKER;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Default)]
struct Artifact {
    exists: bool,
    content: Vec<u8>,
    modified: Option<SystemTime>,
}

/// [`LogStore`] kept in memory, with the same marker and stamping semantics
/// as the file store but without rotation.
#[derive(Debug, Clone)]
pub struct MemoryLogStore {
    artifact: Arc<Mutex<Artifact>>,
    clock: Arc<dyn Clock>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryLogStore {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            artifact: Arc::new(Mutex::new(Artifact::default())),
            clock: Arc::new(clock),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the artifact with existing content, as left by a previous run.
    pub fn seed(&self, content: &[u8], modified: SystemTime) {
        let mut artifact = self.lock();
        artifact.exists = true;
        artifact.content = content.to_vec();
        artifact.modified = Some(modified);
    }

    /// Make every mutating call fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current content as text.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock().content).into_owned()
    }

    /// Number of entries written.
    pub fn entries(&self) -> usize {
        self.contents().matches(ENTRY_SEPARATOR).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Artifact> {
        self.artifact
            .lock()
            .expect("MemoryLogStore mutex poisoned - a test thread panicked while holding the lock")
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::io(
                "memory",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "writes disabled"),
            ));
        }
        Ok(())
    }
}

impl LogStore for MemoryLogStore {
    fn append(&self, entry: &str, stamp: Option<SystemTime>) -> Result<bool, StoreError> {
        self.append_with(entry, &mut |_: StoreStatus| stamp)
    }

    fn append_with(
        &self,
        entry: &str,
        plan: &mut dyn FnMut(StoreStatus) -> Option<SystemTime>,
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        let now = self.clock.now();
        let mut artifact = self.lock();

        artifact.exists = true;
        if artifact.content.starts_with(DISABLED_MARKER) {
            return Ok(false);
        }

        let stamp = plan(StoreStatus {
            len: artifact.content.len() as u64,
            modified: artifact.modified,
        });
        artifact.content.extend_from_slice(entry.as_bytes());
        artifact.modified = Some(stamp.unwrap_or(now));
        Ok(true)
    }

    fn read(&self) -> Result<Vec<u8>, StoreError> {
        Ok(self.lock().content.clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        let now = self.clock.now();
        let mut artifact = self.lock();
        if artifact.exists {
            artifact.content.clear();
            artifact.modified = Some(now);
        }
        Ok(())
    }

    fn is_disabled(&self) -> Result<bool, StoreError> {
        Ok(self.lock().content.starts_with(DISABLED_MARKER))
    }

    fn toggle_disabled(&self) -> Result<bool, StoreError> {
        self.check_writable()?;
        let now = self.clock.now();
        let mut artifact = self.lock();

        let disabled = artifact.content.starts_with(DISABLED_MARKER);
        artifact.content.clear();
        if !disabled {
            artifact.content.extend_from_slice(DISABLED_MARKER);
        }
        artifact.exists = true;
        artifact.modified = Some(now);
        Ok(!disabled)
    }

    fn status(&self) -> Result<StoreStatus, StoreError> {
        let artifact = self.lock();
        Ok(StoreStatus {
            len: artifact.content.len() as u64,
            modified: artifact.modified.filter(|_| artifact.exists),
        })
    }
}
