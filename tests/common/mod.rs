//! Shared setup for the integration tests.

#![allow(dead_code)]

use fault_reporter::infrastructure::mocks::{
    CallLog, MockClock, RecordingHost, RecordingObserver, RecordingSink,
};
use fault_reporter::{CaptureController, ErrorObserver, FileLogStore, ReportingConfig};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub const T0: u64 = 1_700_000_000;

pub fn t0() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(T0)
}

pub fn config(cadence: i64) -> ReportingConfig {
    ReportingConfig::builder()
        .with_notify_target("ops@example.com")
        .with_cadence_seconds(cadence)
        .with_project_title("Shop")
        .build()
        .unwrap()
}

/// One log artifact on disk, shared by every controller built from it.
pub struct Harness {
    pub dir: TempDir,
    pub clock: MockClock,
    pub sink: Arc<RecordingSink>,
    pub host: Arc<RecordingHost>,
    pub store: Arc<FileLogStore>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileLogStore::new(dir.path().join("errors.txt"), 100_000, 1_000));
        Self {
            dir,
            clock: MockClock::new(t0()),
            sink: Arc::new(RecordingSink::new()),
            host: Arc::new(RecordingHost::new()),
            store,
        }
    }

    pub fn advance(&self, seconds: u64) {
        self.clock.advance(Duration::from_secs(seconds));
    }

    pub fn log(&self) -> CallLog {
        self.host.log()
    }

    /// Observer journaling into the host's call log that also clears
    /// `terminate` and rewrites the message on `on_terminate`.
    pub fn rewriting_observer(&self) -> Arc<dyn ErrorObserver> {
        Arc::new(RecordingObserver::new(self.log()).mutate_on_terminate(|record| {
            record.message = "rewritten by observer".to_string();
            record.terminate = false;
        }))
    }

    /// A controller over this harness' artifact, as a fresh process would see it.
    pub fn controller(&self, config: ReportingConfig) -> Arc<CaptureController> {
        self.controller_with(config, Vec::new())
    }

    pub fn controller_with(
        &self,
        config: ReportingConfig,
        observers: Vec<Arc<dyn ErrorObserver>>,
    ) -> Arc<CaptureController> {
        let mut builder = CaptureController::builder(config)
            .with_store(self.store.clone())
            .with_sink(self.sink.clone())
            .with_host(self.host.clone())
            .with_clock(Arc::new(self.clock.clone()))
            .capture_panics(false);
        for observer in observers {
            builder = builder.with_observer(observer);
        }
        builder.build().unwrap()
    }

    pub fn sent(&self) -> usize {
        self.sink.sent().len()
    }

    pub fn contents(&self) -> String {
        String::from_utf8(std::fs::read(self.store.path()).unwrap_or_default()).unwrap()
    }
}
