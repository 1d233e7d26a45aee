//! Mock implementations for testing.
//!
//! Test doubles for every port, so the controller and throttle can be
//! exercised without touching the filesystem, the process or a mail server.

pub mod clock;
pub mod host;
pub mod layer;
pub mod sink;
pub mod store;

pub use clock::MockClock;
pub use host::{Call, CallLog, RecordingHost, RecordingObserver};
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use sink::RecordingSink;
pub use store::MemoryLogStore;
