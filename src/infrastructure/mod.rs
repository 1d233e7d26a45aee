//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - The rotating, lock-protected log file
//! - Notification delivery through `tracing`
//! - The host process and its panic hook
//! - Storage implementations (sharded maps)

pub mod clock;
pub mod file_store;
pub mod host;
pub mod panic_hook;
pub mod sink;
pub mod storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides controllable doubles for every port.
///
/// To use these mocks in another crate's tests, add to its `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// fault-reporter = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
