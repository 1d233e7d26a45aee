//! Application layer - orchestration of domain logic.
//!
//! This layer drives captured faults through the pipeline:
//! - Capture controller (lifecycle, suppression, termination)
//! - Notification throttle (dedup, logging, cadence)
//! - Signature registry (what was already reported in this process)
//! - Operator console actions
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from the filesystem, the mail transport and the host runtime.

pub mod console;
pub mod controller;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod throttle;
