//! Domain layer - pure types with no I/O.
//!
//! This layer contains the core concepts of the capture pipeline:
//! - Error signature computation
//! - Normalized error records and the raw fault shapes they come from
//! - Notification cadence policies
//! - Report and notification rendering
//!
//! All types in this layer are pure and easily testable.

pub mod cadence;
pub mod record;
pub mod report;
pub mod signature;
