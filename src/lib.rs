//! # fault-reporter
//!
//! In-process error capture for long-running services: every fault the host
//! process sees is normalized into an [`ErrorRecord`], fingerprinted, written
//! to a rotating log file and, subject to a notification cadence, announced
//! to an operator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fault_reporter::{CaptureController, ReportingConfig};
//!
//! let config = ReportingConfig::builder()
//!     .with_log_path("/var/log/shop/errors.txt")
//!     .with_notify_target("ops@example.com")
//!     .with_cadence_seconds(3600) // at most one notification per hour
//!     .with_project_title("Shop")
//!     .build()
//!     .unwrap();
//!
//! let controller = CaptureController::builder(config).build().unwrap();
//!
//! // Take over the panic hook for the rest of the process.
//! controller.install().keep();
//! ```
//!
//! ## Fault Sources
//!
//! All sources converge on [`CaptureController::process`]:
//!
//! - **Runtime signals** ([`CaptureController::handle_runtime_signal`]):
//!   warnings, notices and errors raised by the host runtime. Errors and
//!   warnings terminate; notices, strict and deprecation signals only when
//!   configured to.
//! - **Unhandled exceptions** ([`CaptureController::handle_unhandled_exception`]):
//!   panics reach it through the installed panic hook; hosts can hand over
//!   uncaught error values directly. Always terminates.
//! - **Fatal signals at exit** ([`CaptureController::handle_process_exit`]).
//! - **Handled errors** ([`CaptureController::log_exception`]): reported
//!   without suppression or termination.
//!
//! ```rust,no_run
//! # use fault_reporter::{CaptureController, ReportingConfig, UncaughtFault};
//! # let controller = CaptureController::builder(ReportingConfig::default()).build().unwrap();
//! let err = std::io::Error::new(std::io::ErrorKind::Other, "upstream timed out");
//! controller.log_exception(UncaughtFault::from_error(&err));
//! ```
//!
//! ## Signatures
//!
//! Each record gets a stable [`ErrorSignature`] over its type, message,
//! location and rendered stack trace. With `dedup_signatures` on (the
//! default), a signature is reported at most once per process.
//!
//! ## Notification Cadence
//!
//! | `notify_cadence_seconds` | Behavior |
//! |--------------------------|----------|
//! | `-1` | Notify once, then nothing until the log is cleared |
//! | `0`  | Notify for every reported fault |
//! | `N > 0` | At most one notification per `N` seconds |
//!
//! The window start is stamped on the log file's modification time, so the
//! cadence holds across restarts and across worker processes sharing the
//! file.
//!
//! ## Configuration
//!
//! ```rust,no_run
//! # use fault_reporter::ReportingConfig;
//! // Defaults, then YAML, then FAULT_REPORTER_* environment overrides
//! let config = ReportingConfig::load_from_path("reporting.yaml").unwrap();
//! ```
//!
//! ## Observability
//!
//! The crate logs through `tracing` and never panics out of a handler.
//! Delivery and storage failures are counted in [`Metrics`]:
//!
//! ```rust,no_run
//! # use fault_reporter::{CaptureController, ReportingConfig};
//! # let controller = CaptureController::builder(ReportingConfig::default()).build().unwrap();
//! let snapshot = controller.metrics().snapshot();
//! println!("processed: {}", snapshot.processed);
//! println!("suppression rate: {:.2}%", snapshot.suppression_rate() * 100.0);
//! ```

// Domain layer - pure types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use domain::{
    cadence::{Cadence, CadenceInput, NotifyDecision},
    record::{ErrorKind, ErrorRecord, RuntimeSignal, Severity, StackFrame, StackTrace, UncaughtFault},
    report::{ErrorReport, Notification, ReportOptions, RequestContext},
    signature::ErrorSignature,
};

pub use application::{
    console::{ConsoleView, OperatorAction},
    controller::{
        CaptureController, CaptureControllerBuilder, CaptureState, InstallGuard, ProcessOutcome,
        SignalDisposition,
    },
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, ErrorObserver, Host, LogStore, NotificationSink, Storage, StoreStatus},
    registry::{Observation, SignatureRegistry, SignatureState},
    throttle::{NotificationThrottle, NotifySettings, ReportOutcome},
};

pub use infrastructure::{
    clock::SystemClock, file_store::FileLogStore, host::ProcessHost, sink::TracingSink,
    storage::ShardedStorage,
};

pub use config::{ReportingConfig, ReportingConfigBuilder, ReportingMode};
pub use error::{ConfigError, NotifyError, StoreError};
