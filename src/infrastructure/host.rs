//! Host adapter for plain processes.

use crate::application::ports::Host;
use crate::domain::record::{ErrorRecord, RuntimeSignal};
use crate::domain::report::RequestContext;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Exit code used by [`ProcessHost`] unless configured otherwise.
pub const DEFAULT_EXIT_CODE: i32 = 70;

/// [`Host`] for a standalone process: flushes stdio and exits on emergency
/// shutdown.
///
/// Request context and the last fatal signal can be fed in by the embedding
/// application through the shared handles.
#[derive(Debug, Clone)]
pub struct ProcessHost {
    exit_code: i32,
    app_root: Option<PathBuf>,
    request: Arc<Mutex<RequestContext>>,
    last_fatal: Arc<Mutex<Option<RuntimeSignal>>>,
    diagnostics: Arc<AtomicBool>,
}

impl Default for ProcessHost {
    fn default() -> Self {
        Self {
            exit_code: DEFAULT_EXIT_CODE,
            app_root: None,
            request: Arc::default(),
            last_fatal: Arc::default(),
            diagnostics: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl ProcessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Directory to return to before handling a fault.
    pub fn with_app_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.app_root = Some(root.into());
        self
    }

    /// Set the request being served on this process.
    pub fn set_request(&self, request: RequestContext) {
        *self.request.lock().unwrap_or_else(PoisonError::into_inner) = request;
    }

    /// Record a fatal signal for inspection at exit.
    pub fn record_fatal_signal(&self, signal: RuntimeSignal) {
        *self.last_fatal.lock().unwrap_or_else(PoisonError::into_inner) = Some(signal);
    }

    /// Whether the runtime's own diagnostics are currently enabled.
    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics.load(Ordering::SeqCst)
    }
}

impl Host for ProcessHost {
    fn request_context(&self) -> RequestContext {
        self.request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn app_root(&self) -> Option<PathBuf> {
        self.app_root.clone()
    }

    fn flush_output(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }

    fn emergency_shutdown(&self, record: &ErrorRecord) {
        tracing::error!(
            kind = ?record.kind,
            message = %record.message,
            exit_code = self.exit_code,
            "terminating after unrecoverable error"
        );
        std::process::exit(self.exit_code);
    }

    fn last_fatal_signal(&self) -> Option<RuntimeSignal> {
        self.last_fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_diagnostic_output(&self, enabled: bool) -> bool {
        self.diagnostics.swap(enabled, Ordering::SeqCst)
    }
}
